//! Deterministic canned-reply worker.
//!
//! Useful for debugging a plan's routing without a reasoning backend, and
//! for exercising the orchestrator in tests. Replies are consumed in
//! order; once the script is exhausted the last reply repeats.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ContextEntry, Worker, WorkerError, WorkerReply};

/// One scripted response
pub type ScriptedReply = Result<String, WorkerError>;

/// Worker that replays a fixed script of replies
pub struct ScriptedWorker {
    name: String,
    script: Mutex<VecDeque<ScriptedReply>>,
    last: Mutex<Option<ScriptedReply>>,
}

impl ScriptedWorker {
    /// Create a worker that answers with `replies` in order
    pub fn new(name: impl Into<String>, replies: Vec<ScriptedReply>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
        }
    }

    /// Worker that always answers with the same text
    pub fn always(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::new(name, vec![Ok(reply.into())])
    }

    /// Worker whose every invocation fails with the given error
    pub fn failing(name: impl Into<String>, error: WorkerError) -> Self {
        Self::new(name, vec![Err(error)])
    }

    /// Number of unconsumed scripted replies
    pub fn remaining(&self) -> usize {
        self.script.lock().expect("script lock").len()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _context: &[ContextEntry]) -> Result<WorkerReply, WorkerError> {
        let next = {
            let mut script = self.script.lock().expect("script lock");
            script.pop_front()
        };

        let reply = match next {
            Some(reply) => {
                *self.last.lock().expect("last lock") = Some(reply.clone());
                reply
            }
            None => self
                .last
                .lock()
                .expect("last lock")
                .clone()
                .unwrap_or_else(|| {
                    Err(WorkerError::Failed {
                        worker: self.name.clone(),
                        reason: "scripted worker has no replies".to_string(),
                    })
                }),
        };

        reply.map(WorkerReply::new)
    }
}
