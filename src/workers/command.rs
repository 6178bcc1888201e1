//! Subprocess-backed worker.
//!
//! Spawns a configured command, pipes the rendered context to stdin and
//! collects stdout as the reply. This is how LLM-backed reasoning steps
//! are bound without the core knowing anything about the backend.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{render_context, ContextEntry, Worker, WorkerError, WorkerReply};

/// Worker that shells out to an external command
pub struct CommandWorker {
    /// Worker name (used in logs and error messages)
    name: String,

    /// Program to execute
    program: String,

    /// Arguments passed on every invocation
    args: Vec<String>,
}

impl CommandWorker {
    /// Create a worker for `program` with fixed arguments
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }

    async fn run_subprocess(&self, input: &str) -> Result<String, WorkerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Failed {
                worker: self.name.clone(),
                reason: format!("failed to spawn '{}': {}", self.program, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| WorkerError::Failed {
                    worker: self.name.clone(),
                    reason: format!("failed to write stdin: {}", e),
                })?;
            // Drop stdin to signal EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| WorkerError::Failed {
                worker: self.name.clone(),
                reason: format!("failed to wait for process: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            // A signal-terminated child has no exit code; treat that as a
            // cancelled call so it is reported as its own failure kind.
            return match output.status.code() {
                None => Err(WorkerError::Cancelled {
                    worker: self.name.clone(),
                }),
                Some(code) => Err(WorkerError::Failed {
                    worker: self.name.clone(),
                    reason: format!("exit code {}: {}", code, stderr.trim()),
                }),
            };
        }

        String::from_utf8(output.stdout).map_err(|_| WorkerError::InvalidOutput {
            worker: self.name.clone(),
            reason: "stdout is not valid UTF-8".to_string(),
        })
    }
}

#[async_trait]
impl Worker for CommandWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, context: &[ContextEntry]) -> Result<WorkerReply, WorkerError> {
        let input = render_context(context);
        let content = self.run_subprocess(&input).await?;
        Ok(WorkerReply::new(content))
    }
}
