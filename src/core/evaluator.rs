//! Evaluation gate and retry policy.
//!
//! After each domain the orchestrator obtains an advisory judgment,
//! parses it against the fixed verdict vocabulary and maps it to a
//! routing decision under the bounded-retry invariant: no domain is ever
//! attempted more than `max_retries + 1` times, and an unparseable
//! judgment defaults to the conservative choice instead of approving.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{StageResult, Verdict};
use crate::workers::{ContextEntry, Worker};

/// Everything an evaluator sees for one review
pub struct ReviewRequest<'a> {
    /// Domain under review
    pub domain: &'a str,

    /// Original user request
    pub request: &'a str,

    /// The domain's latest (possibly degraded) result
    pub result: &'a StageResult,

    /// Review criteria configured for this domain
    pub criteria: &'a [String],

    /// Retries consumed so far for this domain
    pub retry_count: u32,

    /// Shared retry budget
    pub max_retries: u32,
}

/// Issues an advisory judgment for a domain's latest result.
///
/// The judgment is free text; parsing and the retry policy are applied by
/// the caller so every evaluator implementation is held to the same
/// conservative rules.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn review(&self, review: &ReviewRequest<'_>) -> Result<String>;
}

/// Evaluator backed by a worker invocation (the shipped default)
pub struct WorkerEvaluator {
    worker: Arc<dyn Worker>,

    /// Adequacy score the prompt asks the judge to apply; prompt policy
    /// only, never interpreted by the core
    approve_threshold: Option<u32>,
}

impl WorkerEvaluator {
    pub fn new(worker: Arc<dyn Worker>) -> Self {
        Self {
            worker,
            approve_threshold: None,
        }
    }

    pub fn with_approve_threshold(mut self, threshold: Option<u32>) -> Self {
        self.approve_threshold = threshold;
        self
    }

    fn render_prompt(&self, review: &ReviewRequest<'_>) -> String {
        let mut prompt = format!(
            "You are the supervising reviewer for a multi-domain run.\n\n\
             User request:\n{}\n\n\
             Report from the '{}' domain (attempt {}):\n{}\n",
            review.request, review.domain, review.result.attempt, review.result.summary
        );

        if !review.criteria.is_empty() {
            prompt.push_str("\nReview criteria:\n");
            for (i, criterion) in review.criteria.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, criterion));
            }
        }

        if let Some(threshold) = self.approve_threshold {
            prompt.push_str(&format!(
                "\nScore the result from 0 to 100; only a score of at least {} counts as satisfactory.\n",
                threshold
            ));
        }

        prompt.push_str(&format!(
            "\nDecision:\n\
             - APPROVED: the result is satisfactory; the run advances\n\
             - RETRY: the result is unsatisfactory; the domain is re-run\n\
             - FAILED: the result is unrecoverable\n\n\
             Current retry count: {}/{}\n\n\
             Answer with exactly one of APPROVED, RETRY or FAILED on the first line, \
             followed by your rationale.\n",
            review.retry_count, review.max_retries
        ));

        prompt
    }
}

#[async_trait]
impl Evaluator for WorkerEvaluator {
    async fn review(&self, review: &ReviewRequest<'_>) -> Result<String> {
        let context = vec![ContextEntry::system(self.render_prompt(review))];
        let reply = self.worker.invoke(&context).await?;
        Ok(reply.content)
    }
}

/// Routing action chosen for a domain after evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Advance to the next domain (or terminal success)
    Advance,

    /// Re-run the same domain
    Retry,

    /// Terminate the run in failure
    Fail,
}

/// Outcome of applying the retry policy to a parsed judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,

    /// The judgment did not parse to a known verdict and the conservative
    /// default was applied
    pub ambiguous: bool,

    /// A RETRY (or ambiguous) judgment was coerced to failure because the
    /// budget was exhausted
    pub budget_exhausted: bool,
}

/// Map a parsed verdict to a routing decision under the retry budget.
///
/// RETRY is only legal while `retry_count < max_retries`; an exhausted
/// budget coerces it to failure. A missing verdict never approves: it
/// becomes RETRY while budget remains, else failure.
pub fn decide(verdict: Option<Verdict>, retry_count: u32, max_retries: u32) -> Decision {
    let budget_remains = retry_count < max_retries;

    match verdict {
        Some(Verdict::Approved) => Decision {
            action: Action::Advance,
            ambiguous: false,
            budget_exhausted: false,
        },
        Some(Verdict::Failed) => Decision {
            action: Action::Fail,
            ambiguous: false,
            budget_exhausted: false,
        },
        Some(Verdict::Retry) => Decision {
            action: if budget_remains {
                Action::Retry
            } else {
                Action::Fail
            },
            ambiguous: false,
            budget_exhausted: !budget_remains,
        },
        None => Decision {
            action: if budget_remains {
                Action::Retry
            } else {
                Action::Fail
            },
            ambiguous: true,
            budget_exhausted: !budget_remains,
        },
    }
}
