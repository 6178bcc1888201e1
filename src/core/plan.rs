//! Run plan definitions and loading.
//!
//! Plans are defined in YAML: an ordered list of domains, each with its
//! fixed stage sequence and worker bindings, plus the evaluator binding
//! and the shared retry budget.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A complete run plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
    /// Plan name (used in CLI and run records)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Retry budget shared by every domain; a domain runs at most
    /// `max_retries + 1` times. Falls back to the configured default
    /// when the plan omits it.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Default per-stage timeout in seconds. Falls back to the
    /// configured default when the plan omits it.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: u64,

    /// Evaluator worker binding
    pub evaluator: EvaluatorSpec,

    /// Ordered list of domains to execute
    pub domains: Vec<DomainSpec>,
}

fn default_max_retries() -> u32 {
    crate::config::config()
        .map(|c| c.defaults.max_retries)
        .unwrap_or(2)
}

fn default_stage_timeout() -> u64 {
    crate::config::config()
        .map(|c| c.defaults.stage_timeout_seconds)
        .unwrap_or(300) // 5 min
}

impl RunPlan {
    /// Load a plan from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a plan from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse plan YAML")
    }

    /// Validate the plan definition.
    ///
    /// Malformed plans must be rejected before a run enters its first
    /// transition.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Plan name cannot be empty");
        }

        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be positive");
        }

        if self.domains.is_empty() {
            anyhow::bail!("Plan must have at least one domain");
        }

        let mut seen_domains = Vec::new();
        for (i, domain) in self.domains.iter().enumerate() {
            if domain.name.is_empty() {
                anyhow::bail!("Domain {} has an empty name", i);
            }
            if seen_domains.contains(&domain.name.as_str()) {
                anyhow::bail!("Duplicate domain name '{}'", domain.name);
            }
            seen_domains.push(domain.name.as_str());

            if domain.stages.is_empty() {
                anyhow::bail!("Domain '{}' must have at least one stage", domain.name);
            }

            let mut seen_stages = Vec::new();
            for (j, stage) in domain.stages.iter().enumerate() {
                if stage.name.is_empty() {
                    anyhow::bail!("Stage {} in domain '{}' has an empty name", j, domain.name);
                }
                if seen_stages.contains(&stage.name.as_str()) {
                    anyhow::bail!(
                        "Duplicate stage name '{}' in domain '{}'",
                        stage.name,
                        domain.name
                    );
                }
                seen_stages.push(stage.name.as_str());

                if stage.command.is_empty() {
                    anyhow::bail!(
                        "Stage '{}' in domain '{}' has an empty command",
                        stage.name,
                        domain.name
                    );
                }
            }
        }

        if self.evaluator.command.is_empty() {
            anyhow::bail!("Evaluator command cannot be empty");
        }

        Ok(())
    }

    /// Get a domain by name
    pub fn get_domain(&self, name: &str) -> Option<&DomainSpec> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Ordered domain names
    pub fn domain_names(&self) -> Vec<&str> {
        self.domains.iter().map(|d| d.name.as_str()).collect()
    }
}

/// One domain of the top-level pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Domain name (unique within the plan)
    pub name: String,

    /// Review criteria handed to the evaluator for this domain
    #[serde(default)]
    pub review_criteria: Vec<String>,

    /// Ordered worker stages
    pub stages: Vec<StageSpec>,
}

/// A single worker stage binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name (unique within the domain)
    pub name: String,

    /// Program to execute for this stage's worker
    pub command: String,

    /// Arguments passed on every invocation
    #[serde(default)]
    pub args: Vec<String>,

    /// Instruction prepended to the stage's context
    #[serde(default)]
    pub instruction: Option<String>,

    /// Override timeout for this stage (uses the plan default if not set)
    pub timeout_seconds: Option<u64>,
}

impl StageSpec {
    /// Effective timeout for this stage
    pub fn timeout(&self, plan: &RunPlan) -> Duration {
        let seconds = self.timeout_seconds.unwrap_or(plan.stage_timeout_seconds);
        Duration::from_secs(seconds)
    }
}

/// Evaluator worker binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorSpec {
    /// Program to execute for the evaluator worker
    pub command: String,

    /// Arguments passed on every invocation
    #[serde(default)]
    pub args: Vec<String>,

    /// Adequacy score (0-100) the review prompt asks the judge to apply.
    /// Prompt policy only; the core never interprets scores.
    #[serde(default)]
    pub approve_threshold: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PLAN_YAML: &str = r#"
name: codegen
description: Generate automation code from testcases

max_retries: 2
stage_timeout_seconds: 120

evaluator:
  command: llm
  args: ["--review"]
  approve_threshold: 80

domains:
  - name: testcase
    review_criteria:
      - "Were relevant testcases found?"
      - "Are the results sufficient?"
    stages:
      - name: search
        command: llm
        args: ["--step", "search"]
      - name: design
        command: llm
        args: ["--step", "design"]
        timeout_seconds: 30

  - name: generate
    stages:
      - name: generate
        command: llm
        args: ["--step", "generate"]
"#;

    #[test]
    fn test_plan_parsing() {
        let plan = RunPlan::from_yaml(TEST_PLAN_YAML).unwrap();

        assert_eq!(plan.name, "codegen");
        assert_eq!(plan.max_retries, 2);
        assert_eq!(plan.domains.len(), 2);
        assert_eq!(plan.domain_names(), vec!["testcase", "generate"]);
        assert_eq!(plan.evaluator.approve_threshold, Some(80));
        assert_eq!(plan.domains[0].review_criteria.len(), 2);
    }

    #[test]
    fn test_plan_validation() {
        let plan = RunPlan::from_yaml(TEST_PLAN_YAML).unwrap();
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_stage_timeout_override_and_default() {
        let plan = RunPlan::from_yaml(TEST_PLAN_YAML).unwrap();

        let search = &plan.domains[0].stages[0];
        let design = &plan.domains[0].stages[1];

        assert_eq!(search.timeout(&plan), Duration::from_secs(120));
        assert_eq!(design.timeout(&plan), Duration::from_secs(30));
    }

    #[test]
    fn test_omitted_fields_fall_back_to_configured_defaults() {
        let yaml = r#"
name: minimal
evaluator:
  command: llm
domains:
  - name: a
    stages: [{ name: s, command: llm }]
"#;
        let plan = RunPlan::from_yaml(yaml).unwrap();
        let defaults = &crate::config::config().unwrap().defaults;

        assert_eq!(plan.max_retries, defaults.max_retries);
        assert_eq!(plan.stage_timeout_seconds, defaults.stage_timeout_seconds);
    }

    #[test]
    fn test_empty_domain_list_rejected() {
        let yaml = r#"
name: empty
evaluator:
  command: llm
domains: []
"#;
        let plan = RunPlan::from_yaml(yaml).unwrap();
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("at least one domain"));
    }

    #[test]
    fn test_duplicate_domain_rejected() {
        let yaml = r#"
name: dup
evaluator:
  command: llm
domains:
  - name: a
    stages: [{ name: s, command: llm }]
  - name: a
    stages: [{ name: s, command: llm }]
"#;
        let plan = RunPlan::from_yaml(yaml).unwrap();
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_zero_retry_budget_rejected() {
        let yaml = r#"
name: zero
max_retries: 0
evaluator:
  command: llm
domains:
  - name: a
    stages: [{ name: s, command: llm }]
"#;
        let plan = RunPlan::from_yaml(yaml).unwrap();
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_domain_without_stages_rejected() {
        let yaml = r#"
name: hollow
evaluator:
  command: llm
domains:
  - name: a
    stages: []
"#;
        let plan = RunPlan::from_yaml(yaml).unwrap();
        assert!(plan.validate().is_err());
    }
}
