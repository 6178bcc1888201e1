//! Checkpoint store with file-based persistence.
//!
//! Each run gets its own directory: an append-only `events.jsonl` log, a
//! header with the plan name and request, and a JSON snapshot of each
//! domain's latest result. Replaying the log plus loading the snapshots
//! reconstructs the run, which is what makes non-terminal runs resumable.
//! The orchestrator works identically with no store configured.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Event, Run, StageResult};

/// Static metadata persisted once at run start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHeader {
    pub plan_name: String,
    pub request: String,

    /// SHA-256 fingerprint of the request (first 16 hex chars)
    pub request_fingerprint: String,
}

/// File-based checkpoint store for one run
pub struct CheckpointStore {
    run_dir: PathBuf,
    events_path: PathBuf,
    results_dir: PathBuf,
}

impl CheckpointStore {
    /// Create or open the store for a run under the configured home
    pub async fn open(run_id: Uuid) -> Result<Self> {
        let base = crate::config::runs_dir()?;
        Self::open_in(&base, run_id).await
    }

    /// Create or open the store for a run under an explicit base directory
    pub async fn open_in(base: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = base.join(run_id.to_string());
        let results_dir = run_dir.join("results");

        fs::create_dir_all(&results_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let events_path = run_dir.join("events.jsonl");

        Ok(Self {
            run_dir,
            events_path,
            results_dir,
        })
    }

    /// The run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Persist the run header (plan name + request)
    pub async fn save_header(&self, plan_name: &str, request: &str) -> Result<()> {
        let header = RunHeader {
            plan_name: plan_name.to_string(),
            request: request.to_string(),
            request_fingerprint: fingerprint(request),
        };

        let json = serde_json::to_string_pretty(&header).context("Failed to serialize header")?;
        fs::write(self.run_dir.join("run.json"), json)
            .await
            .context("Failed to write run header")?;

        Ok(())
    }

    /// Load the run header, if present
    pub async fn load_header(&self) -> Result<Option<RunHeader>> {
        let path = self.run_dir.join("run.json");
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read run header: {}", path.display()))?;
        let header = serde_json::from_str(&content).context("Failed to parse run header")?;

        Ok(Some(header))
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!("Failed to open events file: {}", self.events_path.display())
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in append order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path).await.with_context(|| {
            format!("Failed to open events file: {}", self.events_path.display())
        })?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Snapshot a domain's latest result (overwrites the previous one)
    pub async fn save_result(&self, result: &StageResult) -> Result<()> {
        let path = self.results_dir.join(format!("{}.json", result.domain));
        let json = serde_json::to_string_pretty(result).context("Failed to serialize result")?;

        fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write result snapshot: {}", path.display()))?;

        Ok(())
    }

    /// Load every persisted domain result
    pub async fn load_results(&self) -> Result<HashMap<String, StageResult>> {
        let mut results = HashMap::new();

        if !self.results_dir.exists() {
            return Ok(results);
        }

        let mut entries = fs::read_dir(&self.results_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read result snapshot: {}", path.display()))?;
            let result: StageResult = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse result snapshot: {}", path.display()))?;

            results.insert(result.domain.clone(), result);
        }

        Ok(results)
    }

    /// Reconstruct the full run: replayed events, header fields and
    /// per-domain result snapshots
    pub async fn load_run(&self) -> Result<Option<Run>> {
        let events = self.replay().await?;
        let Some(mut run) = Run::from_events(&events) else {
            return Ok(None);
        };

        if let Some(header) = self.load_header().await? {
            run.plan_name = header.plan_name;
            run.request = header.request;
        }
        run.domain_results = self.load_results().await?;

        Ok(Some(run))
    }

    /// List all run IDs under a base directory
    pub async fn list_runs_in(base: &Path) -> Result<Vec<Uuid>> {
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(base).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }

    /// List all run IDs under the configured home
    pub async fn list_runs() -> Result<Vec<Uuid>> {
        let base = crate::config::runs_dir()?;
        Self::list_runs_in(&base).await
    }
}

/// SHA-256 fingerprint of request content (first 16 hex chars)
pub fn fingerprint(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
