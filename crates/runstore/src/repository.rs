//! Run repository: creates run directories and owns the append-only run log.
//!
//! Layout (bit-exact contract):
//!
//! ```text
//! {workspace_root}/
//!   runs/
//!     {run_id}/
//!       runlog.jsonl          # append-only, one JSON per line
//!       checkpoint.json       # present only while the run is in flight
//!       workspace/            # per-run sandbox root
//!   run_index.jsonl
//! ```
//!
//! The repository is the single writer for a run's log; appends from
//! parallel packs are serialised through an internal lock, which preserves
//! the temporal order of the repository's own calls (no inter-pack ordering
//! is implied).

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;

use maestro_domain::error::{Error, Result};
use maestro_domain::event::RunEvent;
use maestro_domain::task::RunId;

pub struct RunRepository {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl RunRepository {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            root: workspace_root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join("runs").join(run_id.as_str())
    }

    /// Create a fresh run directory with its workspace subdirectory.
    ///
    /// Returns `(run_id, run_dir, workspace_path)`.
    pub fn create_run(&self) -> Result<(RunId, PathBuf, PathBuf)> {
        let run_id = RunId::mint();
        let run_dir = self.run_dir(&run_id);
        let workspace_path = run_dir.join("workspace");
        std::fs::create_dir_all(&workspace_path).map_err(Error::Io)?;
        tracing::info!(run_id = %run_id, run_dir = %run_dir.display(), "run created");
        Ok((run_id, run_dir, workspace_path))
    }

    /// Re-open an existing run (used by resume). Fails when the directory
    /// does not exist.
    pub fn open_run(&self, run_id: &RunId) -> Result<(PathBuf, PathBuf)> {
        let run_dir = self.run_dir(run_id);
        if !run_dir.is_dir() {
            return Err(Error::Other(format!("no such run: {run_id}")));
        }
        Ok((run_dir.clone(), run_dir.join("workspace")))
    }

    /// Append one event to the run's log.
    pub fn append(
        &self,
        run_id: &RunId,
        kind: &str,
        step: Option<String>,
        payload: Value,
    ) -> Result<()> {
        self.append_event(run_id, &RunEvent::now(kind, step, payload))
    }

    /// Append a pre-built event to the run's log.
    pub fn append_event(&self, run_id: &RunId, event: &RunEvent) -> Result<()> {
        let line = serde_json::to_string(event).map_err(Error::Json)?;
        let path = self.run_dir(run_id).join("runlog.jsonl");

        let _guard = self.write_lock.lock();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        file.write_all(line.as_bytes()).map_err(Error::Io)?;
        file.write_all(b"\n").map_err(Error::Io)?;
        Ok(())
    }

    /// Read a run's events, skipping malformed lines.
    pub fn read_run_events(&self, run_id: &RunId) -> Result<Vec<RunEvent>> {
        let path = self.run_dir(run_id).join("runlog.jsonl");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let mut events = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunEvent>(line) {
                Ok(ev) => events.push(ev),
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "skipping malformed runlog line");
                }
            }
        }
        Ok(events)
    }

    /// All run ids under `runs/`, sorted ascending (run ids start with a
    /// timestamp, so this is chronological).
    pub fn list_runs(&self) -> Result<Vec<String>> {
        let runs_dir = self.root.join("runs");
        if !runs_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = std::fs::read_dir(&runs_dir)
            .map_err(Error::Io)?
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
