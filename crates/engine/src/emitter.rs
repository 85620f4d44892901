//! Event emission: every engine event goes to the run log and, when a
//! streaming consumer is attached, to its channel.

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use maestro_domain::event::RunEvent;
use maestro_domain::task::RunId;
use maestro_runs::RunRepository;

/// Emits run events for one run. Cheap to clone per pack task.
#[derive(Clone)]
pub struct EventSink {
    repository: std::sync::Arc<RunRepository>,
    run_id: RunId,
    stream: Option<UnboundedSender<RunEvent>>,
}

impl EventSink {
    pub fn new(
        repository: std::sync::Arc<RunRepository>,
        run_id: RunId,
        stream: Option<UnboundedSender<RunEvent>>,
    ) -> Self {
        Self {
            repository,
            run_id,
            stream,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Record one event. Emission is best effort: a failed log append is a
    /// warning, never an aborted run.
    pub fn emit(&self, kind: &str, step: Option<&str>, payload: Value) {
        let event = RunEvent::now(kind, step.map(String::from), payload);
        if let Err(e) = self.repository.append_event(&self.run_id, &event) {
            tracing::warn!(run_id = %self.run_id, kind, error = %e, "failed to append run event");
        }
        if let Some(tx) = &self.stream {
            let _ = tx.send(event);
        }
    }

    /// Send an event to the stream only (never written to the run log).
    /// Used for the `_run_done_` stream terminator.
    pub fn emit_stream_only(&self, kind: &str, payload: Value) {
        if let Some(tx) = &self.stream {
            let _ = tx.send(RunEvent::now(kind, None, payload));
        }
    }
}
