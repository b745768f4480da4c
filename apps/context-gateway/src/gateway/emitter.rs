//! Rate-limited, batched broadcaster for ingestion events.
//!
//! Progress updates for one project are throttled to a minimum interval and
//! coalesced last-write-wins within a batch window: only the latest state
//! matters for a progress bar, so intermediate updates are dropped. Phase
//! boundaries, completion and errors are never throttled, and a pending
//! progress update is always flushed before a terminal event so the final
//! state is not lost behind it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::events::{
    EventName, IngestionComplete, IngestionError, PhaseInfo, PhaseStarted, ProgressUpdate,
};
use super::rooms::RoomTransport;

/// Default minimum interval between progress emissions per project.
pub const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Room a project's subscribers are grouped under.
pub fn ingestion_room(project_id: &str) -> String {
    format!("ingestion:{project_id}")
}

/// Per-project throttle state. At most one flush task is outstanding, and
/// `pending` is cleared whenever it is flushed or superseded by an
/// immediate emission.
struct ProjectThrottle {
    last_emit: Option<Instant>,
    pending: Option<ProgressUpdate>,
    flush_task: Option<JoinHandle<()>>,
}

impl ProjectThrottle {
    fn new() -> Self {
        Self {
            last_emit: None,
            pending: None,
            flush_task: None,
        }
    }

    fn cancel_flush(&mut self) {
        if let Some(task) = self.flush_task.take() {
            task.abort();
        }
    }
}

/// Broadcaster for ingestion lifecycle events, keyed by project.
pub struct IngestionEmitter {
    transport: RwLock<Option<Arc<dyn RoomTransport>>>,
    projects: DashMap<String, ProjectThrottle>,
    min_interval: Duration,
}

impl IngestionEmitter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            transport: RwLock::new(None),
            projects: DashMap::new(),
            min_interval,
        }
    }

    /// Attach the fan-out transport. Until this is called, every emit
    /// operation degrades to a logged warning.
    pub fn attach_transport(&self, transport: Arc<dyn RoomTransport>) {
        *self.transport.write() = Some(transport);
    }

    /// Announce a new ingestion phase. Emitted immediately and
    /// unconditionally; the project's throttle window starts clean so the
    /// first progress update of the phase is not delayed.
    pub fn phase_started(&self, project_id: &str, phase: &str, message: &str, info: PhaseInfo) {
        if let Some((_, mut state)) = self.projects.remove(project_id) {
            state.cancel_flush();
        }

        let event = PhaseStarted {
            project_id: project_id.to_string(),
            phase: phase.to_string(),
            message: message.to_string(),
            total_phases: info.total_phases,
            current_phase_index: info.current_phase_index,
        };
        self.send(
            project_id,
            EventName::PHASE_STARTED,
            serde_json::to_value(&event).unwrap(),
        );
    }

    /// Report progress within the current phase. Never rejected: the update
    /// is either emitted now or scheduled, and a scheduled update is
    /// overwritten by any later one in the same window (last-write-wins).
    pub fn progress(
        self: &Arc<Self>,
        project_id: &str,
        phase: &str,
        progress_percent: f64,
        metrics: Value,
        message: Option<String>,
    ) {
        let update = ProgressUpdate {
            project_id: project_id.to_string(),
            phase: phase.to_string(),
            progress_percent: progress_percent.clamp(0.0, 100.0),
            message,
            metrics,
        };

        let now = Instant::now();
        let mut state = self
            .projects
            .entry(project_id.to_string())
            .or_insert_with(ProjectThrottle::new);

        let elapsed = state.last_emit.map(|at| now.duration_since(at));
        let due = elapsed.map_or(true, |e| e >= self.min_interval);

        if due {
            state.cancel_flush();
            state.pending = None;
            state.last_emit = Some(now);
            drop(state);
            self.send(
                project_id,
                EventName::PROGRESS_UPDATE,
                serde_json::to_value(&update).unwrap(),
            );
        } else {
            state.pending = Some(update);
            if state.flush_task.is_none() {
                let wait = self.min_interval - elapsed.unwrap_or_default();
                let emitter = Arc::clone(self);
                let project = project_id.to_string();
                state.flush_task = Some(tokio::spawn(async move {
                    time::sleep(wait).await;
                    emitter.flush(&project);
                }));
            }
        }
    }

    /// Emit any pending progress update for the project right now.
    fn flush(&self, project_id: &str) {
        let pending = {
            let Some(mut state) = self.projects.get_mut(project_id) else {
                return;
            };
            state.cancel_flush();
            let Some(update) = state.pending.take() else {
                return;
            };
            state.last_emit = Some(Instant::now());
            update
        };
        self.send(
            project_id,
            EventName::PROGRESS_UPDATE,
            serde_json::to_value(&pending).unwrap(),
        );
    }

    /// Announce successful completion. Any pending progress update is
    /// flushed first so it is not lost behind the terminal event; the
    /// project's throttle state is then discarded.
    pub fn complete(&self, project_id: &str, result: Value) {
        self.flush(project_id);

        let event = IngestionComplete {
            project_id: project_id.to_string(),
            result,
        };
        self.send(
            project_id,
            EventName::INGESTION_COMPLETE,
            serde_json::to_value(&event).unwrap(),
        );

        if let Some((_, mut state)) = self.projects.remove(project_id) {
            state.cancel_flush();
        }
    }

    /// Announce an ingestion error. Pending progress is flushed first.
    /// Throttle state is kept: a retry may continue within the same phase.
    pub fn error(&self, project_id: &str, phase: &str, error: &str) {
        self.flush(project_id);

        let event = IngestionError {
            project_id: project_id.to_string(),
            phase: phase.to_string(),
            error: error.to_string(),
        };
        self.send(project_id, EventName::ERROR, serde_json::to_value(&event).unwrap());
    }

    /// Cancel all outstanding flush tasks and drop all throttle state.
    /// Called at process shutdown.
    pub fn cleanup(&self) {
        for mut entry in self.projects.iter_mut() {
            entry.cancel_flush();
        }
        self.projects.clear();
    }

    fn transport(&self) -> Option<Arc<dyn RoomTransport>> {
        self.transport.read().clone()
    }

    fn send(&self, project_id: &str, event: &'static str, payload: Value) {
        let Some(transport) = self.transport() else {
            tracing::warn!(project_id, event, "no transport attached; dropping event");
            return;
        };
        let room = ingestion_room(project_id);
        let subscribers = transport.subscriber_count(&room);
        tracing::debug!(project_id, event, subscribers, "emitting ingestion event");
        transport.send_to_room(&room, event, payload);
    }
}
