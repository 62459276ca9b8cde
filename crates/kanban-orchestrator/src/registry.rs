use crate::workflow::Phase;
use chrono::{DateTime, Utc};
use kanban_core::{KanbanError, KanbanResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

/// One live agent run.
struct TaskRun {
    run_id: Uuid,
    phase: Phase,
    log_file: PathBuf,
    started_at: DateTime<Utc>,
    started: Instant,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// Serializable view of a live run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRunInfo {
    /// Ticket the run belongs to.
    pub ticket_id: String,
    /// Distinguishes this run from earlier and later runs of the same ticket.
    pub run_id: Uuid,
    /// Prompt the run was launched with.
    pub phase: Phase,
    /// Log the run streams into.
    pub log_file: PathBuf,
    /// Wall-clock time of the reservation.
    pub started_at: DateTime<Utc>,
    /// Whole seconds since the run was reserved.
    pub run_time: u64,
}

/// In-memory map of ticket id to live run. The only structure mutated by
/// start, stop and exit paths concurrently; every access goes through one lock.
pub struct TaskRegistry {
    runs: Mutex<HashMap<String, TaskRun>>,
    max_concurrent: AtomicUsize,
}

impl TaskRegistry {
    /// `max_concurrent == 0` disables admission control.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            max_concurrent: AtomicUsize::new(max_concurrent),
        }
    }

    /// Change the admission limit. Runs already live are never evicted.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        self.max_concurrent.store(max_concurrent, Ordering::Relaxed);
    }

    /// Insert-if-absent. The slot is held before anything is spawned, so two
    /// concurrent starts for one ticket cannot both proceed.
    pub fn try_reserve(
        &self,
        ticket_id: &str,
        phase: Phase,
        log_file: PathBuf,
        stop_tx: oneshot::Sender<()>,
    ) -> KanbanResult<Uuid> {
        let mut runs = self.runs.lock();
        if runs.contains_key(ticket_id) {
            return Err(KanbanError::AlreadyRunning(format!(
                "ticket {ticket_id} already has an active run"
            )));
        }
        let max = self.max_concurrent.load(Ordering::Relaxed);
        if max > 0 && runs.len() >= max {
            return Err(KanbanError::Capacity(format!(
                "{} agent runs active (limit {max})",
                runs.len()
            )));
        }
        let run_id = Uuid::new_v4();
        runs.insert(
            ticket_id.to_string(),
            TaskRun {
                run_id,
                phase,
                log_file,
                started_at: Utc::now(),
                started: Instant::now(),
                stop_tx: Some(stop_tx),
            },
        );
        Ok(run_id)
    }

    /// Whether `run_id` still holds the ticket's slot.
    pub fn owns(&self, ticket_id: &str, run_id: Uuid) -> bool {
        self.runs
            .lock()
            .get(ticket_id)
            .is_some_and(|run| run.run_id == run_id)
    }

    /// Remove the entry only if it still belongs to `run_id`.
    pub fn remove_if_run(&self, ticket_id: &str, run_id: Uuid) -> bool {
        let mut runs = self.runs.lock();
        if runs.get(ticket_id).is_some_and(|run| run.run_id == run_id) {
            runs.remove(ticket_id);
            true
        } else {
            false
        }
    }

    /// Remove the entry and signal its supervisor to terminate the process.
    pub fn stop(&self, ticket_id: &str) -> Option<TaskRunInfo> {
        let mut run = self.runs.lock().remove(ticket_id)?;
        if let Some(tx) = run.stop_tx.take() {
            let _ = tx.send(());
        }
        Some(info(ticket_id, &run))
    }

    /// Stop every run.
    pub fn stop_all(&self) -> Vec<TaskRunInfo> {
        let drained: Vec<(String, TaskRun)> = self.runs.lock().drain().collect();
        drained
            .into_iter()
            .map(|(ticket_id, mut run)| {
                if let Some(tx) = run.stop_tx.take() {
                    let _ = tx.send(());
                }
                info(&ticket_id, &run)
            })
            .collect()
    }

    /// Whether the ticket holds a slot, launching or live.
    pub fn is_running(&self, ticket_id: &str) -> bool {
        self.runs.lock().contains_key(ticket_id)
    }

    /// View of the ticket's run, if any.
    pub fn get(&self, ticket_id: &str) -> Option<TaskRunInfo> {
        self.runs.lock().get(ticket_id).map(|run| info(ticket_id, run))
    }

    /// Every run, sorted by ticket id.
    pub fn snapshot(&self) -> Vec<TaskRunInfo> {
        let mut list: Vec<TaskRunInfo> = self
            .runs
            .lock()
            .iter()
            .map(|(id, run)| info(id, run))
            .collect();
        list.sort_by(|a, b| a.ticket_id.cmp(&b.ticket_id));
        list
    }

    /// Number of held slots.
    pub fn len(&self) -> usize {
        self.runs.lock().len()
    }

    /// No slots held.
    pub fn is_empty(&self) -> bool {
        self.runs.lock().is_empty()
    }
}

fn info(ticket_id: &str, run: &TaskRun) -> TaskRunInfo {
    TaskRunInfo {
        ticket_id: ticket_id.to_string(),
        run_id: run.run_id,
        phase: run.phase,
        log_file: run.log_file.clone(),
        started_at: run.started_at,
        run_time: run.started.elapsed().as_secs(),
    }
}
