use crate::client::{IssueTracker, JiraClient, TrackerConfig};
use crate::matching::{select_transition, TrackerTarget};
use kanban_core::KanbanResult;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A transition that was actually executed on the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    /// Name of the executed transition.
    pub transition_name: String,
    /// Status the issue moved to, when the tracker reported it.
    pub to_status: Option<String>,
}

/// Best-effort mirror of ticket status onto the tracker.
///
/// The tracker handle can be swapped at runtime (config reload). With no
/// tracker configured every call is inert.
#[derive(Default)]
pub struct TrackerSync {
    tracker: RwLock<Option<Arc<dyn IssueTracker>>>,
}

impl TrackerSync {
    /// Wrap an already built tracker; `None` gives an inert sync.
    pub fn new(tracker: Option<Arc<dyn IssueTracker>>) -> Self {
        Self {
            tracker: RwLock::new(tracker),
        }
    }

    /// Build from config; an unconfigured host yields an inert sync.
    pub fn from_config(config: &TrackerConfig) -> Self {
        let sync = Self::default();
        sync.reconfigure(config);
        sync
    }

    /// Replace the client with one built from `config`. Notifications already
    /// in flight keep the client they started with.
    pub fn reconfigure(&self, config: &TrackerConfig) {
        let tracker: Option<Arc<dyn IssueTracker>> = if config.is_configured() {
            Some(Arc::new(JiraClient::new(config)))
        } else {
            None
        };
        *self.tracker.write() = tracker;
    }

    /// Swap in a specific tracker.
    pub fn set_tracker(&self, tracker: Option<Arc<dyn IssueTracker>>) {
        *self.tracker.write() = tracker;
    }

    /// The current tracker, if any.
    pub fn tracker(&self) -> Option<Arc<dyn IssueTracker>> {
        self.tracker.read().clone()
    }

    /// Link to the issue, when a tracker is configured.
    pub fn browse_url(&self, key: &str) -> Option<String> {
        self.tracker().map(|t| t.browse_url(key))
    }

    /// Fire-and-forget. Returns the handle of the detached task, or `None`
    /// when no tracker is configured.
    pub fn notify(&self, key: &str, target: TrackerTarget) -> Option<JoinHandle<()>> {
        let tracker = self.tracker()?;
        let key = key.to_string();
        Some(tokio::spawn(async move {
            match transition_issue(tracker.as_ref(), &key, target).await {
                Ok(Some(outcome)) => info!(
                    jira_key = %key,
                    target = %target,
                    transition = %outcome.transition_name,
                    to_status = outcome.to_status.as_deref().unwrap_or(""),
                    "Tracker issue transitioned"
                ),
                Ok(None) => {}
                Err(e) => warn!(jira_key = %key, target = %target, error = %e, "Tracker transition failed"),
            }
        }))
    }
}

/// List the issue's transitions, pick the alias match and execute it.
/// `Ok(None)` when nothing matches.
pub async fn transition_issue(
    tracker: &dyn IssueTracker,
    key: &str,
    target: TrackerTarget,
) -> KanbanResult<Option<TransitionOutcome>> {
    let transitions = tracker.list_transitions(key).await?;
    let Some(transition) = select_transition(&transitions, target) else {
        let available: Vec<String> = transitions
            .iter()
            .map(|t| format!("{} -> {}", t.name, t.destination().unwrap_or("?")))
            .collect();
        info!(jira_key = %key, target = %target, ?available, "No matching tracker transition");
        return Ok(None);
    };
    tracker.execute_transition(key, &transition.id).await?;
    Ok(Some(TransitionOutcome {
        transition_name: transition.name.clone(),
        to_status: transition.destination().map(str::to_string),
    }))
}
