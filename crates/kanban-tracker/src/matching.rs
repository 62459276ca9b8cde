use crate::client::Transition;
use std::fmt;

/// Internal status a tracker issue should be moved towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerTarget {
    /// A run started from backlog.
    InProgress,
    /// Work waiting for a reviewer.
    Review,
    /// Approved or completed.
    Done,
}

impl TrackerTarget {
    /// Lowercase fragments that identify this target in a transition or state name.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            TrackerTarget::InProgress => &["in progress", "start progress", "진행 중", "진행중"],
            TrackerTarget::Review => &["in review", "review", "리뷰", "검토"],
            TrackerTarget::Done => &[
                "done",
                "completed",
                "closed",
                "resolved",
                "완료",
                "해결됨",
                "종료",
            ],
        }
    }
}

impl fmt::Display for TrackerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerTarget::InProgress => write!(f, "in-progress"),
            TrackerTarget::Review => write!(f, "review"),
            TrackerTarget::Done => write!(f, "done"),
        }
    }
}

/// First transition, in tracker order, whose name or destination name contains
/// any alias of `target` (case-insensitive).
pub fn select_transition(transitions: &[Transition], target: TrackerTarget) -> Option<&Transition> {
    let aliases = target.aliases();
    transitions.iter().find(|t| {
        let name = t.name.to_lowercase();
        let dest = t.destination().map(str::to_lowercase).unwrap_or_default();
        aliases
            .iter()
            .any(|alias| name.contains(alias) || dest.contains(alias))
    })
}
