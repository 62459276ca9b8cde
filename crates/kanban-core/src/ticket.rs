use crate::{KanbanError, KanbanResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of work a ticket describes. Selects the start-phase prompt template
/// and whether leaving review goes through a commit phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    /// New functionality.
    #[default]
    Feature,
    /// A defect to analyse and fix.
    Bug,
    /// Refactoring or polish of existing code.
    Improvement,
    /// Read-only analysis. Never committed.
    Check,
}

impl std::fmt::Display for TicketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketType::Feature => write!(f, "feature"),
            TicketType::Bug => write!(f, "bug"),
            TicketType::Improvement => write!(f, "improvement"),
            TicketType::Check => write!(f, "check"),
        }
    }
}

/// Board ordering hint. Shown in prompts; has no effect on scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Drop everything.
    Critical,
    /// Next up.
    High,
    /// The default.
    #[default]
    Medium,
    /// Whenever there is time.
    Low,
}

/// Primary workflow position of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketStatus {
    /// Created, never started.
    #[default]
    Backlog,
    /// An agent run is live, or was stopped (see [`Ticket::stopped`]).
    InProgress,
    /// The last run exited; waiting for approve, complete or rework.
    Review,
    /// Terminal.
    Done,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Backlog => write!(f, "backlog"),
            TicketStatus::InProgress => write!(f, "in-progress"),
            TicketStatus::Review => write!(f, "review"),
            TicketStatus::Done => write!(f, "done"),
        }
    }
}

/// A unit of work tracked through the board.
///
/// Serialized with camelCase keys so the on-disk `tickets.json` document
/// stays readable by the board UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Zero-padded board counter, e.g. `"001"`.
    pub id: String,
    /// Project whose directory the agent runs in.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Serialized as `type`.
    #[serde(rename = "type", default)]
    pub ticket_type: TicketType,
    /// One-line summary.
    pub title: String,
    /// Free-form body embedded in the start prompt.
    #[serde(default)]
    pub description: String,
    /// What "done" means; becomes a checklist in the start prompt.
    #[serde(default)]
    pub success_criteria: Option<String>,
    /// Ordering hint.
    #[serde(default)]
    pub priority: Priority,
    /// Persisted workflow position.
    #[serde(default)]
    pub status: TicketStatus,
    /// Only meaningful while `status` is in-progress: the run was interrupted.
    #[serde(default)]
    pub stopped: bool,
    /// Set while the commit phase launched by an approval is running.
    #[serde(default)]
    pub approving: bool,
    /// Agent session token. Assigned once, never regenerated.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Number of rework launches so far.
    #[serde(default)]
    pub rework_count: u32,
    /// Text of the most recent rework request.
    #[serde(default)]
    pub last_rework_request: Option<String>,
    /// Linked issue in the external tracker, e.g. `PROJ-42`.
    #[serde(default)]
    pub jira_key: Option<String>,
    /// Tail of the most recent run's combined output.
    #[serde(default)]
    pub claude_output: Option<String>,
    /// Exit code of the most recent run; `None` when it died from a signal.
    #[serde(default)]
    pub last_exit_code: Option<i32>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Bumped by every mutation.
    pub updated_at: DateTime<Utc>,
    /// First start-phase launch.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Last time a run exited or the ticket was closed without one.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Build a fresh backlog ticket from client input.
    pub fn new(id: impl Into<String>, input: NewTicket) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project_id: input.project_id,
            ticket_type: input.ticket_type,
            title: input.title,
            description: input.description,
            success_criteria: input.success_criteria,
            priority: input.priority,
            status: TicketStatus::Backlog,
            stopped: false,
            approving: false,
            session_id: input.session_id.filter(|s| !s.trim().is_empty()),
            rework_count: 0,
            last_rework_request: None,
            jira_key: input.jira_key,
            claude_output: None,
            last_exit_code: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Check tickets are analysis-only and close without a commit phase.
    pub fn is_check(&self) -> bool {
        self.ticket_type == TicketType::Check
    }

    /// Apply an edit of the free-text fields. Workflow fields are untouched.
    ///
    /// Validation runs before anything is assigned, so a rejected patch leaves
    /// the ticket as it was.
    pub fn apply_patch(&mut self, patch: TicketPatch) -> KanbanResult<()> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(KanbanError::Validation("title must not be empty".into()));
        }
        if let Some(key) = patch.jira_key.as_deref().filter(|k| !k.trim().is_empty()) {
            ensure_issue_key(key)?;
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(criteria) = patch.success_criteria {
            self.success_criteria = non_empty(criteria);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(project_id) = patch.project_id {
            self.project_id = non_empty(project_id);
        }
        if let Some(jira_key) = patch.jira_key {
            self.jira_key = non_empty(jira_key);
        }
        self.touch();
        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Whether `key` looks like a tracker issue key: an uppercase project key
/// (letters, digits, `_`; starting with a letter), a dash, then digits.
pub fn is_issue_key(key: &str) -> bool {
    let Some((project, number)) = key.split_once('-') else {
        return false;
    };
    let mut project_chars = project.chars();
    project_chars
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
        && project_chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit())
}

/// [`is_issue_key`] as a `Validation` error.
pub fn ensure_issue_key(key: &str) -> KanbanResult<()> {
    if is_issue_key(key) {
        Ok(())
    } else {
        Err(KanbanError::Validation(format!(
            "'{key}' is not an issue key (expected e.g. PROJ-123)"
        )))
    }
}

/// Client input for creating a ticket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    /// Project to run in.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Serialized as `type`; defaults to feature.
    #[serde(rename = "type", default)]
    pub ticket_type: TicketType,
    /// Required, non-blank.
    pub title: String,
    /// Free-form body.
    #[serde(default)]
    pub description: String,
    /// Acceptance criteria.
    #[serde(default)]
    pub success_criteria: Option<String>,
    /// Ordering hint.
    #[serde(default)]
    pub priority: Priority,
    /// Must be a well-formed issue key when present.
    #[serde(default)]
    pub jira_key: Option<String>,
    /// Adopt an existing agent session instead of minting one on first start.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl NewTicket {
    /// Minimal input: a title and a type.
    pub fn new(title: impl Into<String>, ticket_type: TicketType) -> Self {
        Self {
            title: title.into(),
            ticket_type,
            ..Self::default()
        }
    }

    /// Set the project.
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Reject blank titles and malformed issue keys.
    pub fn validate(&self) -> KanbanResult<()> {
        if self.title.trim().is_empty() {
            return Err(KanbanError::Validation("title must not be empty".into()));
        }
        if let Some(key) = self.jira_key.as_deref().filter(|k| !k.trim().is_empty()) {
            ensure_issue_key(key)?;
        }
        Ok(())
    }
}

/// Edit of a ticket's free-text fields. An empty string clears an optional field.
///
/// Status, type and run bookkeeping are not editable; unknown keys such as
/// `type` or `status` are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPatch {
    /// Must stay non-blank.
    #[serde(default)]
    pub title: Option<String>,
    /// Free-form body.
    #[serde(default)]
    pub description: Option<String>,
    /// Acceptance criteria.
    #[serde(default)]
    pub success_criteria: Option<String>,
    /// Ordering hint.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Project to run in.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Must be a well-formed issue key unless it clears the link.
    #[serde(default)]
    pub jira_key: Option<String>,
}
