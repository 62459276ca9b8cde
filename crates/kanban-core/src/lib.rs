//! Core types and error definitions for the Kanban agent board.
//!
//! This crate provides the foundational types shared across all Kanban crates,
//! including error handling, the ticket record and the project record.
//!
//! # Main types
//!
//! - [`KanbanError`]: Unified error enum for all Kanban subsystems.
//! - [`KanbanResult`]: Convenience alias for `Result<T, KanbanError>`.
//! - [`Ticket`]: A unit of work moving through backlog → in-progress → review → done.
//! - [`TicketStatus`], [`TicketType`], [`Priority`]: Ticket enumerations.
//! - [`Project`]: The working directory an agent runs in.

/// Project records (execution working directories).
pub mod project;
/// Ticket records and their enumerations.
pub mod ticket;

pub use project::{NewProject, Project};
pub use ticket::{
    ensure_issue_key, is_issue_key, NewTicket, Priority, Ticket, TicketPatch, TicketStatus,
    TicketType,
};

// --- Error types ---

/// Top-level error type for the Kanban board.
///
/// Each variant corresponds to a failure class the control surface can
/// report back to a client.
#[derive(Debug, thiserror::Error)]
pub enum KanbanError {
    /// A ticket, project or log was looked up by id and does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client input failed validation (empty title, duplicate id, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested workflow trigger is not legal from the ticket's current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The ticket already has an active agent run.
    #[error("Already running: {0}")]
    AlreadyRunning(String),

    /// Admission control refused a new agent run.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Agent executable unresolved, project path missing, bad config file.
    #[error("Config error: {0}")]
    Config(String),

    /// The agent process could not be started.
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// The ticket or project document could not be read or written.
    #[error("Store error: {0}")]
    Store(String),

    /// An error from the external issue tracker.
    #[error("Tracker error: {0}")]
    Tracker(String),

    /// An error while inspecting a project's working tree.
    #[error("Git error: {0}")]
    Git(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KanbanError {
    /// Short machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            KanbanError::NotFound(_) => "not_found",
            KanbanError::Validation(_) => "validation",
            KanbanError::InvalidTransition(_) => "invalid_transition",
            KanbanError::AlreadyRunning(_) => "already_running",
            KanbanError::Capacity(_) => "capacity",
            KanbanError::Config(_) => "config",
            KanbanError::Spawn(_) => "spawn",
            KanbanError::Store(_) => "store",
            KanbanError::Tracker(_) => "tracker",
            KanbanError::Git(_) => "git",
            KanbanError::Json(_) => "json",
            KanbanError::Io(_) => "io",
        }
    }
}

/// A convenience `Result` alias using [`KanbanError`].
pub type KanbanResult<T> = Result<T, KanbanError>;
