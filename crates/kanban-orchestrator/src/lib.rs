//! Task orchestration engine for the Kanban agent board.
//!
//! Launches one external agent process per active ticket, tracks it in an
//! in-memory registry, streams its output into the ticket's log and advances
//! the ticket through the review workflow when the process exits.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Façade for start / stop / approve / complete / rework.
//! - [`TaskRegistry`]: At most one live run per ticket, with admission control.
//! - [`AgentConfig`]: Agent executable, arguments and limits.
//! - [`Phase`]: Which prompt a run was launched with.
//! - [`WorkingTreeChanges`]: Uncommitted changes in a project directory.

/// Working-tree inspection of project directories.
pub mod changes;
/// Agent executable configuration.
pub mod config;
/// The orchestrator façade.
pub mod engine;
/// Invocation building, spawning and run supervision.
pub mod launcher;
/// Phase prompt templates.
pub mod prompts;
/// In-memory registry of live runs.
pub mod registry;
/// Ticket workflow rules.
pub mod workflow;

pub use changes::{ChangedFile, FileChangeKind, WorkingTreeChanges};
pub use config::AgentConfig;
pub use engine::{
    ApproveOutcome, LaunchOutcome, LogView, Orchestrator, ResetOutcome, StopOutcome,
};
pub use launcher::{Invocation, OutputTail, RunExit, SessionArg};
pub use registry::{TaskRegistry, TaskRunInfo};
pub use workflow::{BoardState, Phase, ReworkRequest};
