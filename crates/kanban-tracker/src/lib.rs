//! External issue tracker integration for the Kanban board.
//!
//! Ticket status changes are mirrored onto a Jira issue's workflow on a
//! best-effort basis. Nothing in this crate can fail a ticket transition:
//! [`TrackerSync`] runs every call in a detached task and only logs errors.
//!
//! # Main types
//!
//! - [`IssueTracker`]: Trait over the tracker's HTTP API.
//! - [`JiraClient`]: Jira Cloud REST v3 implementation.
//! - [`TrackerTarget`] / [`select_transition`]: Pure alias matching.
//! - [`TrackerSync`]: Fire-and-forget adapter used by the orchestrator.

/// Jira REST client and wire types.
pub mod client;
/// Mapping of tracker issues onto new tickets.
pub mod import;
/// Target-status alias table and transition selection.
pub mod matching;
/// Fire-and-forget status mirroring.
pub mod sync;

pub use client::{
    IssueTracker, JiraClient, TrackerConfig, TrackerIssue, TrackerUser, Transition,
    TransitionState,
};
pub use import::{map_issue_type, map_priority, IssueImport};
pub use matching::{select_transition, TrackerTarget};
pub use sync::{transition_issue, TrackerSync, TransitionOutcome};
