//! Durable state for the Kanban board: the ticket document, the project
//! registry and the append-only per-ticket logs.

/// Append-only per-ticket run logs.
pub mod log_sink;
/// Project registry persisted as `projects.json`.
pub mod project_store;
/// Ticket document persisted as `tickets.json`.
pub mod ticket_store;

pub use log_sink::{LogMarker, LogSink, LogWriter};
pub use project_store::{FileProjectStore, ProjectStore};
pub use ticket_store::{FileTicketStore, TicketBoard, TicketMutation, TicketStore};
