//! HTTP control surface for the Kanban agent board.
//!
//! Exposes the [`Orchestrator`](kanban_orchestrator::Orchestrator) operations
//! as a JSON API under `/api`, plus an unauthenticated `/health` check.

/// Route handlers.
pub mod api;
/// Error to HTTP response mapping.
pub mod error;
/// API-key authentication.
pub mod middleware;
/// Router assembly and serving.
pub mod server;

pub use error::{ApiError, ApiResult};
pub use middleware::AuthConfig;
pub use server::GatewayServer;
