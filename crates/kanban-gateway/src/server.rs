use crate::api::{self, AppState};
use crate::middleware::{auth_middleware, AuthConfig};
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use kanban_orchestrator::Orchestrator;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

/// The HTTP control surface.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without auth.
    pub fn build(orchestrator: Orchestrator) -> Router {
        Self::build_with_auth(orchestrator, AuthConfig::default())
    }

    /// Build the gateway. `/health` stays open; everything under `/api`
    /// goes through the API-key check when keys are configured.
    pub fn build_with_auth(orchestrator: Orchestrator, auth: AuthConfig) -> Router {
        let state = Arc::new(AppState { orchestrator });

        let api = Router::new()
            .route(
                "/api/projects",
                get(api::list_projects).post(api::create_project),
            )
            .route("/api/projects/{id}", axum::routing::delete(api::delete_project))
            .route("/api/tickets", get(api::list_tickets).post(api::create_ticket))
            .route(
                "/api/tickets/{id}",
                get(api::get_ticket)
                    .patch(api::update_ticket)
                    .delete(api::delete_ticket),
            )
            .route("/api/tasks/start", post(api::start_task))
            .route("/api/tasks/running", get(api::running_tasks))
            .route("/api/tasks/{id}/log", get(api::task_log))
            .route("/api/tasks/{id}/stop", post(api::stop_task))
            .route("/api/tasks/{id}/approve", post(api::approve_task))
            .route("/api/tasks/{id}/complete", post(api::complete_task))
            .route("/api/tasks/{id}/rework", post(api::rework_task))
            .route("/api/tasks/{id}/changes", get(api::task_changes))
            .route("/api/reset", post(api::reset))
            .route("/api/jira/test", get(api::jira_test))
            .route("/api/jira/issues", get(api::jira_issues))
            .route("/api/jira/import", post(api::jira_import));

        let api = if auth.is_enabled() {
            api.route_layer(axum_mw::from_fn_with_state(
                Arc::new(auth),
                auth_middleware,
            ))
        } else {
            api
        };

        Router::new()
            .route("/health", get(api::health))
            .merge(api)
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
            .with_state(state)
    }

    /// Bind `addr` and serve until `shutdown` resolves.
    pub async fn serve<F>(router: Router, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Gateway listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
