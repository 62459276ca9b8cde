use crate::error::{ApiError, ApiResult};
use axum::extract::{Path, State};
use axum::Json;
use kanban_core::{KanbanError, NewProject, NewTicket, Project, Ticket, TicketPatch};
use kanban_orchestrator::{
    ApproveOutcome, LaunchOutcome, LogView, Orchestrator, ResetOutcome, StopOutcome, TaskRunInfo,
    WorkingTreeChanges,
};
use kanban_store::{ProjectStore, TicketStore};
use kanban_tracker::{IssueImport, TrackerIssue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared handler state.
pub struct AppState {
    /// Every handler goes through the engine.
    pub orchestrator: Orchestrator,
}

/// `{"success": true, ...body}`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

type Shared = State<Arc<AppState>>;

/// `GET /health`: liveness plus the number of live runs.
pub async fn health(State(state): Shared) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "kanban",
        "running": state.orchestrator.registry().len(),
    }))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// `GET /api/projects`
pub async fn list_projects(State(state): Shared) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(state.orchestrator.projects().list().await?))
}

/// `POST /api/projects`
pub async fn create_project(
    State(state): Shared,
    Json(input): Json<NewProject>,
) -> ApiResult<Json<Success<Project>>> {
    let project = state.orchestrator.projects().create(input).await?;
    info!(project_id = %project.id, path = %project.path.display(), "Project registered");
    Ok(success(project))
}

/// `DELETE /api/projects/{id}`
pub async fn delete_project(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.orchestrator.projects().delete(&id).await? {
        return Err(KanbanError::NotFound(format!("project {id}")).into());
    }
    Ok(Json(json!({"success": true})))
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

/// `GET /api/tickets`
pub async fn list_tickets(State(state): Shared) -> ApiResult<Json<Vec<Ticket>>> {
    Ok(Json(state.orchestrator.tickets().list().await?))
}

/// `GET /api/tickets/{id}`
pub async fn get_ticket(State(state): Shared, Path(id): Path<String>) -> ApiResult<Json<Ticket>> {
    state
        .orchestrator
        .tickets()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| KanbanError::NotFound(format!("ticket {id}")).into())
}

/// `POST /api/tickets`: new backlog ticket.
pub async fn create_ticket(
    State(state): Shared,
    Json(input): Json<NewTicket>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state.orchestrator.tickets().create(input).await?;
    info!(ticket_id = %ticket.id, ticket_type = %ticket.ticket_type, "Ticket created");
    Ok(Json(ticket))
}

/// `PATCH /api/tickets/{id}`: edit text fields. Status and type are not editable here.
pub async fn update_ticket(
    State(state): Shared,
    Path(id): Path<String>,
    Json(patch): Json<TicketPatch>,
) -> ApiResult<Json<Ticket>> {
    let ticket = state
        .orchestrator
        .tickets()
        .update(&id, Box::new(move |t| t.apply_patch(patch)))
        .await?;
    Ok(Json(ticket))
}

/// `DELETE /api/tickets/{id}`: refused while the ticket has a live run.
pub async fn delete_ticket(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.orchestrator.delete_ticket(&id).await?;
    Ok(Json(json!({"success": true})))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Body of `POST /api/tasks/start`.
pub struct StartRequest {
    /// Ticket to launch.
    pub ticket_id: String,
    /// Overrides the ticket's project for this launch and is recorded on it.
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Body of `POST /api/tasks/{id}/rework`.
pub struct ReworkRequestBody {
    /// Reviewer feedback; `request` is accepted as an alias.
    #[serde(alias = "request")]
    pub additional_request: String,
}

/// `POST /api/tasks/start`
pub async fn start_task(
    State(state): Shared,
    Json(req): Json<StartRequest>,
) -> ApiResult<Json<Success<LaunchOutcome>>> {
    let outcome = state
        .orchestrator
        .start(&req.ticket_id, req.project_id.as_deref())
        .await?;
    Ok(success(outcome))
}

/// `GET /api/tasks/running`
pub async fn running_tasks(State(state): Shared) -> Json<Vec<TaskRunInfo>> {
    Json(state.orchestrator.running())
}

/// `GET /api/tasks/{id}/log`
pub async fn task_log(State(state): Shared, Path(id): Path<String>) -> ApiResult<Json<LogView>> {
    Ok(Json(state.orchestrator.log(&id).await?))
}

/// `POST /api/tasks/{id}/stop`
pub async fn stop_task(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<Success<StopOutcome>>> {
    Ok(success(state.orchestrator.stop(&id).await?))
}

/// `POST /api/tasks/{id}/approve`
pub async fn approve_task(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<Success<ApproveOutcome>>> {
    Ok(success(state.orchestrator.approve(&id).await?))
}

/// `POST /api/tasks/{id}/complete`: check tickets only.
pub async fn complete_task(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let ticket = state.orchestrator.complete(&id).await?;
    Ok(Json(json!({"success": true, "ticket": ticket})))
}

/// `POST /api/tasks/{id}/rework`
pub async fn rework_task(
    State(state): Shared,
    Path(id): Path<String>,
    Json(body): Json<ReworkRequestBody>,
) -> ApiResult<Json<Success<LaunchOutcome>>> {
    Ok(success(
        state
            .orchestrator
            .rework(&id, &body.additional_request)
            .await?,
    ))
}

/// `GET /api/tasks/{id}/changes`
pub async fn task_changes(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkingTreeChanges>> {
    Ok(Json(state.orchestrator.changes(&id).await?))
}

/// `POST /api/reset`: stop everything and empty the board.
pub async fn reset(State(state): Shared) -> ApiResult<Json<Success<ResetOutcome>>> {
    Ok(success(state.orchestrator.reset().await?))
}

// ---------------------------------------------------------------------------
// Jira
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
/// Body of `POST /api/jira/import`.
pub struct ImportRequest {
    /// Issues picked in the import dialog.
    pub issues: Vec<IssueImport>,
}

fn not_configured() -> ApiError {
    KanbanError::Config("Jira is not configured".into()).into()
}

/// `GET /api/jira/test`. Always 200; failures are reported in the body.
pub async fn jira_test(State(state): Shared) -> Json<Value> {
    let Some(tracker) = state.orchestrator.tracker().tracker() else {
        return Json(json!({"connected": false, "error": "Jira is not configured"}));
    };
    match tracker.test_connection().await {
        Ok(user) => Json(json!({
            "connected": true,
            "user": user.display_name,
            "email": user.email_address,
        })),
        Err(e) => Json(json!({"connected": false, "error": e.to_string()})),
    }
}

/// `GET /api/jira/issues`: unfinished issues assigned to the configured account.
pub async fn jira_issues(State(state): Shared) -> ApiResult<Json<Vec<TrackerIssue>>> {
    let tracker = state
        .orchestrator
        .tracker()
        .tracker()
        .ok_or_else(not_configured)?;
    Ok(Json(tracker.search_my_issues().await?))
}

/// `POST /api/jira/import`: keys already on the board are skipped.
pub async fn jira_import(
    State(state): Shared,
    Json(req): Json<ImportRequest>,
) -> ApiResult<Json<Value>> {
    let inputs = req.issues.iter().map(IssueImport::to_new_ticket).collect();
    let tickets = state.orchestrator.tickets().import(inputs).await?;
    info!(requested = req.issues.len(), imported = tickets.len(), "Jira issues imported");
    Ok(Json(json!({
        "success": true,
        "imported": tickets.len(),
        "tickets": tickets,
    })))
}
