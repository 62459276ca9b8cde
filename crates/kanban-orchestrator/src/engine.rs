use crate::changes::{self, WorkingTreeChanges};
use crate::config::AgentConfig;
use crate::launcher::{self, RunContext, RunExit, SessionArg};
use crate::prompts;
use crate::registry::{TaskRegistry, TaskRunInfo};
use crate::workflow::{self, Phase, ReworkRequest};
use kanban_core::{KanbanError, KanbanResult, Project, Ticket, TicketStatus};
use kanban_store::{
    FileProjectStore, FileTicketStore, LogMarker, LogSink, LogWriter, ProjectStore, TicketStore,
};
use kanban_tracker::{TrackerSync, TrackerTarget};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of a launch (start, approve or rework).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOutcome {
    /// The ticket as recorded once the process was running.
    pub ticket: Ticket,
    /// Which prompt was sent.
    pub phase: Phase,
    /// Session the agent was launched with.
    pub session_id: String,
    /// Whether the launch resumed an existing agent session.
    pub resumed: bool,
    /// Log the run streams into.
    pub log_file: PathBuf,
}

/// Result of an approval.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveOutcome {
    /// In progress with a commit phase running, or done.
    pub ticket: Ticket,
    /// The project had nothing to commit, so the ticket went straight to done.
    pub skipped_commit: bool,
}

/// Result of a stop.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    /// The ticket after the stop flag was recorded.
    pub ticket: Ticket,
    /// A live process was signalled. False when only the flag was set.
    pub was_running: bool,
}

/// A ticket's log plus its live-run status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogView {
    /// Whole log text; empty when `exists` is false.
    pub log: String,
    /// Whether the ticket has ever been run.
    pub exists: bool,
    /// Whether a run currently holds the ticket's slot.
    pub is_running: bool,
    /// Whole seconds since the live run started.
    pub run_time: Option<u64>,
}

/// Result of a board reset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    /// Runs that were signalled to stop.
    pub stopped_runs: usize,
    /// Log files removed.
    pub deleted_logs: usize,
}

/// The task orchestration engine.
///
/// Cheap to clone; every clone shares the same stores, registry and tracker.
#[derive(Clone)]
pub struct Orchestrator {
    tickets: Arc<dyn TicketStore>,
    projects: Arc<dyn ProjectStore>,
    logs: LogSink,
    registry: Arc<TaskRegistry>,
    tracker: Arc<TrackerSync>,
    agent: Arc<RwLock<AgentConfig>>,
}

impl Orchestrator {
    /// Assemble an engine over existing stores. The registry is sized from
    /// `agent.max_concurrent_runs`.
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        projects: Arc<dyn ProjectStore>,
        logs: LogSink,
        tracker: Arc<TrackerSync>,
        agent: AgentConfig,
    ) -> Self {
        Self {
            tickets,
            projects,
            logs,
            registry: Arc::new(TaskRegistry::new(agent.max_concurrent_runs)),
            tracker,
            agent: Arc::new(RwLock::new(agent)),
        }
    }

    /// File-backed engine rooted at `data_dir` (`tickets.json`, `projects.json`, `logs/`).
    pub async fn open(
        data_dir: &Path,
        agent: AgentConfig,
        tracker: Arc<TrackerSync>,
    ) -> KanbanResult<Self> {
        let tickets = FileTicketStore::new(data_dir.to_path_buf()).await?;
        let projects = FileProjectStore::new(data_dir.to_path_buf()).await?;
        let logs = LogSink::new(data_dir.join("logs")).await?;
        Ok(Self::new(
            Arc::new(tickets),
            Arc::new(projects),
            logs,
            tracker,
            agent,
        ))
    }

    /// The ticket store, for reads and CRUD that bypass the workflow.
    pub fn tickets(&self) -> &Arc<dyn TicketStore> {
        &self.tickets
    }

    /// The project registry.
    pub fn projects(&self) -> &Arc<dyn ProjectStore> {
        &self.projects
    }

    /// Tracker sync, swappable on config reload.
    pub fn tracker(&self) -> &Arc<TrackerSync> {
        &self.tracker
    }

    /// Live runs.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Snapshot of the current agent configuration.
    pub fn agent_config(&self) -> AgentConfig {
        self.agent.read().clone()
    }

    /// Swap the agent configuration. Affects launches from now on; live runs keep theirs.
    pub fn set_agent_config(&self, config: AgentConfig) {
        self.registry.set_max_concurrent(config.max_concurrent_runs);
        *self.agent.write() = config;
    }

    // -----------------------------------------------------------------------
    // Workflow triggers
    // -----------------------------------------------------------------------

    /// Launch the start-phase prompt. `project_id` overrides the ticket's project.
    pub async fn start(
        &self,
        ticket_id: &str,
        project_id: Option<&str>,
    ) -> KanbanResult<LaunchOutcome> {
        let ticket = self.ticket(ticket_id).await?;
        workflow::ensure_can_start(&ticket, self.registry.is_running(ticket_id))?;
        let project = self.resolve_project(&ticket, project_id).await?;
        let notify_tracker = ticket.status == TicketStatus::Backlog;

        let outcome = self.launch(ticket, project, Phase::Start, None).await?;
        if notify_tracker {
            if let Some(key) = &outcome.ticket.jira_key {
                self.tracker.notify(key, TrackerTarget::InProgress);
            }
        }
        Ok(outcome)
    }

    /// Terminate the live run, if any, and flag the ticket as stopped.
    pub async fn stop(&self, ticket_id: &str) -> KanbanResult<StopOutcome> {
        let ticket = self.ticket(ticket_id).await?;
        let run = self.registry.stop(ticket_id);
        if run.is_none() {
            workflow::ensure_can_stop(&ticket, false)?;
        }
        let ticket = self
            .tickets
            .update(
                ticket_id,
                Box::new(|t| {
                    workflow::mark_stopped(t);
                    Ok(())
                }),
            )
            .await?;
        info!(ticket_id = %ticket_id, was_running = run.is_some(), "Task stopped");
        Ok(StopOutcome {
            ticket,
            was_running: run.is_some(),
        })
    }

    /// Approve reviewed work. Check tickets complete directly; other types
    /// launch the commit phase unless the project's git tree is clean.
    pub async fn approve(&self, ticket_id: &str) -> KanbanResult<ApproveOutcome> {
        let ticket = self.ticket(ticket_id).await?;
        if ticket.is_check() {
            let ticket = self.complete(ticket_id).await?;
            return Ok(ApproveOutcome {
                ticket,
                skipped_commit: false,
            });
        }
        workflow::ensure_can_approve(&ticket, self.registry.is_running(ticket_id))?;
        let project = self.resolve_project(&ticket, None).await?;

        match changes::inspect_async(project.path.clone()).await {
            Ok(changes) if changes.is_clean_repository() => {
                return self.approve_without_commit(ticket_id).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(ticket_id = %ticket_id, error = %e, "Working tree inspection failed; launching commit phase");
            }
        }

        let outcome = self.launch(ticket, project, Phase::Approve, None).await?;
        Ok(ApproveOutcome {
            ticket: outcome.ticket,
            skipped_commit: false,
        })
    }

    async fn approve_without_commit(&self, ticket_id: &str) -> KanbanResult<ApproveOutcome> {
        let ticket = self
            .finish_directly(ticket_id, workflow::ensure_can_approve)
            .await?;
        let mut log = self.logs.open(ticket_id).await?;
        log.marker(LogMarker::Approve, "Approved with no changes to commit; marked done")
            .await?;
        log.close().await?;
        info!(ticket_id = %ticket_id, "Approved without commit phase");
        Ok(ApproveOutcome {
            ticket,
            skipped_commit: true,
        })
    }

    /// Close a reviewed check ticket without launching anything.
    pub async fn complete(&self, ticket_id: &str) -> KanbanResult<Ticket> {
        let ticket = self
            .finish_directly(ticket_id, workflow::ensure_can_complete)
            .await?;
        info!(ticket_id = %ticket_id, "Ticket completed");
        Ok(ticket)
    }

    /// Move a reviewed ticket to done without a launch, re-checking `guard`
    /// inside the store's write section.
    async fn finish_directly(
        &self,
        ticket_id: &str,
        guard: fn(&Ticket, bool) -> KanbanResult<()>,
    ) -> KanbanResult<Ticket> {
        let registry = self.registry.clone();
        let id = ticket_id.to_string();
        let ticket = self
            .tickets
            .update(
                ticket_id,
                Box::new(move |t| {
                    guard(t, registry.is_running(&id))?;
                    workflow::mark_done(t);
                    Ok(())
                }),
            )
            .await?;
        if let Some(key) = &ticket.jira_key {
            self.tracker.notify(key, TrackerTarget::Done);
        }
        Ok(ticket)
    }

    /// Send reviewer feedback back to the agent.
    pub async fn rework(&self, ticket_id: &str, request: &str) -> KanbanResult<LaunchOutcome> {
        let ticket = self.ticket(ticket_id).await?;
        workflow::ensure_can_rework(&ticket, self.registry.is_running(ticket_id))?;
        // Rejects blank text early; the counter is read again once the slot is held.
        ReworkRequest::next_for(&ticket, request)?;
        let project = self.resolve_project(&ticket, None).await?;
        self.launch(ticket, project, Phase::Rework, Some(request.to_string()))
            .await
    }

    // -----------------------------------------------------------------------
    // Launch path
    //
    // Callers check their guard on a plain read for a fast rejection. Once the
    // registry slot is reserved no other launch can touch the ticket, and the
    // guard runs again inside every write that follows.
    // -----------------------------------------------------------------------

    async fn launch(
        &self,
        ticket: Ticket,
        project: Project,
        phase: Phase,
        rework_text: Option<String>,
    ) -> KanbanResult<LaunchOutcome> {
        let workdir = project.ensure_workdir()?.clone();
        let config = self.agent_config();
        let program = config.resolve_executable()?;
        let log_file = self.logs.path_for(&ticket.id)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let run_id = self
            .registry
            .try_reserve(&ticket.id, phase, log_file.clone(), stop_tx)?;

        let ticket_id = ticket.id.clone();
        let request = LaunchRequest {
            ticket_id: ticket_id.clone(),
            project,
            phase,
            rework_text,
            config,
            program,
            workdir,
            log_file,
            run_id,
        };
        match self.launch_reserved(request, stop_rx).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.registry.remove_if_run(&ticket_id, run_id);
                Err(e)
            }
        }
    }

    async fn launch_reserved(
        &self,
        req: LaunchRequest,
        stop_rx: oneshot::Receiver<()>,
    ) -> KanbanResult<LaunchOutcome> {
        let ticket_id = req.ticket_id.clone();
        let (ticket, session) = self.claim(&ticket_id, req.phase).await?;
        let rework = req
            .rework_text
            .clone()
            .map(|text| ReworkRequest::next_for(&ticket, text))
            .transpose()?;

        let prompt = match req.phase {
            Phase::Start => {
                let jira_url = ticket
                    .jira_key
                    .as_deref()
                    .and_then(|key| self.tracker.browse_url(key));
                prompts::start_prompt(&ticket, &req.project, jira_url.as_deref())
            }
            Phase::Approve => prompts::approve_prompt(&ticket),
            Phase::Rework => match &rework {
                Some(rework) => prompts::rework_prompt(&ticket, rework),
                None => {
                    return Err(KanbanError::Validation(
                        "rework launch without a request".into(),
                    ))
                }
            },
        };

        let invocation = launcher::build_invocation(
            &req.config,
            req.program.clone(),
            &session,
            &prompt,
            req.workdir.clone(),
        );

        let mut log = self.logs.open(&ticket_id).await?;
        write_launch_markers(&mut log, &req, &ticket, rework.as_ref(), &session).await?;

        let mut child = match launcher::spawn(&invocation) {
            Ok(child) => child,
            Err(e) => {
                error!(ticket_id = %ticket_id, phase = %req.phase, error = %e, "Agent spawn failed");
                let _ = log.error(&format!("Spawn failed: {e}\n")).await;
                let _ = log.close().await;
                return Err(e);
            }
        };

        let registry = self.registry.clone();
        let owner_id = ticket_id.clone();
        let run_id = req.run_id;
        let phase = req.phase;
        let project_id = req.project.id.clone();
        let entered = self
            .tickets
            .update(
                &ticket_id,
                Box::new(move |t| {
                    phase.launch_guard()(t, false)?;
                    workflow::enter_running(t, phase, rework.as_ref());
                    t.project_id = Some(project_id);
                    if !registry.owns(&owner_id, run_id) {
                        // Stopped before the launch finished.
                        t.stopped = true;
                    }
                    Ok(())
                }),
            )
            .await;
        let ticket = match entered {
            Ok(ticket) => ticket,
            Err(e) => {
                error!(ticket_id = %ticket_id, error = %e, "Failed to record launch; killing agent");
                let _ = child.start_kill();
                let _ = log.error(&format!("Launch aborted: {e}\n")).await;
                let _ = log.close().await;
                return Err(e);
            }
        };

        info!(
            ticket_id = %ticket_id,
            phase = %req.phase,
            session_id = %session.id(),
            resumed = session.is_resume(),
            pid = child.id().unwrap_or_default(),
            "Agent run started"
        );

        let ctx = RunContext {
            ticket_id: ticket_id.clone(),
            phase: req.phase,
            tail_chars: req.config.output_tail_chars,
        };
        let engine = self.clone();
        tokio::spawn(async move {
            let exit = launcher::supervise(child, log, stop_rx, &ctx).await;
            engine.finish_run(&ctx, run_id, exit).await;
        });

        Ok(LaunchOutcome {
            ticket,
            phase: req.phase,
            session_id: session.id().to_string(),
            resumed: session.is_resume(),
            log_file: req.log_file,
        })
    }

    /// Re-check the phase guard on the stored ticket and settle its session,
    /// minting and persisting one before anything is spawned.
    ///
    /// Runs with the registry slot held, so `running` is passed as false: any
    /// live process for this ticket is ours.
    async fn claim(&self, ticket_id: &str, phase: Phase) -> KanbanResult<(Ticket, SessionArg)> {
        let minted = Uuid::new_v4().to_string();
        let candidate = minted.clone();
        let ticket = self
            .tickets
            .update(
                ticket_id,
                Box::new(move |t| {
                    phase.launch_guard()(t, false)?;
                    if t.session_id.is_none() {
                        t.session_id = Some(candidate);
                    }
                    Ok(())
                }),
            )
            .await?;
        let session = match &ticket.session_id {
            Some(id) if *id != minted => SessionArg::Resume(id.clone()),
            _ => SessionArg::New(minted),
        };
        Ok((ticket, session))
    }

    /// Exit handler. Applies the phase's exit transition only if this run
    /// still owns the ticket's registry slot; a stopped or superseded run is a no-op.
    async fn finish_run(&self, ctx: &RunContext, run_id: Uuid, exit: RunExit) {
        if exit.stopped {
            debug!(ticket_id = %ctx.ticket_id, %run_id, "Stopped run exited");
            return;
        }
        let registry = self.registry.clone();
        let owner_id = ctx.ticket_id.clone();
        let phase = ctx.phase;
        let RunExit {
            exit_code,
            output_tail,
            ..
        } = exit;
        let result = self
            .tickets
            .update(
                &ctx.ticket_id,
                Box::new(move |t| {
                    if !registry.owns(&owner_id, run_id) {
                        return Err(KanbanError::InvalidTransition(format!(
                            "run {run_id} no longer owns ticket {owner_id}"
                        )));
                    }
                    workflow::finish_run(t, phase, exit_code, output_tail);
                    Ok(())
                }),
            )
            .await;
        self.registry.remove_if_run(&ctx.ticket_id, run_id);

        match result {
            Ok(ticket) => {
                info!(
                    ticket_id = %ctx.ticket_id,
                    phase = %phase,
                    exit_code = exit_code.unwrap_or(-1),
                    status = %ticket.status,
                    "Agent run finished"
                );
                if phase == Phase::Approve {
                    if let Some(key) = &ticket.jira_key {
                        self.tracker.notify(key, TrackerTarget::Done);
                    }
                }
            }
            Err(KanbanError::InvalidTransition(reason)) => {
                debug!(ticket_id = %ctx.ticket_id, %reason, "Stale exit ignored");
            }
            Err(e) => {
                error!(ticket_id = %ctx.ticket_id, error = %e, "Failed to record run exit");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read path and maintenance
    // -----------------------------------------------------------------------

    /// The ticket's log plus its live-run status. A missing log is not an error.
    pub async fn log(&self, ticket_id: &str) -> KanbanResult<LogView> {
        let text = self.logs.read(ticket_id).await?;
        let run = self.registry.get(ticket_id);
        Ok(LogView {
            exists: text.is_some(),
            log: text.unwrap_or_default(),
            is_running: run.is_some(),
            run_time: run.map(|r| r.run_time),
        })
    }

    /// Every live run, sorted by ticket id.
    pub fn running(&self) -> Vec<TaskRunInfo> {
        self.registry.snapshot()
    }

    /// Uncommitted changes in the ticket's project directory.
    pub async fn changes(&self, ticket_id: &str) -> KanbanResult<WorkingTreeChanges> {
        let ticket = self.ticket(ticket_id).await?;
        let project = self.resolve_project(&ticket, None).await?;
        let workdir = project.ensure_workdir()?.clone();
        changes::inspect_async(workdir).await
    }

    /// Delete a ticket and its log. Refused while it has a live run.
    pub async fn delete_ticket(&self, ticket_id: &str) -> KanbanResult<()> {
        if self.registry.is_running(ticket_id) {
            return Err(KanbanError::AlreadyRunning(format!(
                "ticket {ticket_id} is running; stop it first"
            )));
        }
        if !self.tickets.delete(ticket_id).await? {
            return Err(KanbanError::NotFound(format!("ticket {ticket_id}")));
        }
        self.logs.delete(ticket_id).await?;
        info!(ticket_id = %ticket_id, "Ticket deleted");
        Ok(())
    }

    /// Kill every run, empty the board and delete all logs.
    pub async fn reset(&self) -> KanbanResult<ResetOutcome> {
        let stopped = self.registry.stop_all();
        self.tickets.reset().await?;
        let deleted_logs = self.logs.clear().await?;
        info!(stopped_runs = stopped.len(), deleted_logs, "Board reset");
        Ok(ResetOutcome {
            stopped_runs: stopped.len(),
            deleted_logs,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn ticket(&self, ticket_id: &str) -> KanbanResult<Ticket> {
        self.tickets
            .get(ticket_id)
            .await?
            .ok_or_else(|| KanbanError::NotFound(format!("ticket {ticket_id}")))
    }

    async fn resolve_project(
        &self,
        ticket: &Ticket,
        override_id: Option<&str>,
    ) -> KanbanResult<Project> {
        let project_id = override_id
            .filter(|id| !id.is_empty())
            .or(ticket.project_id.as_deref())
            .ok_or_else(|| {
                KanbanError::Validation(format!("ticket {} has no project", ticket.id))
            })?;
        self.projects
            .get(project_id)
            .await?
            .ok_or_else(|| KanbanError::NotFound(format!("project {project_id}")))
    }
}

struct LaunchRequest {
    ticket_id: String,
    project: Project,
    phase: Phase,
    rework_text: Option<String>,
    config: AgentConfig,
    program: PathBuf,
    workdir: PathBuf,
    log_file: PathBuf,
    run_id: Uuid,
}

async fn write_launch_markers(
    log: &mut LogWriter,
    req: &LaunchRequest,
    ticket: &Ticket,
    rework: Option<&ReworkRequest>,
    session: &SessionArg,
) -> KanbanResult<()> {
    match req.phase {
        Phase::Start => {
            log.marker(LogMarker::Start, &format!("Task started: {}", ticket.title))
                .await?;
            log.marker(
                LogMarker::Project,
                &format!("Project: {}", req.workdir.display()),
            )
            .await?;
        }
        Phase::Approve => {
            log.marker(LogMarker::Approve, "Approved: commit/push requested")
                .await?;
        }
        Phase::Rework => {
            if let Some(rework) = rework {
                log.marker(
                    LogMarker::Rework,
                    &format!("Rework requested #{}", rework.count),
                )
                .await?;
                log.marker(LogMarker::Request, &format!("Request: {}", rework.text))
                    .await?;
            }
        }
    }
    log.marker(
        LogMarker::Invoke,
        &format!("Invoking agent: {}", req.program.display()),
    )
    .await?;
    match session {
        SessionArg::Resume(id) => {
            log.marker(LogMarker::Resume, &format!("Resuming session: {id}"))
                .await?
        }
        SessionArg::New(id) => {
            log.marker(LogMarker::NewSession, &format!("New session: {id}"))
                .await?
        }
    }
    Ok(())
}
