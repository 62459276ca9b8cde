//! Ticket workflow rules.
//!
//! ```text
//! backlog ──start──▶ in-progress:running ──exit──▶ review ──approve──▶ in-progress:running ──exit──▶ done
//!                      │        ▲                   │  │                (commit phase)
//!                     stop    start                 │  └──complete (check)──────────────────────────▶ done
//!                      ▼        │                   └──rework──▶ in-progress:running ──exit──▶ review
//!                  in-progress:stopped
//! ```
//!
//! Guards here are pure; the engine combines them with the registry's view
//! of whether a process is live.

use chrono::Utc;
use kanban_core::{KanbanError, KanbanResult, Ticket, TicketStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which prompt a run was launched with; decides where its exit leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// First run on the ticket's description.
    Start,
    /// Commit and push of reviewed work.
    Approve,
    /// Follow-up run with reviewer feedback.
    Rework,
}

impl Phase {
    /// The guard a launch of this phase must pass.
    pub fn launch_guard(self) -> fn(&Ticket, bool) -> KanbanResult<()> {
        match self {
            Phase::Start => ensure_can_start,
            Phase::Approve => ensure_can_approve,
            Phase::Rework => ensure_can_rework,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => write!(f, "start"),
            Phase::Approve => write!(f, "approve"),
            Phase::Rework => write!(f, "rework"),
        }
    }
}

/// Workflow position combining persisted status with run liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoardState {
    /// Not started yet.
    Backlog,
    /// In progress with a live process.
    Running,
    /// In progress with no live process: stopped explicitly, or orphaned by a restart.
    Stopped,
    /// Waiting for a reviewer.
    Review,
    /// Finished.
    Done,
}

impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardState::Backlog => write!(f, "backlog"),
            BoardState::Running => write!(f, "in-progress:running"),
            BoardState::Stopped => write!(f, "in-progress:stopped"),
            BoardState::Review => write!(f, "review"),
            BoardState::Done => write!(f, "done"),
        }
    }
}

/// Where `ticket` sits on the board, given whether it has a live run.
pub fn board_state(ticket: &Ticket, running: bool) -> BoardState {
    match ticket.status {
        TicketStatus::Backlog => BoardState::Backlog,
        TicketStatus::InProgress if running => BoardState::Running,
        TicketStatus::InProgress => BoardState::Stopped,
        TicketStatus::Review => BoardState::Review,
        TicketStatus::Done => BoardState::Done,
    }
}

/// Rework instructions and the counter value they will be recorded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReworkRequest {
    /// `rework_count` after this rework is recorded.
    pub count: u32,
    /// The reviewer's instructions, verbatim.
    pub text: String,
}

impl ReworkRequest {
    /// The next rework for `ticket`. Blank text is rejected.
    pub fn next_for(ticket: &Ticket, text: impl Into<String>) -> KanbanResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(KanbanError::Validation(
                "rework request must not be empty".into(),
            ));
        }
        Ok(Self {
            count: ticket.rework_count + 1,
            text,
        })
    }
}

fn illegal(ticket: &Ticket, state: BoardState, action: &str) -> KanbanError {
    KanbanError::InvalidTransition(format!(
        "cannot {action} ticket {} in state {state}",
        ticket.id
    ))
}

/// Start is legal from backlog, or from in-progress with no live run.
pub fn ensure_can_start(ticket: &Ticket, running: bool) -> KanbanResult<()> {
    match board_state(ticket, running) {
        BoardState::Backlog | BoardState::Stopped => Ok(()),
        BoardState::Running => Err(KanbanError::AlreadyRunning(format!(
            "ticket {} already has an active run",
            ticket.id
        ))),
        state => Err(illegal(ticket, state, "start")),
    }
}

/// Stop is legal for any in-progress ticket.
pub fn ensure_can_stop(ticket: &Ticket, running: bool) -> KanbanResult<()> {
    match board_state(ticket, running) {
        BoardState::Running | BoardState::Stopped => Ok(()),
        state => Err(illegal(ticket, state, "stop")),
    }
}

/// Approve is legal from review.
pub fn ensure_can_approve(ticket: &Ticket, running: bool) -> KanbanResult<()> {
    match board_state(ticket, running) {
        BoardState::Review => Ok(()),
        state => Err(illegal(ticket, state, "approve")),
    }
}

/// Complete is legal for check tickets in review.
pub fn ensure_can_complete(ticket: &Ticket, running: bool) -> KanbanResult<()> {
    match board_state(ticket, running) {
        BoardState::Review if ticket.is_check() => Ok(()),
        BoardState::Review => Err(KanbanError::InvalidTransition(format!(
            "ticket {} is a {} ticket; approve it to run the commit phase",
            ticket.id, ticket.ticket_type
        ))),
        state => Err(illegal(ticket, state, "complete")),
    }
}

/// Rework is legal from review.
pub fn ensure_can_rework(ticket: &Ticket, running: bool) -> KanbanResult<()> {
    match board_state(ticket, running) {
        BoardState::Review => Ok(()),
        state => Err(illegal(ticket, state, "rework")),
    }
}

/// Apply the effects of a successful launch.
///
/// A rework bumps `rework_count` from the value on `ticket`, so callers must
/// pass the copy read inside the store's write section.
pub fn enter_running(ticket: &mut Ticket, phase: Phase, rework: Option<&ReworkRequest>) {
    ticket.status = TicketStatus::InProgress;
    ticket.stopped = false;
    ticket.approving = phase == Phase::Approve;
    match phase {
        Phase::Start => ticket.started_at = Some(Utc::now()),
        Phase::Rework => {
            if let Some(request) = rework {
                ticket.rework_count += 1;
                ticket.last_rework_request = Some(request.text.clone());
            }
        }
        Phase::Approve => {}
    }
}

/// Apply a run's exit. Start and rework runs go to review; the commit phase goes to done.
pub fn finish_run(ticket: &mut Ticket, phase: Phase, exit_code: Option<i32>, output_tail: String) {
    ticket.status = match phase {
        Phase::Start | Phase::Rework => TicketStatus::Review,
        Phase::Approve => TicketStatus::Done,
    };
    ticket.stopped = false;
    ticket.approving = false;
    ticket.completed_at = Some(Utc::now());
    ticket.claude_output = Some(output_tail);
    ticket.last_exit_code = exit_code;
}

/// Flag an in-progress ticket as stopped; other statuses are left alone.
pub fn mark_stopped(ticket: &mut Ticket) {
    if ticket.status == TicketStatus::InProgress {
        ticket.stopped = true;
        ticket.approving = false;
    }
}

/// Move straight to done (check completion, or approval with nothing to commit).
pub fn mark_done(ticket: &mut Ticket) {
    ticket.status = TicketStatus::Done;
    ticket.stopped = false;
    ticket.approving = false;
    ticket.completed_at = Some(Utc::now());
}
