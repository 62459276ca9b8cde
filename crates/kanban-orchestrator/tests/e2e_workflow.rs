#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end workflow tests. The agent is faked with `sh -c <script>`, so
//! every test goes through the real spawn, stream and exit path.

use kanban_core::{KanbanError, NewProject, NewTicket, Ticket, TicketStatus, TicketType};
use kanban_orchestrator::{AgentConfig, Orchestrator, Phase};
use kanban_tracker::{IssueTracker, JiraClient, TrackerConfig, TrackerSync};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Prints every argument it receives, then keeps running.
const ECHO_AND_WAIT: &str = r#"printf '%s\n' "$@"; exec sleep 30"#;
/// Prints every argument it receives and exits.
const ECHO_AND_EXIT: &str = r#"printf '%s\n' "$@""#;

struct Harness {
    orch: Orchestrator,
    project_dir: PathBuf,
    _tmp: TempDir,
}

fn fake_agent(script: &str) -> AgentConfig {
    AgentConfig {
        program: "sh".into(),
        args: vec!["-c".into(), script.into(), "fake-agent".into()],
        flags: vec!["--print".into()],
        max_concurrent_runs: 0,
        output_tail_chars: 2000,
    }
}

async fn harness_with(agent: AgentConfig, tracker: TrackerSync) -> Harness {
    let tmp = TempDir::new().unwrap();
    let project_dir = tmp.path().join("project");
    std::fs::create_dir_all(&project_dir).unwrap();
    let orch = Orchestrator::open(&tmp.path().join("data"), agent, Arc::new(tracker))
        .await
        .unwrap();
    orch.projects()
        .create(NewProject {
            id: "demo".into(),
            name: Some("Demo".into()),
            path: project_dir.clone(),
            description: None,
        })
        .await
        .unwrap();
    Harness {
        orch,
        project_dir,
        _tmp: tmp,
    }
}

async fn harness(script: &str) -> Harness {
    harness_with(fake_agent(script), TrackerSync::default()).await
}

async fn create(h: &Harness, title: &str, ticket_type: TicketType) -> Ticket {
    h.orch
        .tickets()
        .create(NewTicket::new(title, ticket_type).with_project("demo"))
        .await
        .unwrap()
}

async fn get(h: &Harness, id: &str) -> Ticket {
    h.orch.tickets().get(id).await.unwrap().unwrap()
}

async fn wait_for_status(h: &Harness, id: &str, status: TicketStatus) -> Ticket {
    for _ in 0..400 {
        let ticket = get(h, id).await;
        if ticket.status == status && !h.orch.registry().is_running(id) {
            return ticket;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("ticket {id} never reached {status}");
}

async fn wait_for_log(h: &Harness, id: &str, needle: &str) -> String {
    for _ in 0..400 {
        let view = h.orch.log(id).await.unwrap();
        if view.log.contains(needle) {
            return view.log;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("log of {id} never contained {needle:?}");
}

/// Drive a ticket from backlog into review with a quick agent run.
async fn into_review(h: &Harness, id: &str) -> Ticket {
    h.orch.start(id, None).await.unwrap();
    wait_for_status(h, id, TicketStatus::Review).await
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_start_mints_session_and_registers_run() {
    let h = harness(ECHO_AND_WAIT).await;
    let t1 = create(&h, "Add login", TicketType::Feature).await;
    assert!(t1.session_id.is_none());

    let outcome = h.orch.start(&t1.id, None).await.unwrap();
    assert!(!outcome.resumed);
    assert!(!outcome.session_id.is_empty());

    let ticket = get(&h, &t1.id).await;
    assert_eq!(ticket.status, TicketStatus::InProgress);
    assert!(!ticket.stopped);
    assert!(ticket.started_at.is_some());
    assert_eq!(ticket.session_id.as_deref(), Some(outcome.session_id.as_str()));

    let running = h.orch.running();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].ticket_id, t1.id);
    assert_eq!(running[0].phase, Phase::Start);

    // Wait for the whole argument pair; the id may land in a later read than the flag.
    let log = wait_for_log(&h, &t1.id, &format!("--session-id\n{}\n", outcome.session_id)).await;
    assert!(log.contains("🚀 Task started: Add login"));
    assert!(log.contains(&format!("🆕 New session: {}", outcome.session_id)));

    h.orch.stop(&t1.id).await.unwrap();
}

#[tokio::test]
async fn scenario_b_stop_removes_run_and_keeps_in_progress() {
    let h = harness(ECHO_AND_WAIT).await;
    let t1 = create(&h, "Add login", TicketType::Feature).await;
    h.orch.start(&t1.id, None).await.unwrap();

    let outcome = h.orch.stop(&t1.id).await.unwrap();
    assert!(outcome.was_running);
    assert!(!h.orch.registry().is_running(&t1.id));

    // A late exit of the killed process must not advance the ticket.
    wait_for_log(&h, &t1.id, "Task stopped").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let ticket = get(&h, &t1.id).await;
    assert_eq!(ticket.status, TicketStatus::InProgress);
    assert!(ticket.stopped);
    assert!(ticket.completed_at.is_none());
}

#[tokio::test]
async fn scenario_c_restart_resumes_same_session() {
    let h = harness(ECHO_AND_WAIT).await;
    let t1 = create(&h, "Add login", TicketType::Feature).await;
    let first = h.orch.start(&t1.id, None).await.unwrap();
    h.orch.stop(&t1.id).await.unwrap();

    let second = h.orch.start(&t1.id, None).await.unwrap();
    assert!(second.resumed);
    assert_eq!(second.session_id, first.session_id);

    let ticket = get(&h, &t1.id).await;
    assert!(!ticket.stopped);
    assert_eq!(ticket.session_id.as_deref(), Some(first.session_id.as_str()));

    let log = wait_for_log(&h, &t1.id, &format!("--resume\n{}\n", first.session_id)).await;
    assert!(log.contains(&format!("🔄 Resuming session: {}", first.session_id)));

    h.orch.stop(&t1.id).await.unwrap();
}

#[tokio::test]
async fn scenario_d_exit_moves_to_review_with_output_tail() {
    let h = harness("echo 'line one'; echo 'line two'").await;
    let t1 = create(&h, "Add login", TicketType::Feature).await;
    h.orch.start(&t1.id, None).await.unwrap();

    let ticket = wait_for_status(&h, &t1.id, TicketStatus::Review).await;
    assert!(ticket.completed_at.is_some());
    assert_eq!(ticket.claude_output.as_deref(), Some("line one\nline two\n"));
    assert_eq!(ticket.last_exit_code, Some(0));

    let log = h.orch.log(&t1.id).await.unwrap();
    assert!(log.exists);
    assert!(!log.is_running);
    assert!(log.run_time.is_none());
    assert!(log.log.contains("Task completed (exit code: 0)"));
}

#[tokio::test]
async fn scenario_e_check_completes_without_spawning() {
    let h = harness(ECHO_AND_EXIT).await;
    let t2 = create(&h, "Audit dependencies", TicketType::Check).await;
    into_review(&h, &t2.id).await;
    let log_before = h.orch.log(&t2.id).await.unwrap().log;

    let ticket = h.orch.complete(&t2.id).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Done);
    assert!(ticket.completed_at.is_some());
    assert!(h.orch.running().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.orch.log(&t2.id).await.unwrap().log, log_before);
}

#[tokio::test]
async fn scenario_f_rework_increments_counter_and_embeds_request() {
    let h = harness(ECHO_AND_EXIT).await;
    let t3 = create(&h, "Add login", TicketType::Feature).await;
    into_review(&h, &t3.id).await;

    let outcome = h.orch.rework(&t3.id, "fix X").await.unwrap();
    assert_eq!(outcome.phase, Phase::Rework);
    assert_eq!(outcome.ticket.rework_count, 1);
    assert_eq!(outcome.ticket.status, TicketStatus::InProgress);
    assert_eq!(outcome.ticket.last_rework_request.as_deref(), Some("fix X"));
    assert!(outcome.resumed);

    let ticket = wait_for_status(&h, &t3.id, TicketStatus::Review).await;
    let output = ticket.claude_output.unwrap();
    assert!(output.contains("## Rework request (#1)"));
    assert!(output.contains("fix X"));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_is_never_regenerated_across_phases() {
    let h = harness(ECHO_AND_EXIT).await;
    let t = create(&h, "Add login", TicketType::Feature).await;
    let session = into_review(&h, &t.id).await.session_id.unwrap();

    for round in 1..=2u32 {
        let outcome = h.orch.rework(&t.id, format!("round {round}").as_str()).await.unwrap();
        assert_eq!(outcome.session_id, session);
        let ticket = wait_for_status(&h, &t.id, TicketStatus::Review).await;
        assert_eq!(ticket.rework_count, round);
        assert_eq!(ticket.session_id.as_deref(), Some(session.as_str()));
    }

    let approved = h.orch.approve(&t.id).await.unwrap();
    assert!(!approved.skipped_commit);
    let done = wait_for_status(&h, &t.id, TicketStatus::Done).await;
    assert_eq!(done.session_id.as_deref(), Some(session.as_str()));
}

#[tokio::test]
async fn approve_runs_commit_phase_before_done() {
    let h = harness(r#"printf '%s\n' "$@"; sleep 0.3"#).await;
    let t = create(&h, "Add login", TicketType::Feature).await;
    into_review(&h, &t.id).await;

    let outcome = h.orch.approve(&t.id).await.unwrap();
    assert!(!outcome.skipped_commit);
    assert_eq!(outcome.ticket.status, TicketStatus::InProgress);
    assert!(outcome.ticket.approving);
    let running = h.orch.running();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].phase, Phase::Approve);

    let done = wait_for_status(&h, &t.id, TicketStatus::Done).await;
    assert!(!done.approving);
    assert!(done.claude_output.unwrap().contains("commit and push"));
}

#[tokio::test]
async fn approve_skips_commit_on_clean_git_tree() {
    let h = harness(ECHO_AND_EXIT).await;
    let t = create(&h, "Add login", TicketType::Feature).await;
    into_review(&h, &t.id).await;
    git2::Repository::init(&h.project_dir).unwrap();

    let outcome = h.orch.approve(&t.id).await.unwrap();
    assert!(outcome.skipped_commit);
    assert_eq!(outcome.ticket.status, TicketStatus::Done);
    assert!(h.orch.running().is_empty());
}

#[tokio::test]
async fn approve_on_check_ticket_completes() {
    let h = harness(ECHO_AND_EXIT).await;
    let t = create(&h, "Audit", TicketType::Check).await;
    into_review(&h, &t.id).await;
    let outcome = h.orch.approve(&t.id).await.unwrap();
    assert_eq!(outcome.ticket.status, TicketStatus::Done);
    assert!(h.orch.running().is_empty());
}

#[tokio::test]
async fn concurrent_starts_spawn_one_process() {
    let h = harness(ECHO_AND_WAIT).await;
    let t = create(&h, "Add login", TicketType::Feature).await;

    let (a, b) = tokio::join!(h.orch.start(&t.id, None), h.orch.start(&t.id, None));
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(KanbanError::AlreadyRunning(_)))));
    assert_eq!(h.orch.running().len(), 1);

    h.orch.stop(&t.id).await.unwrap();
}

#[tokio::test]
async fn capacity_limit_rejects_extra_runs() {
    let mut agent = fake_agent(ECHO_AND_WAIT);
    agent.max_concurrent_runs = 1;
    let h = harness_with(agent, TrackerSync::default()).await;
    let a = create(&h, "A", TicketType::Feature).await;
    let b = create(&h, "B", TicketType::Feature).await;

    h.orch.start(&a.id, None).await.unwrap();
    let err = h.orch.start(&b.id, None).await.unwrap_err();
    assert!(matches!(err, KanbanError::Capacity(_)));
    assert_eq!(get(&h, &b.id).await.status, TicketStatus::Backlog);

    h.orch.stop(&a.id).await.unwrap();
}

#[tokio::test]
async fn missing_executable_is_config_error_without_state_change() {
    let mut agent = fake_agent(ECHO_AND_EXIT);
    agent.program = "/no/such/agent".into();
    let h = harness_with(agent, TrackerSync::default()).await;
    let t = create(&h, "A", TicketType::Feature).await;

    let err = h.orch.start(&t.id, None).await.unwrap_err();
    assert!(matches!(err, KanbanError::Config(_)));
    let ticket = get(&h, &t.id).await;
    assert_eq!(ticket.status, TicketStatus::Backlog);
    assert!(ticket.session_id.is_none());
    assert!(!h.orch.log(&t.id).await.unwrap().exists);
}

#[cfg(unix)]
#[tokio::test]
async fn spawn_failure_is_logged_and_leaves_status() {
    let h = harness(ECHO_AND_EXIT).await;
    let not_executable = h.project_dir.join("agent.txt");
    std::fs::write(&not_executable, "not a program").unwrap();
    let mut agent = fake_agent(ECHO_AND_EXIT);
    agent.program = not_executable.display().to_string();
    agent.args.clear();
    h.orch.set_agent_config(agent);

    let t = create(&h, "A", TicketType::Feature).await;
    let err = h.orch.start(&t.id, None).await.unwrap_err();
    assert!(matches!(err, KanbanError::Spawn(_)));

    let ticket = get(&h, &t.id).await;
    assert_eq!(ticket.status, TicketStatus::Backlog);
    assert!(h.orch.running().is_empty());
    assert!(h.orch.log(&t.id).await.unwrap().log.contains("[ERROR] Spawn failed"));
}

#[tokio::test]
async fn invalid_triggers_are_rejected() {
    let h = harness(ECHO_AND_EXIT).await;
    let t = create(&h, "A", TicketType::Feature).await;

    assert!(matches!(
        h.orch.approve(&t.id).await,
        Err(KanbanError::InvalidTransition(_))
    ));
    assert!(matches!(
        h.orch.rework(&t.id, "x").await,
        Err(KanbanError::InvalidTransition(_))
    ));
    assert!(matches!(
        h.orch.stop(&t.id).await,
        Err(KanbanError::InvalidTransition(_))
    ));
    assert!(matches!(
        h.orch.start("999", None).await,
        Err(KanbanError::NotFound(_))
    ));

    into_review(&h, &t.id).await;
    assert!(matches!(
        h.orch.start(&t.id, None).await,
        Err(KanbanError::InvalidTransition(_))
    ));
    assert!(matches!(
        h.orch.complete(&t.id).await,
        Err(KanbanError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn delete_refused_while_running_and_removes_log() {
    let h = harness(ECHO_AND_WAIT).await;
    let t = create(&h, "A", TicketType::Feature).await;
    h.orch.start(&t.id, None).await.unwrap();

    assert!(matches!(
        h.orch.delete_ticket(&t.id).await,
        Err(KanbanError::AlreadyRunning(_))
    ));
    h.orch.stop(&t.id).await.unwrap();
    wait_for_log(&h, &t.id, "Task stopped").await;

    h.orch.delete_ticket(&t.id).await.unwrap();
    assert!(!h.orch.log(&t.id).await.unwrap().exists);
    assert!(matches!(
        h.orch.delete_ticket(&t.id).await,
        Err(KanbanError::NotFound(_))
    ));
}

#[tokio::test]
async fn reset_stops_everything() {
    let h = harness(ECHO_AND_WAIT).await;
    let a = create(&h, "A", TicketType::Feature).await;
    h.orch.start(&a.id, None).await.unwrap();

    let outcome = h.orch.reset().await.unwrap();
    assert_eq!(outcome.stopped_runs, 1);
    assert!(h.orch.running().is_empty());
    assert!(h.orch.tickets().list().await.unwrap().is_empty());

    let fresh = create(&h, "B", TicketType::Bug).await;
    assert_eq!(fresh.id, "001");
}

#[tokio::test]
async fn start_from_backlog_moves_jira_issue_to_in_progress() {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/PROJ-1/transitions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "transitions": [{"id": "21", "name": "Start Progress", "to": {"name": "In Progress"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/api/3/issue/PROJ-1/transitions"))
        .and(body_json(serde_json::json!({"transition": {"id": "21"}})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client: Arc<dyn IssueTracker> = Arc::new(JiraClient::new(&TrackerConfig {
        host: server.uri(),
        email: "dev@example.com".into(),
        api_token: "secret".into(),
    }));
    let h = harness_with(fake_agent(ECHO_AND_WAIT), TrackerSync::new(Some(client))).await;

    let mut input = NewTicket::new("[PROJ-1] Add login", TicketType::Feature).with_project("demo");
    input.jira_key = Some("PROJ-1".into());
    let t = h.orch.tickets().create(input).await.unwrap();
    h.orch.start(&t.id, None).await.unwrap();

    let log = wait_for_log(&h, &t.id, "/browse/PROJ-1").await;
    assert!(log.contains("- Key: PROJ-1"));

    for _ in 0..200 {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    h.orch.stop(&t.id).await.unwrap();
}
