use crate::config::AgentConfig;
use crate::workflow::Phase;
use kanban_core::{KanbanError, KanbanResult};
use kanban_store::{LogMarker, LogWriter};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Session-continuation argument for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionArg {
    /// Continue an existing agent session.
    Resume(String),
    /// First launch: the agent adopts this freshly minted id.
    New(String),
}

impl SessionArg {
    /// The session id, whichever way it is passed.
    pub fn id(&self) -> &str {
        match self {
            SessionArg::Resume(id) | SessionArg::New(id) => id,
        }
    }

    /// True when continuing an existing session.
    pub fn is_resume(&self) -> bool {
        matches!(self, SessionArg::Resume(_))
    }

    fn flag(&self) -> &'static str {
        match self {
            SessionArg::Resume(_) => "--resume",
            SessionArg::New(_) => "--session-id",
        }
    }
}

/// A fully built agent command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Resolved executable.
    pub program: PathBuf,
    /// Every argument after the program, prompt included.
    pub args: Vec<String>,
    /// Current directory of the child.
    pub workdir: PathBuf,
    /// Extra environment on top of the parent's.
    pub env: Vec<(String, String)>,
}

/// `program args… (--resume S | --session-id S) flags… -p <prompt>`, run in `workdir`
/// with colour output disabled.
pub fn build_invocation(
    config: &AgentConfig,
    program: PathBuf,
    session: &SessionArg,
    prompt: &str,
    workdir: PathBuf,
) -> Invocation {
    let mut args = config.args.clone();
    args.push(session.flag().to_string());
    args.push(session.id().to_string());
    args.extend(config.flags.iter().cloned());
    args.push("-p".to_string());
    args.push(prompt.to_string());
    Invocation {
        program,
        args,
        workdir,
        env: vec![("FORCE_COLOR".to_string(), "0".to_string())],
    }
}

/// Start the process with piped output. Returns immediately.
pub fn spawn(invocation: &Invocation) -> KanbanResult<Child> {
    let mut cmd = Command::new(&invocation.program);
    cmd.args(&invocation.args)
        .current_dir(&invocation.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &invocation.env {
        cmd.env(key, value);
    }
    cmd.spawn().map_err(|e| {
        KanbanError::Spawn(format!(
            "failed to start {}: {e}",
            invocation.program.display()
        ))
    })
}

// ---------------------------------------------------------------------------
// Output capture
// ---------------------------------------------------------------------------

/// Bounded trailing excerpt of a run's output, counted in characters.
#[derive(Debug, Clone, Default)]
pub struct OutputTail {
    buf: String,
    cap: usize,
}

impl OutputTail {
    /// Keep at most `cap` characters.
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
        }
    }

    /// Append `text`, dropping the oldest characters past the cap.
    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        let len = self.buf.chars().count();
        if len > self.cap {
            let cut = self
                .buf
                .char_indices()
                .nth(len - self.cap)
                .map_or(self.buf.len(), |(idx, _)| idx);
            self.buf.drain(..cut);
        }
    }

    /// The retained text.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Consume into the retained text.
    pub fn into_string(self) -> String {
        self.buf
    }
}

enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// Forward one pipe to the supervisor, one line per message.
fn pump<R>(reader: R, tx: mpsc::Sender<OutputChunk>, wrap: fn(String) -> OutputChunk) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(wrap(text)).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Supervision
// ---------------------------------------------------------------------------

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunExit {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Last characters of combined stdout and stderr.
    pub output_tail: String,
    /// Terminated by a stop request rather than exiting by itself.
    pub stopped: bool,
}

/// Identity of the run being supervised.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Ticket the run belongs to.
    pub ticket_id: String,
    /// Decides the completion marker text.
    pub phase: Phase,
    /// Cap for [`RunExit::output_tail`].
    pub tail_chars: usize,
}

fn completion_text(phase: Phase, exit_code: Option<i32>) -> String {
    let code = exit_code.map_or_else(|| "none".to_string(), |c| c.to_string());
    match phase {
        Phase::Start => format!("Task completed (exit code: {code})"),
        Phase::Approve => format!("Commit/push completed (exit code: {code})"),
        Phase::Rework => format!("Rework completed (exit code: {code})"),
    }
}

/// Stream the child's output into `log` until both pipes close, then reap it
/// and write the completion marker. A stop signal kills the child without
/// waiting for its pipes. The log is closed exactly once, here.
pub async fn supervise(
    mut child: Child,
    mut log: LogWriter,
    mut stop_rx: oneshot::Receiver<()>,
    ctx: &RunContext,
) -> RunExit {
    let (tx, mut rx) = mpsc::channel::<OutputChunk>(256);
    let mut pumps = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, tx.clone(), OutputChunk::Stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, tx.clone(), OutputChunk::Stderr));
    }
    drop(tx);

    let mut tail = OutputTail::new(ctx.tail_chars);
    let mut stop_armed = true;
    let mut stopped = false;

    loop {
        tokio::select! {
            chunk = rx.recv() => match chunk {
                Some(OutputChunk::Stdout(text)) => {
                    debug!(ticket_id = %ctx.ticket_id, stream = "stdout", line = %text.trim_end(), "Agent output");
                    tail.push(&text);
                    if let Err(e) = log.raw(&text).await {
                        warn!(ticket_id = %ctx.ticket_id, error = %e, "Log write failed");
                    }
                }
                Some(OutputChunk::Stderr(text)) => {
                    debug!(ticket_id = %ctx.ticket_id, stream = "stderr", line = %text.trim_end(), "Agent output");
                    tail.push(&text);
                    if let Err(e) = log.error(&text).await {
                        warn!(ticket_id = %ctx.ticket_id, error = %e, "Log write failed");
                    }
                }
                None => break,
            },
            signal = &mut stop_rx, if stop_armed => {
                stop_armed = false;
                if signal.is_ok() {
                    stopped = true;
                    break;
                }
            }
        }
    }

    if stopped {
        if let Err(e) = child.start_kill() {
            warn!(ticket_id = %ctx.ticket_id, error = %e, "Failed to kill agent process");
        }
        for handle in &pumps {
            handle.abort();
        }
    }

    let exit_code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(ticket_id = %ctx.ticket_id, error = %e, "Failed to reap agent process");
            None
        }
    };

    let marker = if stopped {
        log.marker(LogMarker::Stopped, "Task stopped").await
    } else {
        log.marker(LogMarker::Complete, &completion_text(ctx.phase, exit_code))
            .await
    };
    if let Err(e) = marker {
        warn!(ticket_id = %ctx.ticket_id, error = %e, "Log write failed");
    }
    if let Err(e) = log.close().await {
        warn!(ticket_id = %ctx.ticket_id, error = %e, "Log close failed");
    }

    RunExit {
        exit_code,
        output_tail: tail.into_string(),
        stopped,
    }
}
