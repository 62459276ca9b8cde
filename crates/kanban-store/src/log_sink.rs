use chrono::{SecondsFormat, Utc};
use kanban_core::{KanbanError, KanbanResult};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

// ---------------------------------------------------------------------------
// LogMarker
// ---------------------------------------------------------------------------

/// Category of a lifecycle line. Rendered as an emoji tag after the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMarker {
    /// Start-phase launch.
    Start,
    /// Working directory of the run.
    Project,
    /// Agent executable about to be spawned.
    Invoke,
    /// Continuing an existing agent session.
    Resume,
    /// First run of a freshly minted session.
    NewSession,
    /// Approval, with or without a commit phase.
    Approve,
    /// Rework launch and its counter.
    Rework,
    /// The reviewer's rework text.
    Request,
    /// Process exit.
    Complete,
    /// Run terminated by a stop.
    Stopped,
    /// Spawn or stream failure.
    Error,
}

impl LogMarker {
    /// Emoji rendered after the timestamp.
    pub fn tag(&self) -> &'static str {
        match self {
            LogMarker::Start => "🚀",
            LogMarker::Project => "📂",
            LogMarker::Invoke => "🤖",
            LogMarker::Resume => "🔄",
            LogMarker::NewSession => "🆕",
            LogMarker::Approve => "✅",
            LogMarker::Rework => "🔁",
            LogMarker::Request => "📝",
            LogMarker::Complete => "✅",
            LogMarker::Stopped => "⏹️",
            LogMarker::Error => "❌",
        }
    }
}

/// Format one lifecycle line: `[<ISO-8601>] <tag> <text>\n`.
pub fn format_marker(marker: LogMarker, text: &str) -> String {
    format!(
        "[{}] {} {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        marker.tag(),
        text
    )
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Directory of append-only per-ticket logs (`ticket-<id>.log`).
#[derive(Debug, Clone)]
pub struct LogSink {
    dir: PathBuf,
}

impl LogSink {
    /// Use `dir` for logs, creating it if needed.
    pub async fn new(dir: PathBuf) -> KanbanResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// `<dir>/ticket-<id>.log`. Ids outside `[A-Za-z0-9_-]` are rejected so
    /// they cannot escape the directory.
    pub fn path_for(&self, ticket_id: &str) -> KanbanResult<PathBuf> {
        let valid = !ticket_id.is_empty()
            && ticket_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(KanbanError::Validation(format!(
                "invalid ticket id: {ticket_id:?}"
            )));
        }
        Ok(self.dir.join(format!("ticket-{ticket_id}.log")))
    }

    /// Open the ticket's log for appending, creating it if needed.
    pub async fn open(&self, ticket_id: &str) -> KanbanResult<LogWriter> {
        let path = self.path_for(ticket_id)?;
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(LogWriter {
            path,
            file: Some(file),
        })
    }

    /// Full log text, or `None` when the ticket has never been run.
    pub async fn read(&self, ticket_id: &str) -> KanbanResult<Option<String>> {
        let path = self.path_for(ticket_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Remove the ticket's log; a missing log is not an error.
    pub async fn delete(&self, ticket_id: &str) -> KanbanResult<()> {
        let path = self.path_for(ticket_id)?;
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    /// Delete every log file. Returns how many were removed.
    pub async fn clear(&self) -> KanbanResult<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_log = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("ticket-") && name.ends_with(".log"));
            if is_log {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// LogWriter
// ---------------------------------------------------------------------------

/// Append handle for one run. Writes after [`LogWriter::close`] are dropped.
#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl LogWriter {
    /// Location of the log file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// True after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Append a timestamped lifecycle line.
    pub async fn marker(&mut self, marker: LogMarker, text: &str) -> KanbanResult<()> {
        self.write(&format_marker(marker, text)).await
    }

    /// Append process output verbatim.
    pub async fn raw(&mut self, text: &str) -> KanbanResult<()> {
        self.write(text).await
    }

    /// Append an error-stream chunk tagged with `[ERROR]`.
    pub async fn error(&mut self, text: &str) -> KanbanResult<()> {
        self.write(&format!("[ERROR] {text}")).await
    }

    /// Flush and close. Returns `true` only for the call that actually closed.
    pub async fn close(&mut self) -> KanbanResult<bool> {
        match self.file.take() {
            Some(mut file) => {
                file.flush().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn write(&mut self, text: &str) -> KanbanResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(text.as_bytes()).await?;
        }
        Ok(())
    }
}
