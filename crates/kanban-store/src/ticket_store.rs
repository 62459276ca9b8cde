use async_trait::async_trait;
use kanban_core::{KanbanError, KanbanResult, NewTicket, Ticket};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// The whole persisted ticket document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketBoard {
    /// In creation order.
    pub tickets: Vec<Ticket>,
    /// Counter behind the next minted id.
    pub next_id: u64,
}

impl Default for TicketBoard {
    fn default() -> Self {
        Self {
            tickets: Vec::new(),
            next_id: 1,
        }
    }
}

impl TicketBoard {
    /// Mint the next identifier (`"001"`, `"002"`, ...) and advance the counter.
    fn mint_id(&mut self) -> String {
        let id = format!("{:03}", self.next_id);
        self.next_id += 1;
        id
    }
}

/// A mutation applied to one ticket inside the store's write critical section.
pub type TicketMutation = Box<dyn FnOnce(&mut Ticket) -> KanbanResult<()> + Send>;

/// Persistence for tickets. Reads may be stale by the time they are used;
/// decisions that must hold at write time belong in an [`update`](Self::update) closure.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Every ticket, in creation order.
    async fn list(&self) -> KanbanResult<Vec<Ticket>>;
    /// Snapshot of one ticket.
    async fn get(&self, id: &str) -> KanbanResult<Option<Ticket>>;
    /// Validate `input` and store it under a freshly minted id.
    async fn create(&self, input: NewTicket) -> KanbanResult<Ticket>;
    /// Read-modify-write one ticket. The mutation runs while the writer lock
    /// is held; an `Err` from it leaves the document untouched.
    async fn update(&self, id: &str, mutation: TicketMutation) -> KanbanResult<Ticket>;
    /// `false` when no ticket had that id.
    async fn delete(&self, id: &str) -> KanbanResult<bool>;
    /// Create tickets in one write, skipping inputs whose `jira_key` is already on the board.
    async fn import(&self, inputs: Vec<NewTicket>) -> KanbanResult<Vec<Ticket>>;
    /// Replace the document with an empty board.
    async fn reset(&self) -> KanbanResult<()>;
}

/// JSON file store. Every mutation rewrites the whole document.
///
/// Writers are serialized through an async mutex so concurrent requests in
/// this process cannot lose each other's updates.
pub struct FileTicketStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTicketStore {
    /// Open `<dir>/tickets.json`, writing an empty board if it does not exist.
    pub async fn new(dir: PathBuf) -> KanbanResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        let store = Self {
            path: dir.join("tickets.json"),
            write_lock: Mutex::new(()),
        };
        if !store.path.exists() {
            store.save(&TicketBoard::default()).await?;
        }
        Ok(store)
    }

    /// Location of `tickets.json`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> KanbanResult<TicketBoard> {
        if !self.path.exists() {
            return Ok(TicketBoard::default());
        }
        let data = tokio::fs::read_to_string(&self.path).await?;
        serde_json::from_str(&data).map_err(|e| {
            KanbanError::Store(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn save(&self, board: &TicketBoard) -> KanbanResult<()> {
        let json = serde_json::to_string_pretty(board)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TicketStore for FileTicketStore {
    async fn list(&self) -> KanbanResult<Vec<Ticket>> {
        Ok(self.load().await?.tickets)
    }

    async fn get(&self, id: &str) -> KanbanResult<Option<Ticket>> {
        Ok(self.load().await?.tickets.into_iter().find(|t| t.id == id))
    }

    async fn create(&self, input: NewTicket) -> KanbanResult<Ticket> {
        input.validate()?;
        let _guard = self.write_lock.lock().await;
        let mut board = self.load().await?;
        let ticket = Ticket::new(board.mint_id(), input);
        board.tickets.push(ticket.clone());
        self.save(&board).await?;
        debug!(ticket_id = %ticket.id, "Ticket created");
        Ok(ticket)
    }

    async fn update(&self, id: &str, mutation: TicketMutation) -> KanbanResult<Ticket> {
        let _guard = self.write_lock.lock().await;
        let mut board = self.load().await?;
        let ticket = board
            .tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| KanbanError::NotFound(format!("ticket {id}")))?;
        mutation(ticket)?;
        ticket.touch();
        let updated = ticket.clone();
        self.save(&board).await?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> KanbanResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut board = self.load().await?;
        let before = board.tickets.len();
        board.tickets.retain(|t| t.id != id);
        if board.tickets.len() == before {
            return Ok(false);
        }
        self.save(&board).await?;
        Ok(true)
    }

    async fn import(&self, inputs: Vec<NewTicket>) -> KanbanResult<Vec<Ticket>> {
        let _guard = self.write_lock.lock().await;
        let mut board = self.load().await?;
        let mut imported = Vec::new();
        for input in inputs {
            let duplicate = input.jira_key.as_ref().is_some_and(|key| {
                board
                    .tickets
                    .iter()
                    .any(|t| t.jira_key.as_ref() == Some(key))
            });
            if duplicate || input.validate().is_err() {
                continue;
            }
            let ticket = Ticket::new(board.mint_id(), input);
            board.tickets.push(ticket.clone());
            imported.push(ticket);
        }
        if !imported.is_empty() {
            self.save(&board).await?;
        }
        Ok(imported)
    }

    async fn reset(&self) -> KanbanResult<()> {
        let _guard = self.write_lock.lock().await;
        self.save(&TicketBoard::default()).await
    }
}
