use crate::dtos::ServerEvent;
use crate::fanout::GroupName;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument};
use uuid::Uuid;

/// Signals from a session's reader side to its writer task
pub enum InternalSignal {
    /// Event addressed to this session only
    Frame(ServerEvent),
    Error(String),
    Subscribe(GroupName, Receiver<Arc<ServerEvent>>),
    Unsubscribe(GroupName),
    /// Send a close frame with the code and stop
    Close(u16, &'static str),
    Shutdown,
}

struct SessionHandle {
    user_id: i32,
    tx: UnboundedSender<InternalSignal>,
}

/// Live sessions of this process. A user may hold several sessions at once.
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
        }
    }

    #[instrument(skip(self, tx))]
    pub fn register(&self, user_id: i32, tx: UnboundedSender<InternalSignal>) -> Uuid {
        let session_id = Uuid::new_v4();
        self.sessions.insert(session_id, SessionHandle { user_id, tx });
        info!(%session_id, total = self.sessions.len(), "Session registered");
        session_id
    }

    #[instrument(skip(self))]
    pub fn remove(&self, session_id: &Uuid) {
        if self.sessions.remove(session_id).is_some() {
            info!(total = self.sessions.len(), "Session removed");
        }
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions_of(&self, user_id: i32) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .count()
    }

    /// Ask every session to stop; each one still runs its own cleanup
    #[instrument(skip(self))]
    pub fn shutdown_all(&self) {
        info!(total = self.sessions.len(), "Shutting down every session");
        for entry in self.sessions.iter() {
            let _ = entry.value().tx.send(InternalSignal::Close(1001, "Server shutting down"));
        }
    }
}
