//! In-memory registry of live sessions.
//!
//! Each session is shared as `Arc<RwLock<StorySession>>`: background media
//! tasks hold their own clone and mutate scene state through the write
//! lock, so removal from the store never invalidates a running task.

use std::sync::Arc;

use dashmap::DashMap;
use fableforge_domain::{SessionId, StorySession};
use tokio::sync::RwLock;

pub type SharedSession = Arc<RwLock<StorySession>>;

pub trait SessionStore: Send + Sync {
    fn insert(&self, session: StorySession) -> (SessionId, SharedSession);
    fn get(&self, id: SessionId) -> Option<SharedSession>;
    fn remove(&self, id: SessionId) -> Option<SharedSession>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, SharedSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: StorySession) -> (SessionId, SharedSession) {
        let id = SessionId::new();
        let shared: SharedSession = Arc::new(RwLock::new(session));
        self.sessions.insert(id, shared.clone());
        (id, shared)
    }

    fn get(&self, id: SessionId) -> Option<SharedSession> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    fn remove(&self, id: SessionId) -> Option<SharedSession> {
        self.sessions.remove(&id).map(|(_, shared)| shared)
    }
}
