use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Language, Session};
use crate::store::{SessionStore, StoreError};

/// In-memory session store backed by a shared map.
///
/// Every mutation takes the write lock, so read-modify-write sequences on the
/// counter are atomic and concurrent increments never lose an update. State
/// lives for the process lifetime only.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, language: Language) -> Result<Session, StoreError> {
        let session = Session {
            id: Uuid::new_v4(),
            code: String::new(),
            language,
            created_at: Utc::now(),
            participants: 0,
        };
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn update(&self, session: Session) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(stored) => {
                // Only code and language are written; the participant counter
                // moves exclusively through the counter operations, and the
                // caller's copy of it may be stale.
                stored.code = session.code;
                stored.language = session.language;
                Ok(Some(stored.clone()))
            }
            // An unknown id is not re-created.
            None => Ok(None),
        }
    }

    async fn increment_participants(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(&id).map(|session| {
            session.participants += 1;
            session.clone()
        }))
    }

    async fn decrement_participants(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(&id).map(|session| {
            session.participants = (session.participants - 1).max(0);
            session.clone()
        }))
    }
}
