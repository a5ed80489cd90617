pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Language, Session};

pub use memory::MemorySessionStore;
pub use postgres::PostgresSessionStore;

/// Infrastructure failure talking to the storage backend.
///
/// Deliberately distinct from "not found": an absent session is a normal
/// outcome (`Ok(None)`), never an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

/// Storage contract for session records.
///
/// Conforming backends must keep `participants` non-negative, make the
/// counter operations atomic with respect to each other and to `update`
/// on the same id, and never resurrect a record on `update` of an unknown id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new session with a fresh id, empty code and zero participants.
    async fn create(&self, language: Language) -> Result<Session, StoreError>;

    /// Look up a session by id.
    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Replace the stored record with the same id (last-write-wins at whole
    /// record granularity). Returns `None` when the id no longer exists.
    async fn update(&self, session: Session) -> Result<Option<Session>, StoreError>;

    /// Atomically increment the participant counter.
    async fn increment_participants(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Atomically decrement the participant counter, clamping at zero.
    async fn decrement_participants(&self, id: Uuid) -> Result<Option<Session>, StoreError>;
}
