use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Error as SqlxError, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{Language, Session};
use crate::store::{SessionStore, StoreError};

/// Postgres-backed session store.
///
/// Counter mutations are single UPDATE statements so they are atomic at the
/// database level; `GREATEST` keeps the counter from going negative when a
/// disconnect races a session that was already drained.
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    /// Connect to the database and make sure the sessions table exists.
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id UUID PRIMARY KEY,
                code TEXT NOT NULL DEFAULT '',
                language TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                participants INTEGER NOT NULL DEFAULT 0 CHECK (participants >= 0)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

fn row_to_session(row: &PgRow) -> Result<Session, SqlxError> {
    let language: String = row.try_get("language")?;
    let language = Language::parse(&language).ok_or_else(|| {
        SqlxError::Decode(format!("unknown language value '{}'", language).into())
    })?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Session {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        language,
        created_at,
        participants: row.try_get("participants")?,
    })
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn create(&self, language: Language) -> Result<Session, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sessions (id, code, language, created_at, participants)
            VALUES ($1, '', $2, NOW(), 0)
            RETURNING id, code, language, created_at, participants
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(language.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        row_to_session(&row).map_err(StoreError::Unavailable)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            "SELECT id, code, language, created_at, participants FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        row.as_ref()
            .map(row_to_session)
            .transpose()
            .map_err(StoreError::Unavailable)
    }

    async fn update(&self, session: Session) -> Result<Option<Session>, StoreError> {
        // id and created_at are immutable; only code and language are written.
        let row = sqlx::query(
            r#"
            UPDATE sessions
            SET code = $2, language = $3
            WHERE id = $1
            RETURNING id, code, language, created_at, participants
            "#,
        )
        .bind(session.id)
        .bind(&session.code)
        .bind(session.language.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        row.as_ref()
            .map(row_to_session)
            .transpose()
            .map_err(StoreError::Unavailable)
    }

    async fn increment_participants(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE sessions
            SET participants = participants + 1
            WHERE id = $1
            RETURNING id, code, language, created_at, participants
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        row.as_ref()
            .map(row_to_session)
            .transpose()
            .map_err(StoreError::Unavailable)
    }

    async fn decrement_participants(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE sessions
            SET participants = GREATEST(participants - 1, 0)
            WHERE id = $1
            RETURNING id, code, language, created_at, participants
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;

        row.as_ref()
            .map(row_to_session)
            .transpose()
            .map_err(StoreError::Unavailable)
    }
}
