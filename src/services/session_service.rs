use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Language, Session, UpdateCodeRequest};
use crate::store::{SessionStore, StoreError};

/// Business logic for session operations, on top of a pluggable store.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn create_session(
        &self,
        language: Option<Language>,
    ) -> Result<Session, StoreError> {
        self.store.create(language.unwrap_or_default()).await
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        self.store.get(id).await
    }

    /// Replace the session's code; replace the language only when the request
    /// carries one. A request without a language must not reset it.
    pub async fn update_code(
        &self,
        id: Uuid,
        request: UpdateCodeRequest,
    ) -> Result<Option<Session>, StoreError> {
        let Some(session) = self.store.get(id).await? else {
            return Ok(None);
        };

        let updated = Session {
            code: request.code,
            language: request.language.unwrap_or(session.language),
            ..session
        };
        self.store.update(updated).await
    }

    pub async fn add_participant(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        self.store.increment_participants(id).await
    }

    pub async fn remove_participant(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        self.store.decrement_participants(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;

    fn service() -> SessionService {
        SessionService::new(Arc::new(MemorySessionStore::new()))
    }

    #[tokio::test]
    async fn create_defaults_to_javascript() {
        let service = service();
        let session = service.create_session(None).await.unwrap();
        assert_eq!(session.language, Language::Javascript);

        let session = service
            .create_session(Some(Language::Python))
            .await
            .unwrap();
        assert_eq!(session.language, Language::Python);
    }

    #[tokio::test]
    async fn update_code_preserves_language_when_not_supplied() {
        let service = service();
        let session = service
            .create_session(Some(Language::Python))
            .await
            .unwrap();

        let updated = service
            .update_code(
                session.id,
                UpdateCodeRequest {
                    code: "print(1)".into(),
                    language: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.code, "print(1)");
        assert_eq!(updated.language, Language::Python);
    }

    #[tokio::test]
    async fn update_code_replaces_language_when_supplied() {
        let service = service();
        let session = service.create_session(None).await.unwrap();

        let updated = service
            .update_code(
                session.id,
                UpdateCodeRequest {
                    code: "print(1)".into(),
                    language: Some(Language::Python),
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.language, Language::Python);

        // The stored record reflects both fields.
        let fetched = service.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(fetched.code, "print(1)");
        assert_eq!(fetched.language, Language::Python);
        assert_eq!(fetched.created_at, session.created_at);
    }

    #[tokio::test]
    async fn update_code_for_unknown_session_is_none() {
        let service = service();
        let result = service
            .update_code(
                Uuid::new_v4(),
                UpdateCodeRequest {
                    code: "x".into(),
                    language: None,
                },
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
