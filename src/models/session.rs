use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Programming language of a session. Closed set; anything else is rejected
/// at deserialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Javascript,
    Python,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Python => "python",
        }
    }

    /// Parse a stored language value. Used by the Postgres backend when
    /// mapping rows; the column only ever holds values written by `as_str`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "javascript" => Some(Language::Javascript),
            "python" => Some(Language::Python),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collaborative coding session.
///
/// `id` and `created_at` are fixed at creation; `participants` is only ever
/// changed through the store's atomic increment/decrement operations.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub code: String,
    pub language: Language,
    pub created_at: DateTime<Utc>,
    pub participants: i32,
}

/// Request body for creating a session
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub language: Language,
}

/// Request body for updating session code
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCodeRequest {
    pub code: String,
    /// When absent the session keeps its current language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_round_trips_through_json() {
        let json = serde_json::to_string(&Language::Python).unwrap();
        assert_eq!(json, "\"python\"");
        let back: Language = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Language::Python);
    }

    #[test]
    fn unknown_language_is_rejected() {
        let result: Result<Language, _> = serde_json::from_str("\"cobol\"");
        assert!(result.is_err());
    }

    #[test]
    fn session_serializes_with_camel_case_fields() {
        let session = Session {
            id: Uuid::new_v4(),
            code: String::new(),
            language: Language::Javascript,
            created_at: Utc::now(),
            participants: 0,
        };
        let value = serde_json::to_value(&session).unwrap();
        assert!(value.get("createdAt").is_some());
        assert_eq!(value["language"], "javascript");
    }

    #[test]
    fn update_request_without_language_deserializes_to_none() {
        let request: UpdateCodeRequest =
            serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(request.code, "print(1)");
        assert!(request.language.is_none());
    }
}
