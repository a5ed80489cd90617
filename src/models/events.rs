use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Language;

/// Result of running a session's code through the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution duration in milliseconds
    pub execution_time: u64,
}

/// An update event fanned out to every subscriber of a session.
///
/// One variant per event kind; each carries only the fields meaningful for
/// that kind. Events are immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionUpdate {
    CodeUpdate {
        session_id: Uuid,
        code: String,
        language: Language,
        timestamp: DateTime<Utc>,
    },
    ParticipantJoined {
        session_id: Uuid,
        participants: i32,
        timestamp: DateTime<Utc>,
    },
    ParticipantLeft {
        session_id: Uuid,
        participants: i32,
        timestamp: DateTime<Utc>,
    },
    ExecutionResult {
        session_id: Uuid,
        execution_result: ExecutionResult,
        timestamp: DateTime<Utc>,
    },
}

impl SessionUpdate {
    pub fn code_update(session_id: Uuid, code: String, language: Language) -> Self {
        SessionUpdate::CodeUpdate {
            session_id,
            code,
            language,
            timestamp: Utc::now(),
        }
    }

    pub fn participant_joined(session_id: Uuid, participants: i32) -> Self {
        SessionUpdate::ParticipantJoined {
            session_id,
            participants,
            timestamp: Utc::now(),
        }
    }

    pub fn participant_left(session_id: Uuid, participants: i32) -> Self {
        SessionUpdate::ParticipantLeft {
            session_id,
            participants,
            timestamp: Utc::now(),
        }
    }

    pub fn execution_result(session_id: Uuid, result: ExecutionResult) -> Self {
        SessionUpdate::ExecutionResult {
            session_id,
            execution_result: result,
            timestamp: Utc::now(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            SessionUpdate::CodeUpdate { session_id, .. }
            | SessionUpdate::ParticipantJoined { session_id, .. }
            | SessionUpdate::ParticipantLeft { session_id, .. }
            | SessionUpdate::ExecutionResult { session_id, .. } => *session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_update_wire_shape() {
        let id = Uuid::new_v4();
        let event = SessionUpdate::code_update(id, "print(1)".into(), Language::Python);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "code_update");
        assert_eq!(value["sessionId"], id.to_string());
        assert_eq!(value["code"], "print(1)");
        assert_eq!(value["language"], "python");
        assert!(value.get("timestamp").is_some());
        assert!(value.get("participants").is_none());
    }

    #[test]
    fn participant_joined_wire_shape() {
        let id = Uuid::new_v4();
        let event = SessionUpdate::participant_joined(id, 2);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "participant_joined");
        assert_eq!(value["participants"], 2);
        assert!(value.get("code").is_none());
    }

    #[test]
    fn execution_result_omits_error_when_absent() {
        let event = SessionUpdate::execution_result(
            Uuid::new_v4(),
            ExecutionResult {
                success: true,
                output: "42\n".into(),
                error: None,
                execution_time: 7,
            },
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "execution_result");
        assert_eq!(value["executionResult"]["executionTime"], 7);
        assert!(value["executionResult"].get("error").is_none());
    }
}
