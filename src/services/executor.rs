use std::time::Instant;

use async_trait::async_trait;

use crate::models::{ExecutionResult, Language, Session};

/// Opaque code-execution collaborator. The real engine lives outside this
/// service; what matters here is the result shape it hands back.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, session: &Session) -> ExecutionResult;
}

/// Stand-in executor that fabricates language-tagged output without running
/// anything.
pub struct MockExecutor;

#[async_trait]
impl CodeExecutor for MockExecutor {
    async fn execute(&self, session: &Session) -> ExecutionResult {
        let started = Instant::now();

        if session.code.is_empty() {
            return ExecutionResult {
                success: true,
                output: String::new(),
                error: None,
                execution_time: started.elapsed().as_millis() as u64,
            };
        }

        let output = match session.language {
            Language::Javascript => {
                format!("Mock JS Output: ran {} bytes of code\n", session.code.len())
            }
            Language::Python => {
                format!("Mock Python Output: ran {} bytes of code\n", session.code.len())
            }
        };

        ExecutionResult {
            success: true,
            output,
            error: None,
            execution_time: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn session(code: &str, language: Language) -> Session {
        Session {
            id: Uuid::new_v4(),
            code: code.into(),
            language,
            created_at: Utc::now(),
            participants: 0,
        }
    }

    #[tokio::test]
    async fn empty_code_succeeds_with_empty_output() {
        let result = MockExecutor
            .execute(&session("", Language::Javascript))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn output_is_tagged_per_language() {
        let js = MockExecutor
            .execute(&session("console.log(1)", Language::Javascript))
            .await;
        assert!(js.output.contains("Mock JS Output"));

        let py = MockExecutor
            .execute(&session("print(1)", Language::Python))
            .await;
        assert!(py.output.contains("Mock Python Output"));
    }
}
