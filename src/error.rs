use crate::model::QuizId;

/// Backend operation that a network error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Operation {
    #[strum(serialize = "fetching the quiz")]
    GetQuiz,
    #[strum(serialize = "checking completion status")]
    GetCompletionStatus,
    #[strum(serialize = "submitting the quiz")]
    SubmitQuiz,
}

/// Typed outcome of a failed session operation.
///
/// Cloneable so every caller waiting on the same submission sees the same error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("You have already completed quiz {0}")]
    AlreadyCompleted(QuizId),

    #[error("Quiz {0} not found")]
    NotFound(QuizId),

    #[error("Network error while {operation}: {message}")]
    Network { operation: Operation, message: String },
}

impl SessionError {
    pub fn network(operation: Operation, message: impl Into<String>) -> Self {
        SessionError::Network {
            operation,
            message: message.into(),
        }
    }

    /// Load-time network failures may be retried by calling `load` again
    pub fn is_retryable_load(&self) -> bool {
        matches!(
            self,
            SessionError::Network {
                operation: Operation::GetQuiz | Operation::GetCompletionStatus,
                ..
            }
        )
    }

    pub fn is_submit_failure(&self) -> bool {
        matches!(
            self,
            SessionError::Network {
                operation: Operation::SubmitQuiz,
                ..
            }
        )
    }
}
