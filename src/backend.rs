use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Operation, SessionError};
use crate::model::{AnswerRecord, CompletionStatus, Question, QuizDefinition, QuizId, SubmissionResult};

/// Grading service as seen by the client.
///
/// Calls block; the coordinator runs `submit_quiz` off the event loop.
pub trait QuizBackend: Send + Sync + 'static {
    fn get_quiz(&self, quiz_id: QuizId, token: &str) -> Result<QuizDefinition, SessionError>;

    fn get_completion_status(
        &self,
        quiz_id: QuizId,
        token: &str,
    ) -> Result<CompletionStatus, SessionError>;

    fn submit_quiz(
        &self,
        quiz_id: QuizId,
        token: &str,
        answers: &AnswerRecord,
        forced: bool,
    ) -> Result<SubmissionResult, SessionError>;
}

#[derive(Debug, Deserialize)]
struct QuizPayload {
    id: QuizId,
    title: String,
    #[serde(default)]
    description: String,
    duration_minutes: u64,
    #[serde(default)]
    questions: Vec<Question>,
}

impl From<QuizPayload> for QuizDefinition {
    fn from(p: QuizPayload) -> Self {
        Self {
            id: p.id,
            title: p.title,
            description: p.description,
            questions: p.questions,
            duration_secs: p.duration_minutes.saturating_mul(60),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitPayload<'a> {
    answers: &'a AnswerRecord,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    forced_submission: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

/// HTTP implementation of the student quiz API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str, quiz_id: QuizId) -> String {
        format!("{}/api/student/{}/{}", self.base_url, path, quiz_id)
    }

    /// Turn a non-success response into an error, preferring the server's message
    fn check(response: Response, operation: Operation) -> Result<Response, SessionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorPayload>()
            .ok()
            .and_then(|p| p.message)
            .unwrap_or_else(|| format!("server responded with {status}"));
        Err(SessionError::network(operation, message))
    }
}

impl QuizBackend for HttpBackend {
    fn get_quiz(&self, quiz_id: QuizId, token: &str) -> Result<QuizDefinition, SessionError> {
        let op = Operation::GetQuiz;
        let response = self
            .client
            .get(self.url("quiz", quiz_id))
            .bearer_auth(token)
            .send()
            .map_err(|e| SessionError::network(op, e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SessionError::NotFound(quiz_id));
        }
        let response = Self::check(response, op)?;

        // An empty or null body means the quiz does not exist
        let body = response
            .text()
            .map_err(|e| SessionError::network(op, e.to_string()))?;
        if body.trim().is_empty() {
            return Err(SessionError::NotFound(quiz_id));
        }
        let payload: Option<QuizPayload> =
            serde_json::from_str(&body).map_err(|e| SessionError::network(op, e.to_string()))?;
        payload
            .map(QuizDefinition::from)
            .ok_or(SessionError::NotFound(quiz_id))
    }

    fn get_completion_status(
        &self,
        quiz_id: QuizId,
        token: &str,
    ) -> Result<CompletionStatus, SessionError> {
        let op = Operation::GetCompletionStatus;
        let response = self
            .client
            .get(self.url("quiz-result", quiz_id))
            .bearer_auth(token)
            .send()
            .map_err(|e| SessionError::network(op, e.to_string()))?;
        Self::check(response, op)?
            .json()
            .map_err(|e| SessionError::network(op, e.to_string()))
    }

    fn submit_quiz(
        &self,
        quiz_id: QuizId,
        token: &str,
        answers: &AnswerRecord,
        forced: bool,
    ) -> Result<SubmissionResult, SessionError> {
        let op = Operation::SubmitQuiz;
        let response = self
            .client
            .post(self.url("submit-quiz", quiz_id))
            .bearer_auth(token)
            .json(&SubmitPayload {
                answers,
                forced_submission: forced,
            })
            .send()
            .map_err(|e| SessionError::network(op, e.to_string()))?;
        Self::check(response, op)?
            .json()
            .map_err(|e| SessionError::network(op, e.to_string()))
    }
}
