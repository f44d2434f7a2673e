use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type QuizId = u64;
pub type QuestionId = u64;

/// Answers keyed by question id, serialized with string keys on the wire
pub type AnswerRecord = BTreeMap<QuestionId, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum QuestionKind {
    #[serde(rename = "mcq")]
    #[strum(serialize = "Multiple Choice")]
    MultipleChoice,
    #[serde(rename = "fill_in")]
    #[strum(serialize = "Fill in the Blank")]
    FillIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A quiz as loaded for one attempt. Never mutated after load.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizDefinition {
    pub id: QuizId,
    pub title: String,
    pub description: String,
    pub questions: Vec<Question>,
    pub duration_secs: u64,
}

impl QuizDefinition {
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn question_ids(&self) -> impl Iterator<Item = QuestionId> + '_ {
        self.questions.iter().map(|q| q.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionStatus {
    pub has_completed: bool,
}

/// Why a submission was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SubmissionReason {
    Manual,
    Timeout,
    IntegrityExceeded,
}

impl SubmissionReason {
    /// Forced submissions are flagged to the grading service
    pub fn is_forced(&self) -> bool {
        matches!(self, SubmissionReason::IntegrityExceeded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFeedback {
    #[serde(rename = "question")]
    pub question_text: String,
    #[serde(default)]
    pub student_answer: String,
    #[serde(default)]
    pub correct_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub score: f64,
    pub correct_answers: u32,
    pub total_questions: u32,
    #[serde(default, rename = "questionDetails")]
    pub feedback: Vec<QuestionFeedback>,
}
