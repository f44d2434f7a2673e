use std::collections::HashSet;

use crate::model::{AnswerRecord, QuestionId, QuizDefinition};

/// Current answers for one attempt, restricted to the quiz's questions
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    answers: AnswerRecord,
    known: HashSet<QuestionId>,
    frozen: bool,
}

impl AnswerStore {
    pub fn new(known: impl IntoIterator<Item = QuestionId>) -> Self {
        Self {
            answers: AnswerRecord::new(),
            known: known.into_iter().collect(),
            frozen: false,
        }
    }

    pub fn for_quiz(quiz: &QuizDefinition) -> Self {
        Self::new(quiz.question_ids())
    }

    /// Overwrite the answer for `question_id`. Returns false when ignored.
    pub fn set(&mut self, question_id: QuestionId, value: impl Into<String>) -> bool {
        if self.frozen || !self.known.contains(&question_id) {
            return false;
        }
        self.answers.insert(question_id, value.into());
        true
    }

    pub fn get(&self, question_id: QuestionId) -> Option<&str> {
        self.answers.get(&question_id).map(String::as_str)
    }

    pub fn get_all(&self) -> AnswerRecord {
        self.answers.clone()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}
