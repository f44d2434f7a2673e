use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crate::backend::QuizBackend;
use crate::error::{Operation, SessionError};
use crate::model::{AnswerRecord, QuizId, SubmissionReason, SubmissionResult};

pub type SubmissionOutcome = Result<SubmissionResult, SessionError>;

#[derive(Debug)]
struct TicketInner {
    reason: SubmissionReason,
    outcome: Mutex<Option<SubmissionOutcome>>,
    settled: Condvar,
}

/// Shared handle to the one submission request of a session.
///
/// Every caller that asks for a submission gets a clone of the same ticket,
/// so all of them observe the same outcome.
#[derive(Debug, Clone)]
pub struct SubmissionTicket(Arc<TicketInner>);

impl SubmissionTicket {
    fn pending(reason: SubmissionReason) -> Self {
        Self(Arc::new(TicketInner {
            reason,
            outcome: Mutex::new(None),
            settled: Condvar::new(),
        }))
    }

    fn settle(&self, outcome: SubmissionOutcome) {
        let mut slot = self
            .0
            .outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(outcome);
        }
        self.0.settled.notify_all();
    }

    pub fn reason(&self) -> SubmissionReason {
        self.0.reason
    }

    pub fn try_outcome(&self) -> Option<SubmissionOutcome> {
        self.0
            .outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_settled(&self) -> bool {
        self.try_outcome().is_some()
    }

    /// Block until the request settles
    pub fn wait(&self) -> SubmissionOutcome {
        let mut slot = self
            .0
            .outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self
                .0
                .settled
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<SubmissionOutcome> {
        let slot = self
            .0
            .outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let (slot, _) = self
            .0
            .settled
            .wait_timeout_while(slot, timeout, |o| o.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.clone()
    }

    pub fn same_request(&self, other: &SubmissionTicket) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// At-most-once gate in front of `QuizBackend::submit_quiz`
pub struct SubmissionCoordinator {
    backend: Arc<dyn QuizBackend>,
    quiz_id: QuizId,
    token: String,
    ticket: Option<SubmissionTicket>,
    answers: Option<AnswerRecord>,
    requests_issued: u32,
}

impl std::fmt::Debug for SubmissionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionCoordinator")
            .field("quiz_id", &self.quiz_id)
            .field("ticket", &self.ticket)
            .field("requests_issued", &self.requests_issued)
            .finish()
    }
}

impl SubmissionCoordinator {
    pub fn new(backend: Arc<dyn QuizBackend>, quiz_id: QuizId, token: impl Into<String>) -> Self {
        Self {
            backend,
            quiz_id,
            token: token.into(),
            ticket: None,
            answers: None,
            requests_issued: 0,
        }
    }

    /// Request the submission. Only the first call reaches the backend.
    pub fn submit(&mut self, reason: SubmissionReason, answers: AnswerRecord) -> SubmissionTicket {
        if let Some(ticket) = &self.ticket {
            tracing::debug!(
                requested = %reason,
                latched = %ticket.reason(),
                "submission already latched"
            );
            return ticket.clone();
        }

        // Latch before anything can suspend
        let ticket = SubmissionTicket::pending(reason);
        self.ticket = Some(ticket.clone());
        self.answers = Some(answers.clone());
        tracing::info!(quiz_id = self.quiz_id, %reason, answered = answers.len(), "submitting quiz");
        self.dispatch(ticket.clone(), answers);
        ticket
    }

    /// Re-issue a failed submission with the same reason and answers.
    ///
    /// Returns `None` when nothing was submitted yet, the request is still in
    /// flight, or it already succeeded.
    pub fn retry(&mut self) -> Option<SubmissionTicket> {
        let previous = self.ticket.as_ref()?;
        match previous.try_outcome() {
            Some(Err(_)) => {}
            _ => return None,
        }
        let answers = self.answers.clone()?;
        let reason = previous.reason();

        let ticket = SubmissionTicket::pending(reason);
        self.ticket = Some(ticket.clone());
        tracing::info!(quiz_id = self.quiz_id, %reason, "retrying failed submission");
        self.dispatch(ticket.clone(), answers);
        Some(ticket)
    }

    fn dispatch(&mut self, ticket: SubmissionTicket, answers: AnswerRecord) {
        self.requests_issued += 1;
        let backend = Arc::clone(&self.backend);
        let quiz_id = self.quiz_id;
        let token = self.token.clone();
        let worker_ticket = ticket.clone();

        let spawned = thread::Builder::new()
            .name("proctor-submit".into())
            .spawn(move || {
                let forced = worker_ticket.reason().is_forced();
                let outcome = backend.submit_quiz(quiz_id, &token, &answers, forced);
                match &outcome {
                    Ok(result) => tracing::info!(quiz_id, score = result.score, "submission accepted"),
                    Err(e) => tracing::error!(quiz_id, "submission failed: {e}"),
                }
                worker_ticket.settle(outcome);
            });

        if let Err(e) = spawned {
            tracing::error!("could not start submission worker: {e}");
            ticket.settle(Err(SessionError::network(
                Operation::SubmitQuiz,
                format!("could not start submission worker: {e}"),
            )));
        }
    }

    pub fn ticket(&self) -> Option<&SubmissionTicket> {
        self.ticket.as_ref()
    }

    pub fn is_latched(&self) -> bool {
        self.ticket.is_some()
    }

    /// Number of requests handed to the backend, retries included
    pub fn requests_issued(&self) -> u32 {
        self.requests_issued
    }
}
