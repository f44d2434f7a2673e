use chrono::Local;
use std::sync::Arc;
use std::time::Duration;

use crate::answers::AnswerStore;
use crate::backend::QuizBackend;
use crate::config::SessionSettings;
use crate::coordinator::{SubmissionCoordinator, SubmissionOutcome, SubmissionTicket};
use crate::error::SessionError;
use crate::integrity::{
    IntegrityEventSource, IntegrityMonitor, IntegritySignal, IntegrityState, MonitorOutcome,
};
use crate::journal::{AttemptEntry, Journal};
use crate::model::{QuestionId, QuizDefinition, QuizId, SubmissionReason, SubmissionResult};
use crate::timer::{CountdownTimer, TimerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionState {
    Loading,
    Ready,
    InProgress,
    Submitting,
    Completed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Errored)
    }
}

/// Read-only view of a session for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub remaining_secs: u64,
    pub total_secs: u64,
    pub answered: usize,
    pub total_questions: usize,
    pub warning_count: u32,
    pub max_warnings: u32,
    pub last_warning: Option<String>,
    pub reason: Option<SubmissionReason>,
    pub result: Option<SubmissionResult>,
    pub error: Option<SessionError>,
}

/// One test-taker's attempt at one quiz, from load to Completed/Errored
pub struct SessionController {
    backend: Arc<dyn QuizBackend>,
    settings: SessionSettings,
    state: SessionState,
    quiz: Option<QuizDefinition>,
    answers: AnswerStore,
    timer: CountdownTimer,
    monitor: IntegrityMonitor,
    coordinator: Option<SubmissionCoordinator>,
    pending: Option<SubmissionTicket>,
    reason: Option<SubmissionReason>,
    result: Option<SubmissionResult>,
    error: Option<SessionError>,
    last_warning: Option<String>,
    journal: Option<Journal>,
    torn_down: bool,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn QuizBackend>,
        environment: Box<dyn IntegrityEventSource>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            backend,
            settings,
            state: SessionState::Loading,
            quiz: None,
            answers: AnswerStore::default(),
            timer: CountdownTimer::new(),
            monitor: IntegrityMonitor::new(environment),
            coordinator: None,
            pending: None,
            reason: None,
            result: None,
            error: None,
            last_warning: None,
            journal: None,
            torn_down: false,
        }
    }

    /// Record finished attempts in `journal`
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Fetch the quiz and start the attempt.
    ///
    /// May be called again after a load-time network error; any other
    /// failure is terminal.
    pub fn load(&mut self, quiz_id: QuizId, token: &str) -> Result<SessionState, SessionError> {
        match self.state {
            SessionState::Loading => {}
            SessionState::Errored if self.quiz.is_none() => match self.error.take() {
                Some(e) if e.is_retryable_load() => {
                    tracing::info!(quiz_id, "retrying quiz load");
                    self.state = SessionState::Loading;
                }
                Some(e) => {
                    self.error = Some(e.clone());
                    return Err(e);
                }
                None => return Ok(self.state),
            },
            state => {
                tracing::warn!(%state, "load ignored, session already loaded");
                return Ok(state);
            }
        }

        let quiz = match self.fetch(quiz_id, token) {
            Ok(quiz) => quiz,
            Err(e) => {
                tracing::error!(quiz_id, "could not load quiz: {e}");
                self.state = SessionState::Errored;
                self.error = Some(e.clone());
                return Err(e);
            }
        };

        tracing::info!(
            quiz_id,
            title = %quiz.title,
            questions = quiz.questions.len(),
            duration_secs = quiz.duration_secs,
            "quiz loaded"
        );
        self.answers = AnswerStore::for_quiz(&quiz);
        self.coordinator = Some(SubmissionCoordinator::new(
            Arc::clone(&self.backend),
            quiz_id,
            token,
        ));
        let duration = quiz.duration_secs;
        self.quiz = Some(quiz);
        self.state = SessionState::Ready;

        self.timer.start(duration);
        self.monitor.start(self.settings.max_warnings);
        self.state = SessionState::InProgress;
        Ok(self.state)
    }

    fn fetch(&self, quiz_id: QuizId, token: &str) -> Result<QuizDefinition, SessionError> {
        let quiz = self.backend.get_quiz(quiz_id, token)?;
        let status = self.backend.get_completion_status(quiz_id, token)?;
        if status.has_completed {
            return Err(SessionError::AlreadyCompleted(quiz_id));
        }
        Ok(quiz)
    }

    /// Record an answer. Silently ignored unless the session is in progress.
    pub fn update_answer(&mut self, question_id: QuestionId, value: impl Into<String>) -> bool {
        if self.state != SessionState::InProgress {
            return false;
        }
        self.answers.set(question_id, value)
    }

    pub fn request_manual_submit(&mut self) -> Option<SubmissionTicket> {
        self.submit(SubmissionReason::Manual)
    }

    /// Single entry point for every submission trigger
    fn submit(&mut self, reason: SubmissionReason) -> Option<SubmissionTicket> {
        let coordinator = self.coordinator.as_mut()?;

        if self.state == SessionState::InProgress {
            self.answers.freeze();
            self.state = SessionState::Submitting;
            self.reason = Some(reason);
        }

        let ticket = coordinator.submit(reason, self.answers.get_all());
        if self.state == SessionState::Submitting {
            self.pending = Some(ticket.clone());
        }
        self.poll();
        Some(ticket)
    }

    /// Feed elapsed wall time to the countdown; expiry submits with `timeout`
    pub fn advance_clock(&mut self, elapsed: Duration) -> Vec<TimerEvent> {
        let events = self.timer.advance(elapsed);
        if events.contains(&TimerEvent::Expired) {
            tracing::info!("time is up");
            self.submit(SubmissionReason::Timeout);
        }
        self.poll();
        events
    }

    /// Feed one environment signal to the integrity monitor
    pub fn handle_signal(&mut self, signal: IntegritySignal) -> MonitorOutcome {
        let outcome = self.monitor.observe(signal, Local::now());
        match &outcome {
            MonitorOutcome::Warning { message, .. } => {
                self.last_warning = Some(message.clone());
            }
            MonitorOutcome::ThresholdBreached { message, .. } => {
                self.last_warning = Some(message.clone());
                self.submit(SubmissionReason::IntegrityExceeded);
            }
            MonitorOutcome::Ignored => {}
        }
        outcome
    }

    pub fn dismiss_warning(&mut self) {
        self.last_warning = None;
    }

    /// Pick up a settled submission without blocking
    pub fn poll(&mut self) -> SessionState {
        if self.state != SessionState::Submitting {
            return self.state;
        }
        let outcome = self.pending.as_ref().and_then(SubmissionTicket::try_outcome);
        if let Some(outcome) = outcome {
            self.settle(outcome);
        }
        self.state
    }

    /// Block up to `timeout` for the in-flight submission
    pub fn wait_for_submission(&mut self, timeout: Duration) -> SessionState {
        if self.state == SessionState::Submitting {
            if let Some(ticket) = self.pending.clone() {
                ticket.wait_timeout(timeout);
            }
        }
        self.poll()
    }

    fn settle(&mut self, outcome: SubmissionOutcome) {
        self.pending = None;
        self.timer.stop();
        self.monitor.stop();

        match outcome {
            Ok(result) => {
                tracing::info!(
                    score = result.score,
                    correct = result.correct_answers,
                    total = result.total_questions,
                    "session completed"
                );
                self.state = SessionState::Completed;
                self.result = Some(result);
            }
            Err(e) => {
                tracing::error!("session errored: {e}");
                self.state = SessionState::Errored;
                self.error = Some(e);
            }
        }
        self.record_attempt();
    }

    /// Re-issue a failed submission with the same reason and answers
    pub fn retry_submission(&mut self) -> Option<SubmissionTicket> {
        if self.state != SessionState::Errored {
            return None;
        }
        if !self.error.as_ref().is_some_and(SessionError::is_submit_failure) {
            return None;
        }
        let ticket = self.coordinator.as_mut()?.retry()?;
        self.error = None;
        self.state = SessionState::Submitting;
        self.pending = Some(ticket.clone());
        self.poll();
        Some(ticket)
    }

    fn record_attempt(&self) {
        let (Some(journal), Some(quiz), Some(reason)) = (&self.journal, &self.quiz, self.reason)
        else {
            return;
        };
        let integrity = self.monitor.state();
        let entry = AttemptEntry {
            quiz_id: quiz.id,
            title: quiz.title.clone(),
            reason,
            outcome: match &self.error {
                Some(e) => e.to_string(),
                None => "completed".to_string(),
            },
            score: self.result.as_ref().map(|r| r.score),
            correct_answers: self.result.as_ref().map(|r| r.correct_answers),
            total_questions: self.result.as_ref().map(|r| r.total_questions),
            warning_count: integrity.warning_count,
            violations: integrity.violation_log.clone(),
            finished_at: Local::now(),
        };
        if let Err(e) = journal.record(&entry) {
            tracing::warn!("could not record attempt in journal: {e}");
        }
    }

    /// Stop the timer, detach the monitor and leave fullscreen. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.timer.stop();
        self.monitor.stop();
        self.monitor.exit_fullscreen();
        tracing::debug!(state = %self.state, "session torn down");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let integrity = self.monitor.state();
        SessionSnapshot {
            state: self.state,
            remaining_secs: self.timer.remaining(),
            total_secs: self.quiz.as_ref().map_or(0, |q| q.duration_secs),
            answered: self.answers.answered_count(),
            total_questions: self.quiz.as_ref().map_or(0, |q| q.questions.len()),
            warning_count: integrity.warning_count,
            max_warnings: integrity.max_warnings,
            last_warning: self.last_warning.clone(),
            reason: self.reason,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn quiz(&self) -> Option<&QuizDefinition> {
        self.quiz.as_ref()
    }

    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    pub fn integrity(&self) -> &IntegrityState {
        self.monitor.state()
    }

    pub fn timer(&self) -> &CountdownTimer {
        &self.timer
    }

    pub fn monitor(&self) -> &IntegrityMonitor {
        &self.monitor
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn submission_requests(&self) -> u32 {
        self.coordinator
            .as_ref()
            .map_or(0, SubmissionCoordinator::requests_issued)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}
