use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proctor::backend::QuizBackend;
use proctor::config::SessionSettings;
use proctor::error::{Operation, SessionError};
use proctor::integrity::{EnvironmentCall, IntegritySignal, SyntheticEnvironment};
use proctor::model::{
    AnswerRecord, CompletionStatus, Question, QuestionKind, QuizDefinition, QuizId,
    SubmissionReason, SubmissionResult,
};
use proctor::runtime::{FixedTicker, ProctorEvent, Runner, TestEventSource};
use proctor::{SessionController, SessionState};

// Headless sessions driven through Runner/TestEventSource with an in-memory
// backend. Each tick stands for one second of wall time.

struct ScriptedBackend {
    quiz: QuizDefinition,
    completed: bool,
    fail_submit: bool,
    gate: Mutex<Option<Receiver<()>>>,
    submissions: Mutex<Vec<(AnswerRecord, bool)>>,
}

impl ScriptedBackend {
    fn new(quiz: QuizDefinition) -> Self {
        Self {
            quiz,
            completed: false,
            fail_submit: false,
            gate: Mutex::new(None),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Hold every submission until the returned sender fires
    fn gated(quiz: QuizDefinition) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let backend = Self {
            gate: Mutex::new(Some(rx)),
            ..Self::new(quiz)
        };
        (backend, tx)
    }

    fn submissions(&self) -> Vec<(AnswerRecord, bool)> {
        self.submissions.lock().unwrap().clone()
    }
}

impl QuizBackend for ScriptedBackend {
    fn get_quiz(&self, quiz_id: QuizId, _: &str) -> Result<QuizDefinition, SessionError> {
        if quiz_id == self.quiz.id {
            Ok(self.quiz.clone())
        } else {
            Err(SessionError::NotFound(quiz_id))
        }
    }

    fn get_completion_status(&self, _: QuizId, _: &str) -> Result<CompletionStatus, SessionError> {
        Ok(CompletionStatus {
            has_completed: self.completed,
        })
    }

    fn submit_quiz(
        &self,
        _: QuizId,
        _: &str,
        answers: &AnswerRecord,
        forced: bool,
    ) -> Result<SubmissionResult, SessionError> {
        self.submissions
            .lock()
            .unwrap()
            .push((answers.clone(), forced));
        if let Some(gate) = self.gate.lock().unwrap().as_ref() {
            let _ = gate.recv();
        }
        if self.fail_submit {
            return Err(SessionError::network(Operation::SubmitQuiz, "service unavailable"));
        }
        Ok(SubmissionResult {
            score: 100.0 * answers.len() as f64 / self.quiz.questions.len() as f64,
            correct_answers: answers.len() as u32,
            total_questions: self.quiz.questions.len() as u32,
            feedback: Vec::new(),
        })
    }
}

fn quiz(duration_secs: u64) -> QuizDefinition {
    QuizDefinition {
        id: 5,
        title: "Geography".into(),
        description: "Capitals and rivers".into(),
        questions: vec![
            Question {
                id: 1,
                text: "Capital of France?".into(),
                kind: QuestionKind::MultipleChoice,
                options: vec!["Paris".into(), "Lyon".into()],
            },
            Question {
                id: 2,
                text: "Longest river in Europe".into(),
                kind: QuestionKind::FillIn,
                options: Vec::new(),
            },
            Question {
                id: 3,
                text: "Capital of Spain?".into(),
                kind: QuestionKind::MultipleChoice,
                options: vec!["Madrid".into(), "Seville".into()],
            },
            Question {
                id: 4,
                text: "Highest peak in the Alps".into(),
                kind: QuestionKind::FillIn,
                options: Vec::new(),
            },
            Question {
                id: 5,
                text: "Capital of Italy?".into(),
                kind: QuestionKind::MultipleChoice,
                options: vec!["Rome".into(), "Milan".into()],
            },
        ],
        duration_secs,
    }
}

struct Harness {
    session: SessionController,
    backend: Arc<ScriptedBackend>,
    env: SyntheticEnvironment,
    tx: Sender<ProctorEvent>,
    runner: Runner<TestEventSource, FixedTicker>,
}

impl Harness {
    fn new(backend: ScriptedBackend, max_warnings: u32) -> Self {
        let backend = Arc::new(backend);
        let env = SyntheticEnvironment::new();
        let session = SessionController::new(
            backend.clone(),
            Box::new(env.clone()),
            SessionSettings { max_warnings },
        );
        let (tx, rx) = mpsc::channel();
        let runner = Runner::new(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_millis(1)),
        );
        Self {
            session,
            backend,
            env,
            tx,
            runner,
        }
    }

    fn signal(&self, signal: IntegritySignal) {
        self.tx.send(ProctorEvent::Signal(signal)).unwrap();
    }

    /// Run the loop for `steps` events; ticks advance the clock by one second
    fn drive(&mut self, steps: u32) {
        for _ in 0..steps {
            match self.runner.step() {
                ProctorEvent::Tick => {
                    self.session.advance_clock(Duration::from_secs(1));
                }
                ProctorEvent::Signal(signal) => {
                    self.session.handle_signal(signal);
                }
                ProctorEvent::Key(_) | ProctorEvent::Resize => {}
            }
            self.session.poll();
            if self.session.state().is_terminal() {
                break;
            }
        }
    }

    fn settle(&mut self) -> SessionState {
        self.session.wait_for_submission(Duration::from_secs(5))
    }
}

#[test]
fn manual_submission_completes() {
    let mut h = Harness::new(ScriptedBackend::new(quiz(600)), 3);
    assert_eq!(h.session.load(5, "token"), Ok(SessionState::InProgress));

    h.session.update_answer(1, "Paris");
    h.session.update_answer(2, "Volga");
    h.session.update_answer(3, "Madrid");
    h.drive(120);
    assert_eq!(h.session.snapshot().remaining_secs, 480);
    assert_eq!(h.session.snapshot().answered, 3);

    h.session.request_manual_submit();
    assert_eq!(h.settle(), SessionState::Completed);

    let submissions = h.backend.submissions();
    assert_eq!(submissions.len(), 1);
    let (answers, forced) = &submissions[0];
    assert!(!forced);
    assert_eq!(answers.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(answers.get(&2).map(String::as_str), Some("Volga"));

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.reason, Some(SubmissionReason::Manual));
    let result = snapshot.result.unwrap();
    assert_eq!(result.correct_answers, 3);
    assert_eq!(result.total_questions, 5);
    assert!(!h.session.timer().is_running());
    assert!(!h.session.monitor().is_listening());
}

#[test]
fn timer_expiry_submits_partial_answers() {
    let mut h = Harness::new(ScriptedBackend::new(quiz(3)), 3);
    h.session.load(5, "token").unwrap();
    h.session.update_answer(1, "Paris");

    h.drive(2);
    assert_eq!(h.session.state(), SessionState::InProgress);
    assert_eq!(h.session.snapshot().remaining_secs, 1);

    h.drive(1);
    assert_ne!(h.session.state(), SessionState::InProgress);
    assert_eq!(h.settle(), SessionState::Completed);

    let submissions = h.backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert!(!submissions[0].1);
    assert_eq!(submissions[0].0.len(), 1);
    assert_eq!(h.session.snapshot().reason, Some(SubmissionReason::Timeout));
    assert_eq!(h.session.snapshot().remaining_secs, 0);
}

#[test]
fn warnings_then_breach_forces_submission() {
    let mut h = Harness::new(ScriptedBackend::new(quiz(600)), 3);
    h.session.load(5, "token").unwrap();

    h.signal(IntegritySignal::VisibilityLost);
    h.drive(1);
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.state, SessionState::InProgress);
    assert_eq!(snapshot.warning_count, 1);
    assert!(snapshot.last_warning.unwrap().starts_with("Warning 1/3"));

    h.signal(IntegritySignal::FullscreenExited);
    h.drive(1);
    assert_eq!(h.session.snapshot().warning_count, 2);
    assert_eq!(h.session.state(), SessionState::InProgress);

    h.signal(IntegritySignal::VisibilityLost);
    h.drive(1);
    assert_eq!(h.settle(), SessionState::Completed);

    // Signals after the breach are not counted
    h.session.handle_signal(IntegritySignal::VisibilityLost);
    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.warning_count, 3);
    assert_eq!(snapshot.reason, Some(SubmissionReason::IntegrityExceeded));
    assert_eq!(h.session.integrity().violation_log.len(), 3);

    let submissions = h.backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert!(submissions[0].1);
}

#[test]
fn already_completed_quiz_never_starts() {
    let mut backend = ScriptedBackend::new(quiz(600));
    backend.completed = true;
    let mut h = Harness::new(backend, 3);

    assert_eq!(
        h.session.load(5, "token"),
        Err(SessionError::AlreadyCompleted(5))
    );
    assert_eq!(h.session.state(), SessionState::Errored);
    assert!(!h.session.timer().is_running());
    assert!(h.env.calls().is_empty());

    h.signal(IntegritySignal::VisibilityLost);
    h.drive(3);
    assert_eq!(h.session.snapshot().warning_count, 0);
    assert!(h.session.request_manual_submit().is_none());
    assert!(h.backend.submissions().is_empty());
}

#[test]
fn unknown_quiz_is_not_found() {
    let mut h = Harness::new(ScriptedBackend::new(quiz(600)), 3);
    assert_eq!(h.session.load(99, "token"), Err(SessionError::NotFound(99)));
    assert_eq!(
        h.session.snapshot().error.unwrap().to_string(),
        "Quiz 99 not found"
    );
}

#[test]
fn competing_triggers_issue_one_request() {
    let (backend, release) = ScriptedBackend::gated(quiz(2));
    let mut h = Harness::new(backend, 2);
    h.session.load(5, "token").unwrap();
    h.session.update_answer(1, "Lyon");

    let first = h.session.request_manual_submit().unwrap();
    assert_eq!(h.session.state(), SessionState::Submitting);

    // Answers are frozen while the request is in flight
    assert!(!h.session.update_answer(1, "Paris"));

    // Timer expiry and a breach while submitting both hit the latch
    h.signal(IntegritySignal::VisibilityLost);
    h.signal(IntegritySignal::VisibilityLost);
    h.drive(4);
    let second = h.session.request_manual_submit().unwrap();
    assert!(first.same_request(&second));
    assert_eq!(h.session.submission_requests(), 1);

    release.send(()).unwrap();
    assert_eq!(h.settle(), SessionState::Completed);

    let submissions = h.backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert!(!submissions[0].1);
    assert_eq!(submissions[0].0.get(&1).map(String::as_str), Some("Lyon"));
    assert_eq!(h.session.snapshot().reason, Some(SubmissionReason::Manual));
    assert!(first.wait().is_ok());
}

#[test]
fn expiry_and_manual_submit_in_same_step() {
    let mut h = Harness::new(ScriptedBackend::new(quiz(1)), 3);
    h.session.load(5, "token").unwrap();

    h.session.advance_clock(Duration::from_secs(1));
    h.session.request_manual_submit();
    assert_eq!(h.settle(), SessionState::Completed);

    assert_eq!(h.backend.submissions().len(), 1);
    assert_eq!(h.session.snapshot().reason, Some(SubmissionReason::Timeout));
}

#[test]
fn failed_submission_is_not_resent_by_later_triggers() {
    let mut backend = ScriptedBackend::new(quiz(600));
    backend.fail_submit = true;
    let mut h = Harness::new(backend, 1);
    h.session.load(5, "token").unwrap();
    h.session.update_answer(2, "Danube");

    h.session.request_manual_submit();
    assert_eq!(h.settle(), SessionState::Errored);
    let error = h.session.error().cloned().unwrap();
    assert_eq!(
        error.to_string(),
        "Network error while submitting the quiz: service unavailable"
    );

    h.signal(IntegritySignal::FullscreenExited);
    h.drive(5);
    assert!(h.session.request_manual_submit().is_some());
    assert_eq!(h.backend.submissions().len(), 1);
    assert_eq!(h.session.answers().get(2), Some("Danube"));
    assert_eq!(h.session.state(), SessionState::Errored);
}

#[test]
fn countdown_never_increases_and_stops_at_zero() {
    let mut h = Harness::new(ScriptedBackend::new(quiz(5)), 3);
    h.session.load(5, "token").unwrap();

    let mut last = h.session.snapshot().remaining_secs;
    for _ in 0..8 {
        h.drive(1);
        let remaining = h.session.snapshot().remaining_secs;
        assert!(remaining <= last);
        last = remaining;
    }
    assert_eq!(last, 0);
    assert_eq!(h.settle(), SessionState::Completed);
    assert_eq!(h.backend.submissions().len(), 1);
}

#[test]
fn zero_warning_limit_submits_on_first_violation() {
    let mut h = Harness::new(ScriptedBackend::new(quiz(600)), 0);
    h.session.load(5, "token").unwrap();
    assert_eq!(h.session.snapshot().max_warnings, 1);

    h.signal(IntegritySignal::VisibilityLost);
    h.drive(1);
    assert_eq!(h.settle(), SessionState::Completed);

    let snapshot = h.session.snapshot();
    assert_eq!(snapshot.warning_count, 1);
    assert!(snapshot.warning_count <= snapshot.max_warnings);
    assert_eq!(snapshot.reason, Some(SubmissionReason::IntegrityExceeded));
    assert!(h.backend.submissions()[0].1);
}

#[test]
fn refused_fullscreen_still_starts_session() {
    let backend = Arc::new(ScriptedBackend::new(quiz(600)));
    let env = SyntheticEnvironment::refusing_fullscreen();
    let mut session = SessionController::new(
        backend,
        Box::new(env.clone()),
        SessionSettings::default(),
    );
    assert_eq!(session.load(5, "token"), Ok(SessionState::InProgress));
    assert!(session.monitor().is_listening());

    session.teardown();
    assert_eq!(
        env.calls(),
        vec![EnvironmentCall::Attach, EnvironmentCall::Detach]
    );
}

#[test]
fn teardown_mid_session_stops_everything() {
    let mut h = Harness::new(ScriptedBackend::new(quiz(600)), 3);
    h.session.load(5, "token").unwrap();
    h.session.teardown();

    assert!(!h.session.timer().is_running());
    h.session.handle_signal(IntegritySignal::VisibilityLost);
    assert_eq!(h.session.snapshot().warning_count, 0);
    assert_eq!(
        h.env.calls(),
        vec![
            EnvironmentCall::EnterFullscreen,
            EnvironmentCall::Attach,
            EnvironmentCall::Detach,
            EnvironmentCall::ExitFullscreen
        ]
    );
}
