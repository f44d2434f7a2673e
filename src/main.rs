mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
    tty::IsTty,
};
use proctor::{
    app_dirs::AppDirs,
    backend::HttpBackend,
    config::{Config, ConfigStore, FileConfigStore},
    integrity::TerminalEnvironment,
    journal::Journal,
    model::{Question, QuestionKind, QuizId},
    runtime::{CrosstermEventSource, FixedTicker, ProctorEvent, ProctorEventSource, Runner, Ticker},
    SessionController, SessionState,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long to wait for an in-flight submission when leaving
const SUBMIT_GRACE: Duration = Duration::from_secs(5);

/// proctored, timed quiz sessions in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Take a timed quiz exactly once. The session runs fullscreen; leaving the terminal or shrinking it counts as a warning, and reaching the warning limit submits the quiz."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// take a quiz
    Take {
        /// id of the quiz to take
        quiz_id: QuizId,

        /// auth token (defaults to the one saved with `login`)
        #[clap(short = 't', long)]
        token: Option<String>,

        /// base url of the quiz service
        #[clap(short = 'u', long)]
        base_url: Option<String>,

        /// number of warnings that force a submission
        #[clap(short = 'm', long)]
        max_warnings: Option<u32>,
    },
    /// save the auth token used for quiz sessions
    Login {
        #[clap(short = 't', long)]
        token: String,
    },
    /// print the effective configuration
    Config,
}

impl Cli {
    /// Overlay command line flags on the stored configuration
    fn apply(&self, mut config: Config) -> Config {
        if let Command::Take {
            token,
            base_url,
            max_warnings,
            ..
        } = &self.command
        {
            if let Some(token) = token {
                config.token = Some(token.clone());
            }
            if let Some(base_url) = base_url {
                config.base_url = base_url.clone();
            }
            if let Some(max) = max_warnings {
                config.max_warnings = *max;
            }
        }
        config
    }
}

/// Presentation state around one session
pub struct App {
    pub session: SessionController,
    pub current: usize,
    pub should_quit: bool,
}

impl App {
    pub fn new(session: SessionController) -> Self {
        Self {
            session,
            current: 0,
            should_quit: false,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.session.quiz()?.questions.get(self.current)
    }

    fn question_count(&self) -> usize {
        self.session.quiz().map_or(0, |q| q.questions.len())
    }

    pub fn next_question(&mut self) {
        if self.current + 1 < self.question_count() {
            self.current += 1;
        }
    }

    pub fn previous_question(&mut self) {
        if self.current > 0 {
            self.current -= 1;
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match self.session.state() {
            SessionState::InProgress | SessionState::Submitting => self.on_question_key(key),
            SessionState::Errored => match key.code {
                KeyCode::Char('r') => {
                    self.session.retry_submission();
                }
                KeyCode::Esc | KeyCode::Char('q') => self.should_quit = true,
                _ => {}
            },
            SessionState::Completed => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter) {
                    self.should_quit = true;
                }
            }
            SessionState::Loading | SessionState::Ready => {}
        }
    }

    fn on_question_key(&mut self, key: KeyEvent) {
        if self.session.snapshot().last_warning.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.session.dismiss_warning();
            }
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            if key.code == KeyCode::Char('s') {
                self.session.request_manual_submit();
            }
            return;
        }

        match key.code {
            KeyCode::Right | KeyCode::Tab => self.next_question(),
            KeyCode::Left | KeyCode::BackTab => self.previous_question(),
            code => {
                let Some(question) = self.current_question().cloned() else {
                    return;
                };
                match (question.kind, code) {
                    (QuestionKind::MultipleChoice, KeyCode::Char(c)) => {
                        let choice = c
                            .to_digit(10)
                            .and_then(|d| (d as usize).checked_sub(1))
                            .and_then(|idx| question.options.get(idx));
                        if let Some(option) = choice {
                            self.session.update_answer(question.id, option.clone());
                        }
                    }
                    (QuestionKind::FillIn, KeyCode::Char(c)) => {
                        let mut draft = self
                            .session
                            .answers()
                            .get(question.id)
                            .unwrap_or_default()
                            .to_string();
                        draft.push(c);
                        self.session.update_answer(question.id, draft);
                    }
                    (QuestionKind::FillIn, KeyCode::Backspace) => {
                        if let Some(current) = self.session.answers().get(question.id) {
                            let mut draft = current.to_string();
                            draft.pop();
                            self.session.update_answer(question.id, draft);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let store = FileConfigStore::new();
    let config = cli.apply(store.load());

    match cli.command {
        Command::Login { token } => {
            let config = Config {
                token: Some(token),
                ..config
            };
            store.save(&config)?;
            println!("Token saved to {}", store.path().display());
            Ok(())
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Take { quiz_id, .. } => take(quiz_id, config),
    }
}

fn take(quiz_id: QuizId, config: Config) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }
    let Some(token) = config.token.clone() else {
        let mut cmd = Cli::command();
        cmd.error(
            ErrorKind::MissingRequiredArgument,
            "no auth token; pass --token or run `proctor login --token <TOKEN>`",
        )
        .exit();
    };

    let log_guard = init_logging();

    let backend = Arc::new(HttpBackend::new(&config.base_url, config.request_timeout())?);
    let mut session = SessionController::new(
        backend,
        Box::new(TerminalEnvironment),
        config.session_settings(),
    );
    match Journal::open_default() {
        Ok(journal) => session = session.with_journal(journal),
        Err(e) => tracing::warn!("attempt journal unavailable: {e}"),
    }

    if let Err(e) = session.load(quiz_id, &token) {
        eprintln!("{e}");
        drop(log_guard);
        std::process::exit(1);
    }

    enable_raw_mode()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(config.tick_rate()),
    );
    let mut app = App::new(session);
    let outcome = run_session(&mut terminal, &mut app, &runner);

    if app.session.state() == SessionState::Submitting {
        app.session.wait_for_submission(SUBMIT_GRACE);
    }
    app.session.teardown();
    disable_raw_mode()?;
    terminal.show_cursor()?;
    outcome?;

    print_summary(&app);
    Ok(())
}

fn run_session<B: Backend, E: ProctorEventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<E, T>,
) -> io::Result<()> {
    let mut last = Instant::now();
    loop {
        terminal.draw(|f| ui::draw(app, f))?;

        let event = runner.step();
        let now = Instant::now();
        app.session.advance_clock(now.duration_since(last));
        last = now;

        match event {
            ProctorEvent::Key(key) => app.on_key(key),
            ProctorEvent::Signal(signal) => {
                app.session.handle_signal(signal);
            }
            ProctorEvent::Resize | ProctorEvent::Tick => {}
        }
        app.session.poll();

        if app.should_quit {
            return Ok(());
        }
    }
}

fn print_summary(app: &App) {
    let snapshot = app.session.snapshot();
    match (&snapshot.result, &snapshot.error) {
        (Some(result), _) => println!(
            "Score: {}/{} ({}%)",
            result.correct_answers, result.total_questions, result.score
        ),
        (None, Some(e)) => eprintln!("{e}"),
        (None, None) => println!("Session left before submitting."),
    }
}

fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let dir = AppDirs::log_dir()?;
    std::fs::create_dir_all(&dir).ok()?;

    let file_appender = tracing_appender::rolling::daily(dir, "proctor.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter =
        EnvFilter::try_from_env("PROCTOR_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();
    Some(guard)
}
