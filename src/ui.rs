use itertools::Itertools;
use proctor::{
    model::{QuestionKind, SubmissionReason, SubmissionResult},
    util::{completion_percentage, format_clock, timer_urgency, TimerUrgency},
    SessionError, SessionSnapshot, SessionState,
};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget, Wrap},
    Frame,
};

use crate::App;

const HORIZONTAL_MARGIN: u16 = 2;
const VERTICAL_MARGIN: u16 = 1;

pub fn draw(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let snapshot = self.session.snapshot();
        let area = area.inner(ratatui::layout::Margin {
            horizontal: HORIZONTAL_MARGIN,
            vertical: VERTICAL_MARGIN,
        });

        match snapshot.state {
            SessionState::Loading | SessionState::Ready => {
                Paragraph::new("Loading quiz...")
                    .alignment(Alignment::Center)
                    .render(area, buf);
            }
            SessionState::InProgress | SessionState::Submitting => {
                self.render_question(&snapshot, area, buf);
                if let Some(message) = &snapshot.last_warning {
                    render_warning(&snapshot, message, area, buf);
                }
            }
            SessionState::Completed => {
                if let Some(result) = &snapshot.result {
                    render_result(result, snapshot.reason, area, buf);
                }
            }
            SessionState::Errored => {
                if let Some(error) = &snapshot.error {
                    render_error(error, area, buf);
                }
            }
        }
    }
}

impl App {
    fn render_question(&self, snapshot: &SessionSnapshot, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);

        let [header, progress, body, footer] = Layout::vertical([
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .areas(area);

        let title = self
            .session
            .quiz()
            .map(|q| q.title.as_str())
            .unwrap_or_default();

        let clock_style = match timer_urgency(snapshot.remaining_secs, snapshot.total_secs) {
            TimerUrgency::Normal => Style::default().fg(Color::Green),
            TimerUrgency::Warning => Style::default().fg(Color::Yellow),
            TimerUrgency::Critical => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        };
        let warnings_style = if snapshot.warning_count > 0 {
            Style::default().fg(Color::Red)
        } else {
            dim_style
        };

        Paragraph::new(vec![
            Line::from(Span::styled(title.to_string(), bold_style)),
            Line::from(vec![
                Span::styled(format!("Time left {}", format_clock(snapshot.remaining_secs)), clock_style),
                Span::raw("   "),
                Span::styled(
                    format!("Warnings {}/{}", snapshot.warning_count, snapshot.max_warnings),
                    warnings_style,
                ),
            ]),
        ])
        .render(header, buf);

        let percent = completion_percentage(snapshot.answered, snapshot.total_questions);
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio((percent / 100.0).clamp(0.0, 1.0))
            .label(format!(
                "{}/{} answered ({:.0}%)",
                snapshot.answered, snapshot.total_questions, percent
            ))
            .render(progress, buf);

        if let Some(question) = self.current_question() {
            let answer = self.session.answers().get(question.id);
            let mut lines = vec![
                Line::from(Span::styled(question.text.clone(), bold_style)),
                Line::default(),
            ];
            match question.kind {
                QuestionKind::MultipleChoice => {
                    lines.extend(question.options.iter().enumerate().map(|(idx, option)| {
                        let selected = answer == Some(option.as_str());
                        let marker = if selected { "(x)" } else { "( )" };
                        let style = if selected {
                            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                        } else {
                            Style::default()
                        };
                        Line::from(Span::styled(format!("{} {}. {}", marker, idx + 1, option), style))
                    }));
                }
                QuestionKind::FillIn => {
                    lines.push(Line::from(vec![
                        Span::styled("> ", dim_style),
                        Span::styled(
                            answer.unwrap_or_default().to_string(),
                            Style::default().add_modifier(Modifier::UNDERLINED),
                        ),
                    ]));
                }
            }

            let total = self.session.quiz().map_or(0, |q| q.questions.len());
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(format!(" Question {} of {} ", self.current + 1, total))
                        .title_bottom(format!(" {} ", question.kind)),
                )
                .render(body, buf);
        }

        let help = if snapshot.state == SessionState::Submitting {
            Line::from(Span::styled(
                "Submitting...",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
            ))
        } else {
            Line::from(Span::styled(
                ["←/→ navigate", "1-9 choose", "type to answer", "ctrl-s submit", "ctrl-c quit"]
                    .iter()
                    .join(" · "),
                dim_style,
            ))
        };
        Paragraph::new(help)
            .alignment(Alignment::Center)
            .render(footer, buf);
    }
}

fn render_warning(snapshot: &SessionSnapshot, message: &str, area: Rect, buf: &mut Buffer) {
    let mut lines = vec![Line::from(message.to_string()), Line::default()];
    if snapshot.warning_count >= snapshot.max_warnings {
        lines.push(Line::from(Span::styled(
            "Maximum warnings reached. Your quiz is being submitted and cannot be retaken.",
            Style::default().add_modifier(Modifier::BOLD),
        )));
    } else {
        lines.push(Line::from(Span::styled(
            "Press Enter to return to the quiz",
            Style::default().add_modifier(Modifier::DIM),
        )));
    }

    let popup = centered(area, 60, 7);
    Clear.render(popup, buf);
    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Warning ")
                .border_style(Style::default().fg(Color::Red)),
        )
        .render(popup, buf);
}

fn render_result(result: &SubmissionResult, reason: Option<SubmissionReason>, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let green_style = Style::default().fg(Color::Green);
    let red_style = Style::default().fg(Color::Red);

    let mut lines = vec![
        Line::from(Span::styled("Quiz Completed!", bold_style)),
        Line::from(format!(
            "Score: {}/{} ({}%)",
            result.correct_answers, result.total_questions, result.score
        )),
    ];
    match reason {
        Some(SubmissionReason::Timeout) => {
            lines.push(Line::from(Span::styled("Submitted automatically: time ran out", red_style)))
        }
        Some(SubmissionReason::IntegrityExceeded) => lines.push(Line::from(Span::styled(
            "Submitted automatically: maximum warnings reached",
            red_style,
        ))),
        Some(SubmissionReason::Manual) | None => {}
    }
    lines.push(Line::default());

    for (idx, item) in result.feedback.iter().enumerate() {
        let (mark, style) = if item.is_correct {
            ("✓", green_style)
        } else {
            ("✗", red_style)
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{mark} "), style),
            Span::styled(format!("{}. {}", idx + 1, item.question_text), bold_style),
        ]));
        lines.push(Line::from(format!("   Your answer: {}", item.student_answer)));
        if !item.is_correct {
            lines.push(Line::from(format!("   Correct answer: {}", item.correct_answer)));
        }
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "Press q to exit",
        Style::default().add_modifier(Modifier::DIM),
    )));

    Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .render(area, buf);
}

fn render_error(error: &SessionError, area: Rect, buf: &mut Buffer) {
    let hint = if error.is_submit_failure() {
        "Your answers are kept. Press r to retry submitting, q to exit"
    } else {
        "Press q to exit"
    };
    Paragraph::new(vec![
        Line::from(Span::styled(
            error.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from(Span::styled(hint, Style::default().add_modifier(Modifier::DIM))),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .render(area, buf);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    popup
}
