pub mod format;
pub mod tables;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, Paragraph, Widget, Wrap},
};

use crate::app::{App, AppState};
use crate::clock::Clock;
use crate::session::{ExamSession, SubmitReason};
use format::{format_minutes, format_time, option_label, pluralize, popup_area, truncate};

const HORIZONTAL_MARGIN: u16 = 2;
const VERTICAL_MARGIN: u16 = 1;
/// Timer turns red below this many seconds.
const LOW_TIME_SECS: u64 = 60;

impl<C: Clock> Widget for &App<C> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match (self.state, self.session.as_ref()) {
            (AppState::History, _) => tables::render_history(self, area, buf),
            (AppState::ExamList, _) | (_, None) => render_exam_list(self, area, buf),
            (AppState::Taking, Some(session)) => render_question(self, session, area, buf),
            (AppState::ConfirmSubmit, Some(session)) => {
                render_question(self, session, area, buf);
                render_confirm(session, area, buf);
            }
            (AppState::Results, Some(session)) => render_results(self, session, area, buf),
            (AppState::Review, Some(session)) => tables::render_review(self, session, area, buf),
        }
    }
}

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

/// Bottom rows shared by every screen: key help and the transient status line.
pub(crate) fn render_footer<C: Clock>(app: &App<C>, help: &str, area: Rect, buf: &mut Buffer) {
    let [help_area, status_area] = Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).areas(area);

    Paragraph::new(Span::styled(help.to_string(), dim()))
        .alignment(Alignment::Center)
        .render(help_area, buf);

    if let Some(status) = &app.status {
        Paragraph::new(Span::styled(
            status.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        ))
        .alignment(Alignment::Center)
        .render(status_area, buf);
    }
}

pub(crate) fn screen_chunks(area: Rect, header: u16) -> [Rect; 3] {
    Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(header),
            Constraint::Min(0),
            Constraint::Length(2),
        ])
        .areas(area)
}

fn render_exam_list<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let [header, body, footer] = screen_chunks(area, 3);

    let who = match &app.profile {
        Some(p) => format!("{} <{}> · {}", p.name, p.email, p.role),
        None => "not logged in".to_string(),
    };
    Paragraph::new(Line::from(vec![
        Span::styled("Tryout Exams", bold().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(who, dim()),
    ]))
    .block(Block::default().borders(Borders::BOTTOM))
    .render(header, buf);

    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(45), Constraint::Percentage(55)]).areas(body);

    if app.exams.is_empty() {
        Paragraph::new("No exams available. Import one with `tryout exam import <FILE>`.")
            .wrap(Wrap { trim: true })
            .render(body, buf);
    } else {
        let width = list_area.width.saturating_sub(4) as usize;
        let lines: Vec<Line> = app
            .exams
            .iter()
            .enumerate()
            .flat_map(|(i, exam)| {
                let selected = i == app.selected;
                let marker = if selected { "> " } else { "  " };
                let title_style = if selected {
                    bold().fg(Color::Green)
                } else {
                    Style::default()
                };
                [
                    Line::from(Span::styled(
                        format!("{marker}{}", truncate(&exam.title, width)),
                        title_style,
                    )),
                    Line::from(Span::styled(
                        format!(
                            "    {} · {}",
                            pluralize(exam.question_count, "question"),
                            format_minutes(exam.duration_seconds)
                        ),
                        dim(),
                    )),
                ]
            })
            .collect();
        // keep the highlighted entry on screen
        let visible = list_area.height.saturating_sub(2) / 2;
        let offset = (app.selected as u16 + 1).saturating_sub(visible) * 2;
        Paragraph::new(lines)
            .scroll((offset, 0))
            .block(Block::default().borders(Borders::ALL).title("Exams"))
            .render(list_area, buf);

        if let Some(exam) = app.selected_exam() {
            let lines = vec![
                Line::from(Span::styled(exam.title.clone(), bold())),
                Line::from(""),
                Line::from(exam.description.clone()),
                Line::from(""),
                Line::from(format!("Category:      {}", exam.category)),
                Line::from(format!("Difficulty:    {}", exam.difficulty)),
                Line::from(format!("Questions:     {}", exam.question_count)),
                Line::from(format!("Duration:      {}", format_minutes(exam.duration_seconds))),
                Line::from(format!("Passing score: {}%", exam.passing_score)),
                Line::from(Span::styled(format!("Source:        {}", exam.source), dim())),
            ];
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title("Details"))
                .render(detail_area, buf);
        }
    }

    render_footer(app, "↑/↓ select · Enter start · h history · r reload · q quit", footer, buf);
}

fn render_question<C: Clock>(app: &App<C>, session: &ExamSession, area: Rect, buf: &mut Buffer) {
    let snapshot = session.snapshot();
    let [header, body, footer] = screen_chunks(area, 5);

    let [title_row, gauge_row, caption_row] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Length(2),
    ])
    .areas(header);

    let timer = format_time(snapshot.remaining_seconds);
    let [title_area, timer_area] =
        Layout::horizontal([Constraint::Min(0), Constraint::Length(timer.len() as u16 + 6)]).areas(title_row);
    Paragraph::new(Span::styled(snapshot.exam_title.clone(), bold()))
        .render(title_area, buf);
    let timer_style = if snapshot.remaining_seconds < LOW_TIME_SECS {
        bold().fg(Color::Red)
    } else {
        bold().fg(Color::Blue)
    };
    Paragraph::new(Span::styled(format!("Time {timer}"), timer_style))
        .alignment(Alignment::Right)
        .render(timer_area, buf);

    let progress = session.progress_percent();
    Gauge::default()
        .gauge_style(Style::default().fg(Color::Blue).bg(Color::DarkGray))
        .percent(u16::from(progress))
        .label("")
        .render(gauge_row, buf);

    let [left, right] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(caption_row);
    Paragraph::new(Span::styled(
        format!(
            "Question {} of {}",
            snapshot.current_question_index + 1,
            snapshot.question_count
        ),
        dim(),
    ))
    .render(left, buf);
    Paragraph::new(Span::styled(format!("{progress}% Complete"), dim()))
        .alignment(Alignment::Right)
        .render(right, buf);

    let mut lines = vec![Line::from(Span::styled(
        format!("{}. {}", snapshot.current_question_index + 1, snapshot.prompt),
        bold(),
    ))];
    if let Some(topic) = &snapshot.topic {
        lines.push(Line::from(Span::styled(topic.clone(), dim().add_modifier(Modifier::ITALIC))));
    }
    lines.push(Line::from(""));
    for (i, option) in snapshot.options.iter().enumerate() {
        let chosen = snapshot.selected == Some(i);
        let (marker, style) = if chosen {
            ("●", bold().fg(Color::Blue))
        } else {
            ("○", Style::default())
        };
        lines.push(Line::from(Span::styled(
            format!("  {marker} {}. {option}", option_label(i)),
            style,
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!(
            "Answered {} of {}",
            snapshot.answered_count, snapshot.question_count
        ),
        dim(),
    )));

    Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::TOP))
        .render(body, buf);

    render_footer(
        app,
        "1-9/a-i answer · ←/p prev · →/n next · x clear · s submit · Esc abandon",
        footer,
        buf,
    );
}

fn render_confirm(session: &ExamSession, area: Rect, buf: &mut Buffer) {
    let popup = popup_area(area, 48, 7);
    Clear.render(popup, buf);

    let unanswered = session.unanswered_count();
    Paragraph::new(vec![
        Line::from(""),
        Line::from(format!(
            "You still have {} unanswered.",
            pluralize(unanswered, "question")
        )),
        Line::from("Unanswered questions count as incorrect."),
        Line::from(""),
        Line::from(Span::styled("y submit · n keep working", dim())),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title("Submit exam?"),
    )
    .render(popup, buf);
}

fn render_results<C: Clock>(app: &App<C>, session: &ExamSession, area: Rect, buf: &mut Buffer) {
    let [header, body, footer] = screen_chunks(area, 3);

    Paragraph::new(Span::styled("Exam Completed", bold().fg(Color::Cyan)))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::BOTTOM))
        .render(header, buf);

    let Some(result) = session.result() else {
        return;
    };

    let mut lines = Vec::new();
    if session.submitted_by() == Some(SubmitReason::TimeExpired) {
        lines.push(Line::from(Span::styled(
            "Time's up! Your answers were submitted automatically.",
            bold().fg(Color::Red),
        )));
        lines.push(Line::from(""));
    }

    let verdict = if result.passed {
        Span::styled("PASSED", bold().fg(Color::Green))
    } else {
        Span::styled("NOT PASSED", bold().fg(Color::Red))
    };

    lines.extend([
        Line::from(Span::styled(session.exam().title.clone(), bold())),
        Line::from(""),
        Line::from(Span::styled(
            format!("{}%", result.score_percent),
            bold().fg(Color::Blue),
        )),
        Line::from(""),
        Line::from(format!(
            "You answered {} out of {} questions correctly.",
            result.correct_count, result.total_questions
        )),
        Line::from(vec![
            verdict,
            Span::styled(
                format!(" (passing score {}%)", session.exam().passing_score),
                dim(),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            format!("Time used: {}", format_time(session.elapsed_seconds())),
            dim(),
        )),
    ]);

    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(body, buf);

    render_footer(
        app,
        "r retry · v review answers · h history · b back to exams · q quit",
        footer,
        buf,
    );
}
