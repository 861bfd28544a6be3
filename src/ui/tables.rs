use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Widget, Wrap},
};

use super::format::{format_time, option_label, truncate};
use super::{render_footer, screen_chunks};
use crate::app::App;
use crate::clock::Clock;
use crate::session::{AnswerOutcome, ExamSession, SubmitReason};

fn header_row(cells: &[&'static str]) -> Row<'static> {
    Row::new(cells.iter().map(|c| Cell::from(*c))).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

/// Rows that fit inside a bordered table with a header.
fn table_height(area: Rect) -> usize {
    area.height.saturating_sub(3) as usize
}

fn scroll_title(title: &str, offset: usize, shown: usize, total: usize, height: usize) -> String {
    if total > height {
        format!("{title} ({}/{} rows)", offset + shown, total)
    } else {
        title.to_string()
    }
}

fn answer_text(session: &ExamSession, question: usize, option: Option<usize>, width: usize) -> String {
    match option {
        None => "-".to_string(),
        Some(i) => {
            let text = session.exam().questions[question]
                .options
                .get(i)
                .map(String::as_str)
                .unwrap_or_default();
            truncate(&format!("{}. {text}", option_label(i)), width)
        }
    }
}

pub fn render_review<C: Clock>(app: &App<C>, session: &ExamSession, area: Rect, buf: &mut Buffer) {
    let [header, body, footer] = screen_chunks(area, 1);

    Paragraph::new(format!("Review: {}", session.exam().title))
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center)
        .render(header, buf);

    let review = session.review().unwrap_or_default();
    let height = table_height(body);
    // clamp here as well; the key handler does not know the table height
    let offset = app.scroll.min(review.len().saturating_sub(height));
    let answer_width = (body.width as usize).saturating_sub(6 + 12 + 4) / 3;
    let prompt_width = (body.width as usize).saturating_sub(6 + 12 + 4) - 2 * answer_width;

    let rows: Vec<Row> = review
        .iter()
        .skip(offset)
        .take(height)
        .map(|item| {
            let (label, color) = match item.outcome {
                AnswerOutcome::Correct => ("Correct", Color::Green),
                AnswerOutcome::Incorrect => ("Incorrect", Color::Red),
                AnswerOutcome::Unanswered => ("Unanswered", Color::DarkGray),
            };
            let index = item.number - 1;
            Row::new(vec![
                Cell::from(item.number.to_string()),
                Cell::from(truncate(&item.prompt, prompt_width)),
                Cell::from(answer_text(session, index, item.selected, answer_width)),
                Cell::from(answer_text(
                    session,
                    index,
                    Some(item.correct_option_index),
                    answer_width,
                )),
                Cell::from(label).style(Style::default().fg(color)),
            ])
        })
        .collect();

    let title = scroll_title("Answers", offset, rows.len(), review.len(), height);
    Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(prompt_width as u16),
            Constraint::Length(answer_width as u16),
            Constraint::Length(answer_width as u16),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["#", "Question", "Your answer", "Correct answer", "Result"]))
    .block(Block::default().borders(Borders::ALL).title(title))
    .render(body, buf);

    render_footer(app, "↑/↓ scroll · b back to results", footer, buf);
}

pub fn render_history<C: Clock>(app: &App<C>, area: Rect, buf: &mut Buffer) {
    let [header, body, footer] = screen_chunks(area, 1);

    Paragraph::new("Attempt History")
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center)
        .render(header, buf);

    if app.history_rows.is_empty() {
        let text = if app.attempt_log().is_some() {
            "No attempts recorded yet."
        } else {
            "History is unavailable."
        };
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL))
            .render(body, buf);
    } else {
        let height = table_height(body);
        let total = app.history_rows.len();
        let offset = app.scroll.min(total.saturating_sub(height));
        let exam_width = (body.width as usize).saturating_sub(18 + 7 + 9 + 12 + 7 + 8 + 8);

        let rows: Vec<Row> = app
            .history_rows
            .iter()
            .skip(offset)
            .take(height)
            .map(|r| {
                let result = if r.passed {
                    Cell::from("Passed").style(Style::default().fg(Color::Green))
                } else {
                    Cell::from("Failed").style(Style::default().fg(Color::Red))
                };
                let by = match r.submitted_by {
                    SubmitReason::Manual => "manual",
                    SubmitReason::TimeExpired => "timeout",
                };
                Row::new(vec![
                    Cell::from(r.finished_at.format("%Y-%m-%d %H:%M").to_string()),
                    Cell::from(truncate(&r.exam_title, exam_width)),
                    Cell::from(format!("{}%", r.score_percent)),
                    Cell::from(format!("{}/{}", r.correct_count, r.total_questions)),
                    result,
                    Cell::from(format_time(r.time_used_secs)),
                    Cell::from(by),
                ])
            })
            .collect();

        let title = scroll_title("Recent attempts", offset, rows.len(), total, height);
        Table::new(
            rows,
            [
                Constraint::Length(17),
                Constraint::Length(exam_width as u16),
                Constraint::Length(6),
                Constraint::Length(8),
                Constraint::Length(11),
                Constraint::Length(6),
                Constraint::Length(7),
            ],
        )
        .header(header_row(&[
            "Finished", "Exam", "Score", "Correct", "Result", "Time", "By",
        ]))
        .block(Block::default().borders(Borders::ALL).title(title))
        .render(body, buf);
    }

    render_footer(app, "↑/↓ scroll · b back", footer, buf);
}

#[cfg(test)]
mod tests {
    use crate::app::tests::app_with;
    use crate::app::AppState;
    use crate::ui::tests::{press, render};

    #[test]
    fn test_review_table() {
        let (mut app, _clock) = app_with(3, 60);
        app.start_exam("fixture");
        press(&mut app, 'a');
        press(&mut app, 'n');
        press(&mut app, 'c');
        press(&mut app, 's');
        press(&mut app, 'y');
        press(&mut app, 'v');
        assert_eq!(app.state, AppState::Review);

        let rendered = render(&app, 120, 24);

        assert!(rendered.contains("Review: Fixture Exam"));
        assert!(rendered.contains("Your answer"));
        assert!(rendered.contains("Correct "));
        assert!(rendered.contains("Incorrect"));
        assert!(rendered.contains("Unanswered"));
        assert!(rendered.contains("A. option 0"));
    }

    #[test]
    fn test_history_table() {
        let (mut app, _clock) = app_with(1, 60);
        app.start_exam("fixture");
        press(&mut app, 'a');
        press(&mut app, 's');
        press(&mut app, 'h');
        assert_eq!(app.state, AppState::History);

        let rendered = render(&app, 120, 24);

        assert!(rendered.contains("Attempt History"));
        assert!(rendered.contains("Fixture Exam"));
        assert!(rendered.contains("100%"));
        assert!(rendered.contains("1/1"));
        assert!(rendered.contains("Passed"));
        assert!(rendered.contains("manual"));
    }

    #[test]
    fn test_empty_history() {
        let (mut app, _clock) = app_with(1, 60);
        press(&mut app, 'h');

        assert!(render(&app, 100, 24).contains("No attempts recorded yet."));
    }
}
