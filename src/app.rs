//! Screen state and key handling for the terminal front end.
//!
//! `App` owns the current [`ExamSession`] and the [`Countdown`] that drives it.
//! The event loop calls [`App::on_tick`] on every wake-up and
//! [`App::on_key`] for key presses; rendering lives in `ui`.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::catalog::ExamCatalog;
use crate::clock::{Clock, Countdown, SystemClock};
use crate::config::Config;
use crate::exam::ExamSummary;
use crate::history::{AttemptLog, AttemptRecord};
use crate::profile::Profile;
use crate::session::{Direction, ExamSession, SessionError, Tick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    ExamList,
    Taking,
    ConfirmSubmit,
    Results,
    Review,
    History,
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct App<C: Clock = SystemClock> {
    pub state: AppState,
    pub exams: Vec<ExamSummary>,
    pub selected: usize,
    pub session: Option<ExamSession>,
    pub profile: Option<Profile>,
    pub config: Config,
    pub history_rows: Vec<AttemptRecord>,
    /// Scroll position shared by the review and history tables.
    pub scroll: usize,
    pub status: Option<String>,
    catalog: Box<dyn ExamCatalog>,
    attempt_log: Option<AttemptLog>,
    countdown: Countdown<C>,
    recorded: bool,
    history_return: AppState,
}

/// Maps `1`-`9` and `a`-`i` to zero-based option positions.
pub fn option_for_key(c: char) -> Option<usize> {
    match c {
        '1'..='9' => Some(c as usize - '1' as usize),
        'a'..='i' => Some(c as usize - 'a' as usize),
        _ => None,
    }
}

impl<C: Clock> App<C> {
    pub fn new(catalog: Box<dyn ExamCatalog>, clock: C, config: Config) -> Self {
        let mut app = Self {
            state: AppState::ExamList,
            exams: Vec::new(),
            selected: 0,
            session: None,
            profile: None,
            config,
            history_rows: Vec::new(),
            scroll: 0,
            status: None,
            catalog,
            attempt_log: None,
            countdown: Countdown::new(clock),
            recorded: false,
            history_return: AppState::ExamList,
        };
        app.refresh_exams();
        app
    }

    pub fn with_profile(mut self, profile: Option<Profile>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_attempt_log(mut self, log: AttemptLog) -> Self {
        self.attempt_log = Some(log);
        self
    }

    pub fn attempt_log(&self) -> Option<&AttemptLog> {
        self.attempt_log.as_ref()
    }

    pub fn refresh_exams(&mut self) {
        match self.catalog.list() {
            Ok(exams) => {
                self.exams = exams;
                self.selected = self.selected.min(self.exams.len().saturating_sub(1));
            }
            Err(e) => {
                tracing::error!(error = %e, "could not list exams");
                self.status = Some(format!("Could not load exams: {e}"));
            }
        }
    }

    pub fn selected_exam(&self) -> Option<&ExamSummary> {
        self.exams.get(self.selected)
    }

    /// Loads `id` from the catalog and begins a fresh attempt.
    pub fn start_exam(&mut self, id: &str) -> bool {
        let exam = match self.catalog.load_exam(id) {
            Ok(exam) => exam,
            Err(e) => {
                tracing::warn!(exam_id = %id, error = %e, "exam could not be loaded");
                self.status = Some(e.to_string());
                return false;
            }
        };
        match ExamSession::start(exam.into()) {
            Ok(session) => {
                self.begin(session);
                true
            }
            Err(e) => {
                self.status = Some(format!("Cannot start '{id}': {e}"));
                false
            }
        }
    }

    fn begin(&mut self, session: ExamSession) {
        self.session = Some(session);
        self.recorded = false;
        self.scroll = 0;
        self.countdown.restart();
        self.state = AppState::Taking;
    }

    /// Feeds elapsed wall time into the running session. Returns true when the
    /// attempt ran out of time during this call.
    pub fn on_tick(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.is_in_progress() {
            return false;
        }
        match self.countdown.drive(session) {
            Tick::Expired => {
                self.finish();
                true
            }
            Tick::Counting(_) | Tick::Ignored => false,
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Control {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Control::Quit;
        }
        self.status = None;

        match self.state {
            AppState::ExamList => return self.on_list_key(key.code),
            AppState::Taking => self.on_taking_key(key.code),
            AppState::ConfirmSubmit => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => self.submit_now(),
                KeyCode::Char('n') | KeyCode::Esc => self.state = AppState::Taking,
                _ => {}
            },
            AppState::Results => return self.on_results_key(key.code),
            AppState::Review | AppState::History => match key.code {
                KeyCode::Up | KeyCode::Char('k') => self.scroll = self.scroll.saturating_sub(1),
                KeyCode::Down | KeyCode::Char('j') => {
                    self.scroll = (self.scroll + 1).min(self.scroll_rows().saturating_sub(1));
                }
                KeyCode::Esc | KeyCode::Char('b') | KeyCode::Char('q') => {
                    self.scroll = 0;
                    self.state = if self.state == AppState::Review {
                        AppState::Results
                    } else {
                        self.history_return
                    };
                }
                _ => {}
            },
        }
        Control::Continue
    }

    /// Rows in the table shown on the current screen.
    fn scroll_rows(&self) -> usize {
        match self.state {
            AppState::Review => self.session.as_ref().map_or(0, |s| s.exam().questions.len()),
            AppState::History => self.history_rows.len(),
            _ => 0,
        }
    }

    fn on_list_key(&mut self, code: KeyCode) -> Control {
        match code {
            KeyCode::Esc | KeyCode::Char('q') => return Control::Quit,
            KeyCode::Up | KeyCode::Char('k') => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.exams.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(id) = self.selected_exam().map(|e| e.id.clone()) {
                    self.start_exam(&id);
                }
            }
            KeyCode::Char('h') => self.show_history(None),
            KeyCode::Char('r') => self.refresh_exams(),
            _ => {}
        }
        Control::Continue
    }

    fn on_taking_key(&mut self, code: KeyCode) {
        let Some(session) = self.session.as_mut() else {
            self.state = AppState::ExamList;
            return;
        };

        let choice = match code {
            KeyCode::Char(c) => option_for_key(c),
            _ => None,
        };

        let outcome = match (code, choice) {
            (_, Some(index)) => session.select_answer(index),
            (KeyCode::Left | KeyCode::Char('p'), _) => session.go_to(Direction::Previous),
            (KeyCode::Right | KeyCode::Char('n'), _) => session.go_to(Direction::Next),
            (KeyCode::Char('x'), _) => session.clear_answer(),
            (KeyCode::Char('s'), _) => {
                if self.config.confirm_incomplete_submit && session.unanswered_count() > 0 {
                    self.state = AppState::ConfirmSubmit;
                } else {
                    self.submit_now();
                }
                Ok(())
            }
            (KeyCode::Esc, _) => {
                tracing::info!(exam_id = %session.exam().id, "attempt abandoned");
                self.session = None;
                self.state = AppState::ExamList;
                self.status = Some("Attempt abandoned.".to_string());
                Ok(())
            }
            _ => Ok(()),
        };

        match outcome {
            Ok(()) => {}
            Err(SessionError::InvalidInput { option_index, .. }) => {
                self.status = Some(format!("There is no option {}.", option_index + 1));
            }
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    fn on_results_key(&mut self, code: KeyCode) -> Control {
        match code {
            KeyCode::Esc | KeyCode::Char('q') => return Control::Quit,
            KeyCode::Char('r') => {
                if let Some(next) = self.session.as_ref().map(ExamSession::retry) {
                    self.begin(next);
                }
            }
            KeyCode::Char('v') => {
                self.scroll = 0;
                self.state = AppState::Review;
            }
            KeyCode::Char('h') => {
                let exam_id = self.session.as_ref().map(|s| s.exam().id.clone());
                self.show_history(exam_id);
            }
            KeyCode::Char('b') => {
                self.session = None;
                self.state = AppState::ExamList;
            }
            _ => {}
        }
        Control::Continue
    }

    fn submit_now(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.submit();
        }
        self.finish();
    }

    /// Moves a submitted session to the results screen, recording it once.
    fn finish(&mut self) {
        self.state = AppState::Results;
        self.scroll = 0;
        if self.recorded {
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let email = self.profile.as_ref().map(|p| p.email.as_str());
        let Some(record) = AttemptRecord::from_session(session, email) else {
            return;
        };
        self.recorded = true;

        if let Some(log) = self.attempt_log.as_ref() {
            if let Err(e) = log.record(&record) {
                tracing::error!(error = %e, "failed to record attempt");
                self.status = Some(format!("Attempt not saved to history: {e}"));
            }
        }
    }

    fn show_history(&mut self, exam_id: Option<String>) {
        self.history_return = self.state;
        self.scroll = 0;
        self.state = AppState::History;

        let limit = self.config.history_limit;
        let rows = match (self.attempt_log.as_ref(), exam_id.as_deref()) {
            (None, _) => Ok(Vec::new()),
            (Some(log), Some(id)) => log.for_exam(id, limit),
            (Some(log), None) => log.recent(limit),
        };
        match rows {
            Ok(rows) => self.history_rows = rows,
            Err(e) => {
                tracing::error!(error = %e, "failed to read history");
                self.history_rows.clear();
                self.status = Some(format!("Could not read history: {e}"));
            }
        }
    }
}
