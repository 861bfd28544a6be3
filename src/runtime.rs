use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum ExamEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<ExamEvent, RecvTimeoutError>;
}

/// Production event source reading crossterm events on a helper thread
pub struct CrosstermEventSource {
    rx: Receiver<ExamEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                // Windows reports releases as well as presses.
                Ok(CtEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                    tx.send(ExamEvent::Key(key))
                }
                Ok(CtEvent::Resize(_, _)) => tx.send(ExamEvent::Resize),
                Ok(_) => Ok(()),
                Err(err) => {
                    tracing::error!(error = %err, "terminal event read failed");
                    break;
                }
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ExamEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Redraw interval provider
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms.max(1)))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-fed event source for tests
pub struct TestEventSource {
    rx: Receiver<ExamEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<ExamEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ExamEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Advances the application one event at a time.
///
/// A `Tick` only means "nothing arrived within one interval"; the exam
/// countdown is measured by [`crate::clock::Countdown`], not by counting these.
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to one tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> ExamEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) => ExamEvent::Tick,
            // the reader thread is gone; keep the clock moving without spinning
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(self.ticker.interval());
                ExamEvent::Tick
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};

    #[test]
    fn test_step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(1)));

        assert!(matches!(runner.step(), ExamEvent::Tick));
    }

    #[test]
    fn test_step_passes_through_keys() {
        let (tx, rx) = mpsc::channel();
        tx.send(ExamEvent::Key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::NONE)))
            .unwrap();
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::from_millis(10));

        match runner.step() {
            ExamEvent::Key(k) => assert_eq!(k.code, KeyCode::Char('s')),
            other => panic!("expected key event, got {other:?}"),
        }
    }

    #[test]
    fn test_disconnected_source_degrades_to_tick() {
        let (tx, rx) = mpsc::channel::<ExamEvent>();
        drop(tx);
        let runner = Runner::new(TestEventSource::new(rx), FixedTicker::from_millis(0));

        assert!(matches!(runner.step(), ExamEvent::Tick));
    }
}
