use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::session::{ExamSession, Tick};

pub const SESSION_TICK: Duration = Duration::from_secs(1);

/// Source of the current instant. Lets the countdown run on a fake clock in tests.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Turns elapsed clock time into whole-period session ticks.
#[derive(Debug)]
pub struct Countdown<C: Clock> {
    clock: C,
    period: Duration,
    anchor: Instant,
}

impl<C: Clock> Countdown<C> {
    pub fn new(clock: C) -> Self {
        Self::with_period(clock, SESSION_TICK)
    }

    pub fn with_period(clock: C, period: Duration) -> Self {
        let anchor = clock.now();
        Self {
            clock,
            period,
            anchor,
        }
    }

    /// Re-anchors at the current instant, dropping any partial period.
    pub fn restart(&mut self) {
        self.anchor = self.clock.now();
    }

    /// Number of whole periods since the last call. The remainder carries over.
    pub fn due(&mut self) -> u32 {
        let elapsed = self.clock.now().saturating_duration_since(self.anchor);
        let periods = (elapsed.as_nanos() / self.period.as_nanos().max(1)) as u32;
        self.anchor += self.period * periods;
        periods
    }

    /// Applies every due tick to the session, stopping once it is submitted.
    pub fn drive(&mut self, session: &mut ExamSession) -> Tick {
        let mut last = Tick::Ignored;
        for _ in 0..self.due() {
            last = session.tick();
            if !matches!(last, Tick::Counting(_)) {
                break;
            }
        }
        last
    }
}
