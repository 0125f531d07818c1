use chrono::{Local, NaiveDate, Utc};
use std::cell::Cell;
use std::rc::Rc;

use crate::session::Millis;

/// Source of "today" for streaks and daily stats, and of keystroke timestamps.
pub trait Clock {
    fn today(&self) -> NaiveDate;
    fn now_ms(&self) -> Millis;
}

/// Wall clock; calendar days follow the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_ms(&self) -> Millis {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Hand-driven clock. Clones share the same time, so a test can keep one
/// handle and move the day forward under a store that owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    today: Rc<Cell<NaiveDate>>,
    now_ms: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Rc::new(Cell::new(today)),
            now_ms: Rc::new(Cell::new(0)),
        }
    }

    pub fn set_today(&self, today: NaiveDate) {
        self.today.set(today);
    }

    pub fn advance_days(&self, days: i64) {
        let next = self.today.get() + chrono::Duration::days(days);
        self.today.set(next);
    }

    pub fn set_now_ms(&self, now: Millis) {
        self.now_ms.set(now);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        self.today.get()
    }

    fn now_ms(&self) -> Millis {
        self.now_ms.get()
    }
}
