//! Calendar clock abstraction.
//!
//! Circulation rules only look at calendar dates, never wall-clock time.
//! Services read "today" through [`Clock`] so tests and replays can pin it.

use chrono::{Local, NaiveDate};
use std::cell::Cell;

pub trait Clock {
    /// Current calendar date.
    fn today(&self) -> NaiveDate;
}

/// Local-time system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Clone)]
pub struct FixedClock {
    today: Cell<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Cell::new(today),
        }
    }

    /// Moves the clock to `today`.
    pub fn set(&self, today: NaiveDate) {
        self.today.set(today);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}
