use chrono::{Local, NaiveDate};

/// Source of the calendar date that drives the once-per-day refresh cadence.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
