//! Daily outbound call budget.
//!
//! A token bucket that refills once per UTC day: up to `daily_limit`
//! calls are admitted per UTC date, after which every request is denied
//! until the date advances. The counter is never decremented.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

/// Proof that one outbound call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    pub day: NaiveDate,
    /// Position of this call in the day, starting at 1.
    pub sequence: u32,
}

/// Budget exhausted for the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denied {
    pub day: NaiveDate,
    pub used: u32,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct RateBudget {
    daily_limit: u32,
    day: NaiveDate,
    count: u32,
}

impl RateBudget {
    /// A fresh budget for today.
    pub fn new(daily_limit: u32) -> Self {
        Self::resume(daily_limit, Utc::now().date_naive(), 0)
    }

    /// Restore a counter persisted earlier for `day`.
    pub fn resume(daily_limit: u32, day: NaiveDate, count: u32) -> Self {
        Self {
            daily_limit,
            day,
            count,
        }
    }

    pub fn admit(&mut self) -> Result<Permit, Denied> {
        self.admit_at(Utc::now())
    }

    /// Admit one call at time `now`.
    pub fn admit_at(&mut self, now: DateTime<Utc>) -> Result<Permit, Denied> {
        let today = now.date_naive();
        if today != self.day {
            info!(previous = %self.day, used = self.count, day = %today, "Call budget rolled over");
            self.day = today;
            self.count = 0;
        }

        if self.count >= self.daily_limit {
            return Err(Denied {
                day: self.day,
                used: self.count,
                limit: self.daily_limit,
            });
        }

        self.count += 1;
        debug!(day = %self.day, used = self.count, limit = self.daily_limit, "Call admitted");
        Ok(Permit {
            day: self.day,
            sequence: self.count,
        })
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Calls admitted on the current day.
    pub fn used(&self) -> u32 {
        self.count
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.count)
    }
}
