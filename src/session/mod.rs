//! Session boundary bookkeeping shared by the session indicators.

use chrono::{DateTime, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timezone::convert_to_display_timezone;

pub mod levels;
pub mod tracker;

pub use levels::{recompute_levels, render_levels, LevelStyle, PriceLevel, TransparencyTiers};
pub use tracker::{BarOutcome, SessionBoundaryTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelRole {
    Open,
    Close,
}

impl fmt::Display for LevelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelRole::Open => f.write_str("open"),
            LevelRole::Close => f.write_str("close"),
        }
    }
}

/// A recurring time of day anchored to a zone, e.g. 09:30 in New York.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub name: String,
    pub time_of_day: NaiveTime,
    pub zone: Tz,
    pub role: LevelRole,
}

impl SessionEvent {
    pub fn new(name: impl Into<String>, time_of_day: NaiveTime, zone: Tz, role: LevelRole) -> Self {
        SessionEvent {
            name: name.into(),
            time_of_day,
            zone,
            role,
        }
    }

    /// The event's instant on `date` (a calendar date in the event's zone),
    /// expressed in `display`.
    pub fn boundary_on(&self, date: NaiveDate, display: Tz) -> DateTime<Tz> {
        convert_to_display_timezone(self.time_of_day, self.zone, date, display)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarSample {
    pub timestamp: DateTime<Tz>,
    pub is_first_tick_of_bar: bool,
    pub is_last_bar_on_chart: bool,
}

impl BarSample {
    pub fn is_evaluated(&self) -> bool {
        self.is_first_tick_of_bar && self.is_last_bar_on_chart
    }
}

/// A closed bar of the chart history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedBar {
    pub timestamp: DateTime<Tz>,
    pub close: f64,
}
