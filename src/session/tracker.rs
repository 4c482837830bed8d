use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, trace};

use super::{BarSample, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarOutcome {
    BoundaryCrossed,
    NoOp,
}

/// Detects when the most recent bar steps over one of the configured
/// session boundaries.
#[derive(Debug, Clone)]
pub struct SessionBoundaryTracker {
    events: Vec<SessionEvent>,
    display: Tz,
    previous_bar: Option<DateTime<Utc>>,
}

impl SessionBoundaryTracker {
    pub fn new(events: Vec<SessionEvent>, display: Tz) -> Self {
        SessionBoundaryTracker {
            events,
            display,
            previous_bar: None,
        }
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn display_zone(&self) -> Tz {
        self.display
    }

    pub fn previous_bar(&self) -> Option<DateTime<Utc>> {
        self.previous_bar
    }

    /// Sets the reference bar without evaluating it, used once the history
    /// has been scanned on attach.
    pub fn seed(&mut self, instant: DateTime<Utc>) {
        self.previous_bar = Some(instant);
    }

    pub fn reset(&mut self) {
        self.previous_bar = None;
    }

    /// Only the first tick of the last bar on the chart is evaluated; other
    /// samples leave the tracker untouched.
    pub fn on_bar(&mut self, sample: &BarSample) -> BarOutcome {
        if !sample.is_evaluated() {
            return BarOutcome::NoOp;
        }

        let current = sample.timestamp.with_timezone(&Utc);
        let previous = self.previous_bar.replace(current);

        let Some(previous) = previous else {
            trace!("First evaluated bar at {}, nothing to compare", current);
            return BarOutcome::NoOp;
        };

        let date = sample.timestamp.date_naive();
        let crossed = self.events.iter().find(|event| {
            let boundary = event.boundary_on(date, self.display).with_timezone(&Utc);
            previous < boundary && boundary <= current
        });

        match crossed {
            Some(event) => {
                debug!("Bar at {} crossed session event '{}'", sample.timestamp, event.name);
                BarOutcome::BoundaryCrossed
            }
            None => BarOutcome::NoOp,
        }
    }
}
