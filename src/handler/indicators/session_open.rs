use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use super::{ChartContext, Indicator};
use crate::{
    draw::{Canvas, DrawKind, LineSpec},
    handler::config::AnnotationOptions,
    session::{LevelRole, SessionEvent},
    timezone::{resolve_zone, ZonePair},
};

/// Vertical lines at the US and EU session opens of the current day.
pub struct SessionOpen {
    events: Vec<SessionEvent>,
    chart: Tz,
    line: LineSpec,
    bars_required: usize,
    last_processed_date: Option<NaiveDate>,
    last_update: Option<DateTime<Utc>>,
}

impl SessionOpen {
    pub fn new(events: Vec<SessionEvent>, chart: Tz, line: LineSpec, bars_required: usize) -> Self {
        SessionOpen {
            events,
            chart,
            line,
            bars_required,
            last_processed_date: None,
            last_update: None,
        }
    }

    pub fn from_options(options: &AnnotationOptions) -> Self {
        let o = &options.session_open;
        let zones = (
            resolve_zone(&options.chart_timezone),
            resolve_zone(&o.us_timezone),
            resolve_zone(&o.eu_timezone),
        );
        let (chart, us, eu) = match zones {
            (Ok(chart), Ok(us), Ok(eu)) => (chart, us, eu),
            (chart, us, eu) => {
                let e = chart.err().or(us.err()).or(eu.err());
                warn!("Error initializing time zones: {:?}; using defaults", e);
                let defaults = ZonePair::default();
                (defaults.chart, defaults.session, chrono_tz::Europe::London)
            }
        };

        Self::new(
            vec![
                SessionEvent::new("US", o.us_open, us, LevelRole::Open),
                SessionEvent::new("EU", o.eu_open, eu, LevelRole::Open),
            ],
            chart,
            o.line,
            options.bars_required_to_plot,
        )
    }

    fn tag(event: &SessionEvent, date: NaiveDate) -> String {
        format!("SessionOpenTime_{}_{}", event.name, date.format("%Y%m%d"))
    }

    fn draw_missing_lines(&self, date: NaiveDate, canvas: &mut dyn Canvas) {
        for event in &self.events {
            let tag = Self::tag(event, date);
            if canvas.contains(&tag) {
                continue;
            }
            let at = event.boundary_on(date, self.chart);
            debug!("Drawing session open '{}' at {}", event.name, at);
            let kind = DrawKind::VerticalLine {
                at: at.with_timezone(&Utc),
            };
            canvas.draw(self.line.command(tag, kind));
        }
    }
}

#[async_trait]
impl Indicator for SessionOpen {
    fn name(&self) -> &'static str {
        "session_open"
    }

    async fn on_bar(&mut self, chart: &ChartContext<'_>, canvas: &mut dyn Canvas) {
        if !chart.sample.is_evaluated() || !chart.has_enough_bars(self.bars_required) {
            return;
        }

        let date = chart.sample.timestamp.date_naive();
        let hour_passed = self
            .last_update
            .map_or(true, |at| chart.now - at >= Duration::hours(1));

        if hour_passed || self.last_processed_date != Some(date) {
            self.draw_missing_lines(date, canvas);
            self.last_processed_date = Some(date);
            self.last_update = Some(chart.now);
        }
    }
}
