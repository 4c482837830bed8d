use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::config::{AnnotationOptions, IndicatorType};
use crate::{
    calendar::CalendarCache,
    draw::Canvas,
    session::{BarSample, PricedBar},
};

pub mod cash_session_levels;
pub mod clock;
pub mod economic_calendar;
pub mod session_open;

/// What an indicator sees of the chart on a callback. `bars` ends with the
/// bar of `sample`.
#[derive(Debug, Clone, Copy)]
pub struct ChartContext<'a> {
    pub bars: &'a [PricedBar],
    pub sample: BarSample,
    pub now: DateTime<Utc>,
}

impl ChartContext<'_> {
    /// Enough history to plot, mirroring a host's "bars required to plot".
    pub fn has_enough_bars(&self, required: usize) -> bool {
        self.bars.len() > required
    }
}

#[async_trait]
pub trait Indicator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once, after the first batch of history has been loaded.
    async fn on_history_loaded(&mut self, _chart: &ChartContext<'_>, _canvas: &mut dyn Canvas) {}

    async fn on_bar(&mut self, chart: &ChartContext<'_>, canvas: &mut dyn Canvas);
}

pub fn build_indicator(
    options: &AnnotationOptions,
    calendar: Arc<CalendarCache>,
) -> Box<dyn Indicator> {
    match options.indicator_type {
        IndicatorType::SessionOpen => Box::new(session_open::SessionOpen::from_options(options)),
        IndicatorType::CashSessionLevels => {
            Box::new(cash_session_levels::CashSessionLevels::from_options(options))
        }
        IndicatorType::Clock => Box::new(clock::Clock::from_options(options)),
        IndicatorType::EconomicCalendar => Box::new(
            economic_calendar::EconomicCalendar::from_options(options, calendar),
        ),
    }
}
