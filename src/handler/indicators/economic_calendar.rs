use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

use super::{ChartContext, Indicator};
use crate::{
    calendar::{CalendarCache, CalendarEvent, CalendarFilter, CalendarSnapshot},
    draw::{Canvas, DrawKind, LineSpec},
    handler::config::{AnnotationOptions, CalendarOptions},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpactOpacity {
    pub high: u8,
    pub medium: u8,
    pub low: u8,
}

impl ImpactOpacity {
    pub fn for_impact(&self, impact: &str) -> u8 {
        match impact.trim().to_lowercase().as_str() {
            "high" => self.high,
            "medium" => self.medium,
            _ => self.low,
        }
    }
}

/// Vertical lines at today's economic releases.
pub struct EconomicCalendar {
    cache: Arc<CalendarCache>,
    filter: CalendarFilter,
    line: LineSpec,
    opacity: ImpactOpacity,
    bars_required: usize,
    drawn_generation: Option<u64>,
    last_drawn_date: Option<NaiveDate>,
}

impl EconomicCalendar {
    pub fn from_options(options: &AnnotationOptions, cache: Arc<CalendarCache>) -> Self {
        let o: &CalendarOptions = &options.calendar;
        EconomicCalendar {
            cache,
            filter: CalendarFilter::new(&o.currencies, &o.impacts),
            line: LineSpec {
                color: o.color,
                opacity: o.opacity_low,
                style: o.line_style,
                thickness: o.thickness,
            },
            opacity: ImpactOpacity {
                high: o.opacity_high,
                medium: o.opacity_medium,
                low: o.opacity_low,
            },
            bars_required: options.bars_required_to_plot,
            drawn_generation: None,
            last_drawn_date: None,
        }
    }

    pub fn tag(event: &CalendarEvent) -> String {
        format!(
            "DataRelease_{}_{}: {} {}",
            event.impact,
            event.country,
            event.title,
            event.at.format("%Y-%m-%d %H:%M")
        )
    }

    fn draw_events_for(
        &mut self,
        today: NaiveDate,
        snapshot: &CalendarSnapshot,
        canvas: &mut dyn Canvas,
    ) {
        canvas.clear();

        let todays = snapshot
            .events
            .iter()
            .filter(|e| e.at.date_naive() == today && self.filter.matches(e));
        for event in todays {
            let kind = DrawKind::VerticalLine { at: event.at };
            let mut command = self.line.command(Self::tag(event), kind);
            command.opacity = self.opacity.for_impact(&event.impact);
            debug!("Drawing release '{}'", command.tag);
            canvas.draw(command);
        }

        self.drawn_generation = Some(snapshot.generation);
        self.last_drawn_date = Some(today);
    }
}

#[async_trait]
impl Indicator for EconomicCalendar {
    fn name(&self) -> &'static str {
        "economic_calendar"
    }

    async fn on_bar(&mut self, chart: &ChartContext<'_>, canvas: &mut dyn Canvas) {
        if !chart.sample.is_evaluated() || !chart.has_enough_bars(self.bars_required) {
            return;
        }

        let snapshot = self.cache.get(chart.now).await;
        let today = chart.now.date_naive();
        if self.drawn_generation != Some(snapshot.generation)
            || self.last_drawn_date != Some(today)
        {
            self.draw_events_for(today, &snapshot, canvas);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calendar::tests::{CountingSource, SAMPLE},
        draw::AnnotationCanvas,
        handler::indicators::test_support::{bars, last_bar_context},
    };
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(currencies: &str) -> (EconomicCalendar, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(CalendarCache::hourly(Box::new(CountingSource {
            body: Some(SAMPLE.to_string()),
            calls: calls.clone(),
        })));
        let mut options = AnnotationOptions {
            bars_required_to_plot: 0,
            ..AnnotationOptions::default()
        };
        options.calendar.currencies = currencies.to_string();
        (EconomicCalendar::from_options(&options, cache), calls)
    }

    #[async_std::test]
    async fn draws_filtered_releases_of_today() {
        let (mut ec, calls) = setup("USD EUR CAD");
        let mut canvas = AnnotationCanvas::new();
        let history = bars(chrono_tz::UTC, (2024, 7, 5, 6, 0), 2, 5);
        let now = Utc.with_ymd_and_hms(2024, 7, 5, 6, 10, 0).unwrap();

        ec.on_bar(&last_bar_context(&history, now), &mut canvas).await;

        assert_eq!(canvas.len(), 3);
        let nfp = canvas
            .get("DataRelease_High_USD: Non-Farm Employment Change 2024-07-05 12:30")
            .unwrap();
        assert_eq!(nfp.opacity, 75);
        assert_eq!(
            nfp.kind,
            DrawKind::VerticalLine {
                at: Utc.with_ymd_and_hms(2024, 7, 5, 12, 30, 0).unwrap()
            }
        );
        let trade = canvas
            .get("DataRelease_Medium_CAD: Trade Balance, revised 2024-07-05 12:30")
            .unwrap();
        assert_eq!(trade.opacity, 50);

        // Within the hour and on the same day nothing is redrawn.
        canvas.drain_issued();
        ec.on_bar(&last_bar_context(&history, now + Duration::minutes(30)), &mut canvas).await;
        assert!(canvas.drain_issued().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[async_std::test]
    async fn redraws_for_a_new_day() {
        let (mut ec, _) = setup("AUD USD");
        let mut canvas = AnnotationCanvas::new();
        let history = bars(chrono_tz::UTC, (2024, 7, 5, 23, 0), 2, 5);
        let now = Utc.with_ymd_and_hms(2024, 7, 5, 23, 40, 0).unwrap();

        ec.on_bar(&last_bar_context(&history, now), &mut canvas).await;
        let nfp = "DataRelease_High_USD: Non-Farm Employment Change 2024-07-05 12:30";
        assert!(canvas.contains(nfp));

        ec.on_bar(&last_bar_context(&history, now + Duration::minutes(30)), &mut canvas).await;
        assert_eq!(canvas.len(), 1);
        assert!(canvas.contains("DataRelease_Low_AUD: Retail Sales 2024-07-06 01:30"));
    }

    #[test]
    fn unknown_impact_gets_low_opacity() {
        let o = ImpactOpacity {
            high: 75,
            medium: 50,
            low: 25,
        };
        assert_eq!(o.for_impact(" HIGH "), 75);
        assert_eq!(o.for_impact("Holiday"), 25);
    }
}
