use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::{ChartContext, Indicator};
use crate::{
    draw::Canvas,
    handler::config::AnnotationOptions,
    session::{
        recompute_levels, render_levels, BarOutcome, LevelRole, LevelStyle, PriceLevel, PricedBar,
        SessionBoundaryTracker, SessionEvent,
    },
    timezone::ZonePair,
};

/// Horizontal lines at the closes of the bars stamped at the cash session
/// open and close, for the last few sessions.
pub struct CashSessionLevels {
    tracker: SessionBoundaryTracker,
    style: LevelStyle,
    retention: usize,
    bars_required: usize,
    levels: Vec<PriceLevel>,
    drawn: BTreeSet<String>,
}

impl CashSessionLevels {
    pub fn new(
        tracker: SessionBoundaryTracker,
        style: LevelStyle,
        retention: usize,
        bars_required: usize,
    ) -> Self {
        CashSessionLevels {
            tracker,
            style,
            retention,
            bars_required,
            levels: Vec::new(),
            drawn: BTreeSet::new(),
        }
    }

    pub fn from_options(options: &AnnotationOptions) -> Self {
        let o = &options.cash_levels;
        let zones = ZonePair::resolve_or_default(&o.session_timezone, &options.chart_timezone);
        let events = vec![
            SessionEvent::new("open", o.open, zones.session, LevelRole::Open),
            SessionEvent::new("close", o.close, zones.session, LevelRole::Close),
        ];

        Self::new(
            SessionBoundaryTracker::new(events, zones.chart),
            o.style.clone(),
            o.retention,
            options.bars_required_to_plot,
        )
    }

    pub fn levels(&self) -> &[PriceLevel] {
        &self.levels
    }

    /// Rebuilds the levels from the whole history and redraws them. Lines of
    /// levels that fell out of the retained set are removed.
    fn refresh(&mut self, bars: &[PricedBar], canvas: &mut dyn Canvas) {
        self.levels.clear();
        if bars.len() > self.bars_required {
            self.levels = recompute_levels(
                bars,
                self.tracker.events(),
                self.tracker.display_zone(),
                self.retention,
            );
        }
        debug!("Recomputed {} price levels: {:?}", self.levels.len(), self.levels);

        let commands = render_levels(&self.levels, &self.style);
        let current: BTreeSet<String> = commands.iter().map(|c| c.tag.clone()).collect();
        for stale in self.drawn.difference(&current) {
            canvas.remove(stale);
        }
        for command in commands {
            canvas.draw(command);
        }
        self.drawn = current;
    }
}

#[async_trait]
impl Indicator for CashSessionLevels {
    fn name(&self) -> &'static str {
        "cash_session_levels"
    }

    async fn on_history_loaded(&mut self, chart: &ChartContext<'_>, canvas: &mut dyn Canvas) {
        self.refresh(chart.bars, canvas);
        if let Some(last) = chart.bars.last() {
            self.tracker.seed(last.timestamp.with_timezone(&Utc));
        }
        info!("Loaded {} bars, drawing {} levels", chart.bars.len(), self.levels.len());
    }

    async fn on_bar(&mut self, chart: &ChartContext<'_>, canvas: &mut dyn Canvas) {
        if self.tracker.on_bar(&chart.sample) == BarOutcome::BoundaryCrossed {
            self.refresh(chart.bars, canvas);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        draw::{AnnotationCanvas, DrawKind, Issued},
        handler::indicators::test_support::{bars, last_bar_context},
    };
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Europe::Warsaw;

    fn indicator() -> CashSessionLevels {
        let options = AnnotationOptions {
            bars_required_to_plot: 0,
            ..AnnotationOptions::default()
        };
        CashSessionLevels::from_options(&options)
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 20, 0, 0, 0).unwrap()
    }

    #[async_std::test]
    async fn history_load_draws_and_seeds() {
        let mut csl = indicator();
        let mut canvas = AnnotationCanvas::new();
        // 15:00 to 22:30 Warsaw, the whole New York cash session.
        let history = bars(Warsaw, (2024, 7, 15, 15, 0), 16, 30);

        csl.on_history_loaded(&last_bar_context(&history, now()), &mut canvas).await;

        assert_eq!(csl.levels().len(), 2);
        let open = canvas.get("SessionOpenLevel_20240715").unwrap();
        assert_eq!(open.kind, DrawKind::HorizontalLine { price: 101.0 });
        let close = canvas.get("SessionCloseLevel_20240715").unwrap();
        assert_eq!(close.kind, DrawKind::HorizontalLine { price: 114.0 });

        // Seeded with the last bar, so the same bar does not retrigger.
        canvas.drain_issued();
        csl.on_bar(&last_bar_context(&history, now()), &mut canvas).await;
        assert!(canvas.drain_issued().is_empty());
    }

    #[async_std::test]
    async fn crossing_recomputes_and_drops_old_levels() {
        let mut csl = CashSessionLevels {
            retention: 2,
            ..indicator()
        };
        let mut canvas = AnnotationCanvas::new();
        let day_one = bars(Warsaw, (2024, 7, 15, 15, 0), 16, 30);
        csl.on_history_loaded(&last_bar_context(&day_one, now()), &mut canvas).await;

        let mut history = day_one.clone();
        history.extend(bars(Warsaw, (2024, 7, 16, 15, 0), 2, 30));
        let ctx = last_bar_context(&history, now());
        assert_eq!(ctx.sample.timestamp, Warsaw.with_ymd_and_hms(2024, 7, 16, 15, 30, 0).unwrap());

        canvas.drain_issued();
        csl.on_bar(&ctx, &mut canvas).await;

        let dates: Vec<NaiveDate> = csl.levels().iter().map(|l| l.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 7, 16).unwrap(),
                NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
            ]
        );
        // The close of 07-15 is newer than its open, so the open drops out.
        assert!(canvas.contains("SessionOpenLevel_20240716"));
        assert!(canvas.contains("SessionCloseLevel_20240715"));
        assert!(!canvas.contains("SessionOpenLevel_20240715"));
        assert_eq!(canvas.get("SessionCloseLevel_20240715").unwrap().opacity, 100);

        let issued = canvas.drain_issued();
        assert_eq!(issued[0], Issued::Remove("SessionOpenLevel_20240715".to_string()));
        assert_eq!(issued.len(), 3);
    }

    #[async_std::test]
    async fn not_enough_history_draws_nothing() {
        let options = AnnotationOptions {
            bars_required_to_plot: 50,
            ..AnnotationOptions::default()
        };
        let mut csl = CashSessionLevels::from_options(&options);
        let mut canvas = AnnotationCanvas::new();
        let history = bars(Warsaw, (2024, 7, 15, 15, 0), 16, 30);

        csl.on_history_loaded(&last_bar_context(&history, now()), &mut canvas).await;
        assert!(csl.levels().is_empty());
        assert!(canvas.is_empty());
    }
}
