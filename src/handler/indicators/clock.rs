use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

use super::{ChartContext, Indicator};
use crate::{
    draw::{Canvas, Color, DrawCommand, DrawKind, LineStyle, TextPosition},
    handler::config::AnnotationOptions,
    timezone::{resolve_zone, ZonePair, DEFAULT_SESSION_ZONE},
};

pub const CLOCK_TAG: &str = "WallClock";

/// Current wall clock time of a zone, in a chart corner.
pub struct Clock {
    zone: Tz,
    position: TextPosition,
    font_size: u32,
    font_color: Color,
    background: Color,
    opacity: u8,
}

impl Clock {
    pub fn from_options(options: &AnnotationOptions) -> Self {
        let o = &options.clock;
        let zone = resolve_zone(&o.timezone).unwrap_or_else(|e| {
            warn!("{}; falling back to '{}'", e, DEFAULT_SESSION_ZONE);
            ZonePair::default().session
        });

        Clock {
            zone,
            position: o.text_position(),
            font_size: o.font_size,
            font_color: o.font_color,
            background: o.background,
            opacity: o.opacity,
        }
    }

    pub fn render(&self, now: DateTime<Utc>) -> DrawCommand {
        DrawCommand {
            tag: CLOCK_TAG.to_string(),
            kind: DrawKind::FixedText {
                position: self.position,
                text: now.with_timezone(&self.zone).format("%H:%M:%S").to_string(),
                font_size: self.font_size,
                background: self.background,
            },
            color: self.font_color,
            opacity: self.opacity,
            style: LineStyle::Solid,
            thickness: 0,
        }
    }
}

#[async_trait]
impl Indicator for Clock {
    fn name(&self) -> &'static str {
        "clock"
    }

    async fn on_bar(&mut self, chart: &ChartContext<'_>, canvas: &mut dyn Canvas) {
        if chart.sample.is_evaluated() {
            canvas.draw(self.render(chart.now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        draw::AnnotationCanvas,
        handler::indicators::test_support::{bars, last_bar_context},
    };
    use chrono::TimeZone;

    #[async_std::test]
    async fn shows_time_in_configured_zone() {
        let mut clock = Clock::from_options(&AnnotationOptions::default());
        let mut canvas = AnnotationCanvas::new();
        let history = bars(chrono_tz::Europe::Warsaw, (2024, 1, 10, 9, 0), 3, 1);
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 14, 5, 9).unwrap();

        clock.on_bar(&last_bar_context(&history, now), &mut canvas).await;
        clock.on_bar(&last_bar_context(&history, now), &mut canvas).await;

        assert_eq!(canvas.len(), 1);
        let command = canvas.get(CLOCK_TAG).unwrap();
        match &command.kind {
            DrawKind::FixedText { position, text, .. } => {
                assert_eq!(*position, TextPosition::BottomRight);
                assert_eq!(text, "09:05:09");
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(command.opacity, 80);
    }
}
