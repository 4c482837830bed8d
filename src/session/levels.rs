use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::{cmp::Reverse, collections::HashMap};

use super::{LevelRole, PricedBar, SessionEvent};
use crate::draw::{Color, DrawCommand, DrawKind, LineStyle};

/// Three days of open and close levels.
pub const DEFAULT_RETENTION: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub date: NaiveDate,
    pub price: f64,
    pub role: LevelRole,
}

impl PriceLevel {
    pub fn tag(&self) -> String {
        let prefix = match self.role {
            LevelRole::Open => "SessionOpenLevel",
            LevelRole::Close => "SessionCloseLevel",
        };
        format!("{}_{}", prefix, self.date.format("%Y%m%d"))
    }
}

/// Rescans the whole history and keeps the closes of bars stamped exactly
/// at a session event on their own calendar date. One level per (date, role),
/// the later bar winning. Newest bar first, at most `cap` entries, so a day
/// whose close is known ranks its close ahead of its open.
pub fn recompute_levels(
    bars: &[PricedBar],
    events: &[SessionEvent],
    display: Tz,
    cap: usize,
) -> Vec<PriceLevel> {
    let mut found: HashMap<(NaiveDate, LevelRole), PricedBar> = HashMap::new();

    for bar in bars {
        let date = bar.timestamp.date_naive();
        for event in events {
            if event.boundary_on(date, display) == bar.timestamp {
                found.insert((date, event.role), *bar);
            }
        }
    }

    let mut levels: Vec<_> = found.into_iter().collect();
    levels.sort_by_key(|((date, role), bar)| (Reverse(*date), Reverse(bar.timestamp), *role));
    levels
        .into_iter()
        .take(cap)
        .map(|((date, role), bar)| PriceLevel {
            date,
            price: bar.close,
            role,
        })
        .collect()
}

/// Opacity (percent) of the newest, second newest and all older levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransparencyTiers {
    pub first: u8,
    pub second: u8,
    pub rest: u8,
}

impl TransparencyTiers {
    pub fn for_rank(&self, rank: usize) -> u8 {
        match rank {
            0 => self.first,
            1 => self.second,
            _ => self.rest,
        }
    }
}

impl Default for TransparencyTiers {
    fn default() -> Self {
        TransparencyTiers {
            first: 100,
            second: 66,
            rest: 33,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelStyle {
    pub open_color: Color,
    pub close_color: Color,
    pub line_style: LineStyle,
    pub thickness: u32,
    pub tiers: TransparencyTiers,
}

impl Default for LevelStyle {
    fn default() -> Self {
        LevelStyle {
            open_color: Color::RED,
            close_color: Color::ORANGE,
            line_style: LineStyle::Solid,
            thickness: 4,
            tiers: TransparencyTiers::default(),
        }
    }
}

/// One horizontal line per level. Levels are ranked per role in the order
/// given (newest first), and the rank picks the transparency tier.
pub fn render_levels(levels: &[PriceLevel], style: &LevelStyle) -> Vec<DrawCommand> {
    let mut commands = Vec::with_capacity(levels.len());

    for (role, color) in [
        (LevelRole::Open, style.open_color),
        (LevelRole::Close, style.close_color),
    ] {
        let ranked = levels.iter().filter(|l| l.role == role).enumerate();
        commands.extend(ranked.map(|(rank, level)| DrawCommand {
            tag: level.tag(),
            kind: DrawKind::HorizontalLine { price: level.price },
            color,
            opacity: style.tiers.for_rank(rank),
            style: style.line_style,
            thickness: style.thickness,
        }));
    }

    commands
}
