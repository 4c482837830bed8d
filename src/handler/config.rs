use chrono::NaiveTime;
use chrono_tz::Tz;
use kapacitor_udf::proto::{
    option_value::Value, Option as ProtoOption, OptionInfo, OptionValue, ValueType,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use thiserror::Error;
use tracing::warn;

use crate::{
    calendar::FOREX_FACTORY_THIS_WEEK,
    draw::{Color, LineSpec, LineStyle, TextPosition},
    error::ConfigError,
    session::{levels::DEFAULT_RETENTION, LevelStyle},
    timezone::{resolve_zone, ZonePair, DEFAULT_CHART_ZONE, DEFAULT_SESSION_ZONE},
};

#[derive(Debug, Error)]
pub enum AnnotationOptionError {
    #[error("Invalid type for '{0}' option")]
    InvalidOptionType(String),
    #[error("Missing value for '{0}' option")]
    MissingOptionValue(String),
    #[error("Unknown option: {0}")]
    UnknownOption(String),
    #[error("Invalid indicator type: {0}")]
    InvalidIndicatorType(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorType {
    SessionOpen,
    CashSessionLevels,
    Clock,
    EconomicCalendar,
}

impl std::str::FromStr for IndicatorType {
    type Err = AnnotationOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "session_open" => Ok(IndicatorType::SessionOpen),
            "cash_session_levels" => Ok(IndicatorType::CashSessionLevels),
            "clock" => Ok(IndicatorType::Clock),
            "economic_calendar" => Ok(IndicatorType::EconomicCalendar),
            _ => Err(AnnotationOptionError::InvalidIndicatorType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnotationOptions {
    #[serde(rename = "type")]
    pub indicator_type: IndicatorType,
    pub field: String,
    #[serde(rename = "as")]
    pub as_measurement: String,
    pub chart_timezone: String,
    pub bars_required_to_plot: usize,
    pub history_limit: usize,
    pub session_open: SessionOpenOptions,
    pub cash_levels: CashLevelsOptions,
    pub clock: ClockOptions,
    pub calendar: CalendarOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionOpenOptions {
    #[serde(with = "time_of_day")]
    pub us_open: NaiveTime,
    pub us_timezone: String,
    #[serde(with = "time_of_day")]
    pub eu_open: NaiveTime,
    pub eu_timezone: String,
    pub line: LineSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CashLevelsOptions {
    #[serde(with = "time_of_day")]
    pub open: NaiveTime,
    #[serde(with = "time_of_day")]
    pub close: NaiveTime,
    pub session_timezone: String,
    pub retention: usize,
    pub style: LevelStyle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClockOptions {
    pub timezone: String,
    pub vertical: VerticalAlignment,
    pub horizontal: HorizontalAlignment,
    pub font_size: u32,
    pub font_color: Color,
    pub background: Color,
    pub opacity: u8,
}

impl ClockOptions {
    /// Centered alignments have no fixed corner and end up bottom right.
    pub fn text_position(&self) -> TextPosition {
        match (self.vertical, self.horizontal) {
            (VerticalAlignment::Top, HorizontalAlignment::Left) => TextPosition::TopLeft,
            (VerticalAlignment::Top, HorizontalAlignment::Right) => TextPosition::TopRight,
            (VerticalAlignment::Bottom, HorizontalAlignment::Left) => TextPosition::BottomLeft,
            (VerticalAlignment::Bottom, HorizontalAlignment::Right) => TextPosition::BottomRight,
            _ => TextPosition::BottomRight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CalendarOptions {
    pub url: String,
    pub file: Option<std::path::PathBuf>,
    pub currencies: String,
    pub impacts: String,
    pub color: Color,
    pub line_style: LineStyle,
    pub thickness: u32,
    pub opacity_high: u8,
    pub opacity_medium: u8,
    pub opacity_low: u8,
}

impl AnnotationOptions {
    /// Applies Kapacitor `init` options on top of `self`.
    pub fn with_proto_options(
        &self,
        options: &[ProtoOption],
    ) -> Result<Self, AnnotationOptionError> {
        let mut merged = self.clone();

        for option in options {
            let name = option.name.as_str();
            let value = option
                .values
                .first()
                .ok_or_else(|| AnnotationOptionError::MissingOptionValue(option.name.clone()))?;

            match name {
                "type" => merged.indicator_type = string_value(name, value)?.parse()?,
                "field" => merged.field = string_value(name, value)?.to_string(),
                "as" => merged.as_measurement = string_value(name, value)?.to_string(),
                "chart_tz" => merged.chart_timezone = zone_value(name, value)?,
                "session_tz" => merged.cash_levels.session_timezone = zone_value(name, value)?,
                "clock_tz" => merged.clock.timezone = zone_value(name, value)?,
                "open" => {
                    merged.cash_levels.open =
                        crate::timezone::parse_time_of_day(string_value(name, value)?)?
                }
                "close" => {
                    merged.cash_levels.close =
                        crate::timezone::parse_time_of_day(string_value(name, value)?)?
                }
                "retention" => merged.cash_levels.retention = count_value(name, value)?,
                "bars_required" => merged.bars_required_to_plot = count_value(name, value)?,
                "currencies" => merged.calendar.currencies = string_value(name, value)?.to_string(),
                "impacts" => merged.calendar.impacts = string_value(name, value)?.to_string(),
                _ => return Err(AnnotationOptionError::UnknownOption(option.name.clone())),
            }
        }

        Ok(merged)
    }

    pub fn to_option_info(&self) -> HashMap<String, OptionInfo> {
        let string_options = [
            "type", "field", "as", "chart_tz", "session_tz", "clock_tz", "open", "close",
            "currencies", "impacts",
        ];
        let int_options = ["retention", "bars_required"];

        let info = |value_type: ValueType| OptionInfo {
            value_types: vec![value_type as i32],
        };

        string_options
            .iter()
            .map(|name| (name.to_string(), info(ValueType::String)))
            .chain(int_options.iter().map(|name| (name.to_string(), info(ValueType::Int))))
            .collect()
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Chart zone, or the default chart zone when the identifier is unknown.
    pub fn chart_zone(&self) -> Tz {
        resolve_zone(&self.chart_timezone).unwrap_or_else(|e| {
            warn!("{}; falling back to '{}'", e, DEFAULT_CHART_ZONE);
            ZonePair::default().chart
        })
    }
}

fn string_value<'a>(name: &str, value: &'a OptionValue) -> Result<&'a str, AnnotationOptionError> {
    match value.value {
        Some(Value::StringValue(ref v)) => Ok(v.as_str()),
        _ => Err(AnnotationOptionError::InvalidOptionType(name.to_string())),
    }
}

fn count_value(name: &str, value: &OptionValue) -> Result<usize, AnnotationOptionError> {
    match value.value {
        Some(Value::IntValue(v)) => usize::try_from(v)
            .map_err(|_| ConfigError::InvalidOptionValue(name.to_string()).into()),
        _ => Err(AnnotationOptionError::InvalidOptionType(name.to_string())),
    }
}

/// Zone identifiers are checked up front so a typo fails `init` instead of
/// silently drawing in the default zone.
fn zone_value(name: &str, value: &OptionValue) -> Result<String, AnnotationOptionError> {
    let id = string_value(name, value)?;
    resolve_zone(id)?;
    Ok(id.to_string())
}

impl Default for AnnotationOptions {
    fn default() -> Self {
        Self {
            indicator_type: IndicatorType::CashSessionLevels,
            field: "close".to_string(),
            as_measurement: "annotations".to_string(),
            chart_timezone: DEFAULT_CHART_ZONE.to_string(),
            bars_required_to_plot: 20,
            history_limit: 100_000,
            session_open: SessionOpenOptions::default(),
            cash_levels: CashLevelsOptions::default(),
            clock: ClockOptions::default(),
            calendar: CalendarOptions::default(),
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for SessionOpenOptions {
    fn default() -> Self {
        Self {
            us_open: hm(9, 30),
            us_timezone: DEFAULT_SESSION_ZONE.to_string(),
            eu_open: hm(8, 0),
            eu_timezone: "GMT Standard Time".to_string(),
            line: LineSpec {
                color: Color::WHITE,
                opacity: 50,
                style: LineStyle::Dot,
                thickness: 5,
            },
        }
    }
}

impl Default for CashLevelsOptions {
    fn default() -> Self {
        Self {
            open: hm(9, 30),
            close: hm(16, 0),
            session_timezone: DEFAULT_SESSION_ZONE.to_string(),
            retention: DEFAULT_RETENTION,
            style: LevelStyle::default(),
        }
    }
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_SESSION_ZONE.to_string(),
            vertical: VerticalAlignment::Bottom,
            horizontal: HorizontalAlignment::Right,
            font_size: 12,
            font_color: Color::WHITE,
            background: Color::BLACK,
            opacity: 80,
        }
    }
}

impl Default for CalendarOptions {
    fn default() -> Self {
        Self {
            url: FOREX_FACTORY_THIS_WEEK.to_string(),
            file: None,
            currencies: "USD EUR GBP CAD JPY CNY".to_string(),
            impacts: "low medium high".to_string(),
            color: Color::YELLOW,
            line_style: LineStyle::Solid,
            thickness: 5,
            opacity_high: 75,
            opacity_medium: 50,
            opacity_low: 25,
        }
    }
}

mod time_of_day {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(d)?;
        crate::timezone::parse_time_of_day(&s).map_err(serde::de::Error::custom)
    }
}
