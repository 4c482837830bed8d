//! Time zone lookup and session time conversion.
//!
//! Identifiers are opaque strings. IANA names (`America/New_York`) resolve
//! directly through `chrono-tz`; the platform style names used by trading
//! front ends (`Eastern Standard Time`) resolve through [`ZONE_ALIASES`].
//!
//! Local times that fall into a daylight saving gap are interpreted with the
//! offset in effect just before the gap, so they land later on the wall
//! clock by the size of the gap (02:30 on a spring-forward night becomes
//! 03:30). Local times that occur twice resolve to the earlier instant.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::ConfigError;

/// Session zone used when a configured identifier cannot be resolved.
pub const DEFAULT_SESSION_ZONE: &str = "Eastern Standard Time";
/// Chart zone used when a configured identifier cannot be resolved.
pub const DEFAULT_CHART_ZONE: &str = "Central European Standard Time";

/// Platform zone names and the IANA zone they map to.
pub const ZONE_ALIASES: &[(&str, &str)] = &[
    ("Eastern Standard Time", "America/New_York"),
    ("Central Standard Time", "America/Chicago"),
    ("Mountain Standard Time", "America/Denver"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("GMT Standard Time", "Europe/London"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("Romance Standard Time", "Europe/Paris"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("China Standard Time", "Asia/Shanghai"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("UTC", "Etc/UTC"),
];

// Longest daylight saving gap in the database is one hour; searching a bit
// further covers historical oddities.
const GAP_SEARCH_STEP_MINUTES: i64 = 15;
const GAP_SEARCH_LIMIT_MINUTES: i64 = 180;

pub fn resolve_zone(id: &str) -> Result<Tz, ConfigError> {
    let id = id.trim();
    let name = ZONE_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(id))
        .map(|(_, iana)| *iana)
        .unwrap_or(id);

    name.parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimeZone(id.to_string()))
}

/// A session zone together with the chart (display) zone it is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonePair {
    pub session: Tz,
    pub chart: Tz,
}

impl ZonePair {
    pub fn resolve(session_id: &str, chart_id: &str) -> Result<Self, ConfigError> {
        Ok(ZonePair {
            session: resolve_zone(session_id)?,
            chart: resolve_zone(chart_id)?,
        })
    }

    /// Resolves both identifiers, replacing the whole pair with the defaults
    /// when either of them is unknown.
    pub fn resolve_or_default(session_id: &str, chart_id: &str) -> Self {
        match Self::resolve(session_id, chart_id) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    "{}; falling back to '{}' / '{}'",
                    e, DEFAULT_SESSION_ZONE, DEFAULT_CHART_ZONE
                );
                Self::default()
            }
        }
    }
}

impl Default for ZonePair {
    fn default() -> Self {
        ZonePair {
            session: chrono_tz::America::New_York,
            chart: chrono_tz::Europe::Warsaw,
        }
    }
}

/// Resolves a wall-clock time in `zone` to an absolute instant.
pub fn localize(zone: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = zone.from_local_datetime(&local).earliest() {
        return dt.with_timezone(&Utc);
    }

    // Inside a gap: borrow the offset of the last valid wall time before it.
    let mut back = GAP_SEARCH_STEP_MINUTES;
    while back <= GAP_SEARCH_LIMIT_MINUTES {
        if let Some(before) = zone
            .from_local_datetime(&(local - Duration::minutes(back)))
            .earliest()
        {
            let offset = before.offset().fix();
            return (local - Duration::seconds(offset.local_minus_utc() as i64)).and_utc();
        }
        back += GAP_SEARCH_STEP_MINUTES;
    }

    // No valid wall time nearby; treat the local time as the zone's UTC
    // offset at that moment.
    let offset = zone.offset_from_utc_datetime(&local).fix();
    (local - Duration::seconds(offset.local_minus_utc() as i64)).and_utc()
}

/// Combines `date` and `time_of_day` as wall-clock time in `source` and
/// re-expresses that instant in `display`.
pub fn convert_to_display_timezone(
    time_of_day: NaiveTime,
    source: Tz,
    date: NaiveDate,
    display: Tz,
) -> DateTime<Tz> {
    localize(source, date.and_time(time_of_day)).with_timezone(&display)
}

/// Identifier based variant of [`convert_to_display_timezone`].
pub fn convert_by_id(
    time_of_day: NaiveTime,
    source_id: &str,
    date: NaiveDate,
    display_id: &str,
) -> Result<DateTime<Tz>, ConfigError> {
    let source = resolve_zone(source_id)?;
    let display = resolve_zone(display_id)?;
    Ok(convert_to_display_timezone(time_of_day, source, date, display))
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ConfigError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| ConfigError::InvalidTimeOfDay(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn resolves_platform_names_and_iana_names() {
        assert_eq!(
            resolve_zone("Eastern Standard Time").unwrap(),
            chrono_tz::America::New_York
        );
        assert_eq!(
            resolve_zone(" gmt standard time ").unwrap(),
            chrono_tz::Europe::London
        );
        assert_eq!(resolve_zone("Europe/London").unwrap(), chrono_tz::Europe::London);
        assert!(resolve_zone("Mars Standard Time").is_err());
    }

    #[test]
    fn unknown_zone_falls_back_to_default_pair() {
        let pair = ZonePair::resolve_or_default("Eastern Standard Time", "Nowhere/Land");
        assert_eq!(pair, ZonePair::default());

        let pair = ZonePair::resolve_or_default("Asia/Tokyo", "Europe/London");
        assert_eq!(pair.session, chrono_tz::Asia::Tokyo);
        assert_eq!(pair.chart, chrono_tz::Europe::London);
    }

    #[test]
    fn us_open_in_central_european_chart_time() {
        // Regular summer offsets: New York UTC-4, Warsaw UTC+2.
        let at = convert_by_id(
            hm(9, 30),
            "Eastern Standard Time",
            date(2024, 7, 15),
            "Central European Standard Time",
        )
        .unwrap();
        assert_eq!(at.naive_local(), date(2024, 7, 15).and_time(hm(15, 30)));

        // Late March: New York already on DST, Europe not yet.
        let at = convert_by_id(
            hm(9, 30),
            "Eastern Standard Time",
            date(2024, 3, 20),
            "Central European Standard Time",
        )
        .unwrap();
        assert_eq!(at.naive_local(), date(2024, 3, 20).and_time(hm(14, 30)));
    }

    #[test]
    fn unknown_identifier_is_a_config_error() {
        let err = convert_by_id(hm(9, 30), "Bogus", date(2024, 1, 2), "UTC").unwrap_err();
        assert_eq!(err, ConfigError::UnknownTimeZone("Bogus".to_string()));
    }

    #[test]
    fn skipped_local_time_moves_forward_by_the_gap() {
        // 2024-03-10 02:30 does not exist in New York.
        let at = convert_to_display_timezone(
            hm(2, 30),
            chrono_tz::America::New_York,
            date(2024, 3, 10),
            chrono_tz::America::New_York,
        );
        assert_eq!(at.naive_local(), date(2024, 3, 10).and_time(hm(3, 30)));
        assert_eq!(
            at.with_timezone(&Utc).naive_utc(),
            date(2024, 3, 10).and_time(hm(7, 30))
        );
    }

    #[test]
    fn repeated_local_time_picks_first_occurrence() {
        // 2024-11-03 01:30 happens twice in New York; the first is EDT.
        let at = convert_to_display_timezone(
            hm(1, 30),
            chrono_tz::America::New_York,
            date(2024, 11, 3),
            chrono_tz::UTC,
        );
        assert_eq!(at.naive_local(), date(2024, 11, 3).and_time(hm(5, 30)));
    }

    #[test]
    fn parses_time_of_day_with_and_without_seconds() {
        assert_eq!(parse_time_of_day("09:30").unwrap(), hm(9, 30));
        assert_eq!(
            parse_time_of_day("16:00:15").unwrap(),
            NaiveTime::from_hms_opt(16, 0, 15).unwrap()
        );
        assert!(parse_time_of_day("25:00").is_err());
    }

    const ZONES: &[Tz] = &[
        chrono_tz::America::New_York,
        chrono_tz::Europe::London,
        chrono_tz::Europe::Warsaw,
        chrono_tz::Asia::Tokyo,
        chrono_tz::Australia::Sydney,
    ];

    proptest! {
        #[test]
        fn conversion_round_trips_through_utc(
            day in 0i64..3650,
            minute in 0u32..1440,
            source in 0usize..ZONES.len(),
            display in 0usize..ZONES.len(),
        ) {
            let d = date(2018, 1, 1) + Duration::days(day);
            let t = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap();
            let (source, display) = (ZONES[source], ZONES[display]);

            let first = convert_to_display_timezone(t, source, d, display);
            let second = convert_to_display_timezone(t, source, d, display);
            prop_assert_eq!(first, second);

            let unambiguous = matches!(
                source.from_local_datetime(&d.and_time(t)),
                chrono::LocalResult::Single(_)
            );
            if unambiguous {
                let back = first.with_timezone(&Utc).with_timezone(&source);
                prop_assert_eq!(back.date_naive(), d);
                prop_assert_eq!(back.hour() * 60 + back.minute(), minute);
            }
        }
    }
}
