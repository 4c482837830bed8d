//! Session boundary kernel driven the way a chart host drives it: bars in the
//! chart zone, events in the exchange zone.

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use kapacitor_session_annotations_udf::{
    draw::{DrawKind, LineStyle},
    session::{
        recompute_levels, render_levels, BarOutcome, BarSample, LevelRole, LevelStyle, PriceLevel,
        PricedBar, SessionBoundaryTracker, SessionEvent,
    },
    timezone::ZonePair,
};

fn us_cash_session(zones: ZonePair) -> Vec<SessionEvent> {
    vec![
        SessionEvent::new(
            "open",
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            zones.session,
            LevelRole::Open,
        ),
        SessionEvent::new(
            "close",
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            zones.session,
            LevelRole::Close,
        ),
    ]
}

fn closed_last_bar(bar: &PricedBar) -> BarSample {
    BarSample {
        timestamp: bar.timestamp,
        is_first_tick_of_bar: true,
        is_last_bar_on_chart: true,
    }
}

fn bar(zone: Tz, y: i32, mo: u32, d: u32, h: u32, mi: u32, close: f64) -> PricedBar {
    PricedBar {
        timestamp: zone.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap(),
        close,
    }
}

#[test]
fn us_open_crossing_on_a_central_european_chart() {
    let zones =
        ZonePair::resolve_or_default("Eastern Standard Time", "Central European Standard Time");
    let events = us_cash_session(zones);
    let mut tracker = SessionBoundaryTracker::new(events.clone(), zones.chart);

    // 09:29 and 09:30 New York are 15:29 and 15:30 in Warsaw in July.
    let history = vec![
        bar(zones.chart, 2024, 7, 15, 15, 29, 100.25),
        bar(zones.chart, 2024, 7, 15, 15, 30, 100.5),
    ];

    assert_eq!(tracker.on_bar(&closed_last_bar(&history[0])), BarOutcome::NoOp);
    assert_eq!(tracker.on_bar(&closed_last_bar(&history[1])), BarOutcome::BoundaryCrossed);
    assert_eq!(tracker.on_bar(&closed_last_bar(&history[1])), BarOutcome::NoOp);

    let levels = recompute_levels(&history, tracker.events(), zones.chart, 6);
    assert_eq!(
        levels,
        vec![PriceLevel {
            date: NaiveDate::from_ymd_opt(2024, 7, 15).unwrap(),
            price: 100.5,
            role: LevelRole::Open,
        }]
    );

    let style = LevelStyle::default();
    let commands = render_levels(&levels, &style);
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].tag, "SessionOpenLevel_20240715");
    assert_eq!(commands[0].kind, DrawKind::HorizontalLine { price: 100.5 });
    assert_eq!(commands[0].opacity, style.tiers.first);
    assert_eq!(commands[0].style, LineStyle::Solid);

    let again = render_levels(&levels, &style);
    let tags: Vec<_> = again.iter().map(|c| c.tag.as_str()).collect();
    assert_eq!(tags, vec!["SessionOpenLevel_20240715"]);
}

#[test]
fn session_time_in_a_skipped_hour_does_not_fail() {
    let zones = ZonePair::resolve_or_default("America/New_York", "America/New_York");
    let events = vec![SessionEvent::new(
        "night",
        NaiveTime::from_hms_opt(2, 30, 0).unwrap(),
        zones.session,
        LevelRole::Open,
    )];
    let mut tracker = SessionBoundaryTracker::new(events.clone(), zones.chart);

    // 02:30 does not exist on 2024-03-10; the event lands on 03:30 EDT.
    let before = bar(zones.chart, 2024, 3, 10, 1, 45, 10.0);
    let after = bar(zones.chart, 2024, 3, 10, 3, 30, 11.0);
    tracker.on_bar(&closed_last_bar(&before));
    assert_eq!(tracker.on_bar(&closed_last_bar(&after)), BarOutcome::BoundaryCrossed);

    let levels = recompute_levels(&[before, after], &events, zones.chart, 6);
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0].price, 11.0);
}

#[test]
fn session_time_in_a_repeated_hour_uses_first_occurrence() {
    let zones = ZonePair::resolve_or_default("America/New_York", "UTC");
    let events = vec![SessionEvent::new(
        "night",
        NaiveTime::from_hms_opt(1, 30, 0).unwrap(),
        zones.session,
        LevelRole::Close,
    )];

    // 01:30 EDT on 2024-11-03 is 05:30 UTC; the EST repeat is 06:30 UTC.
    let first = bar(zones.chart, 2024, 11, 3, 5, 30, 1.0);
    let second = PricedBar {
        timestamp: first.timestamp + Duration::hours(1),
        close: 2.0,
    };
    let levels = recompute_levels(&[first, second], &events, zones.chart, 6);
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0].price, 1.0);
}

#[test]
fn retained_levels_rebuilt_from_history_stay_capped() {
    let zones = ZonePair::default();
    let events = us_cash_session(zones);

    let mut history = Vec::new();
    for day in 1..=10 {
        history.push(bar(zones.chart, 2024, 7, day, 15, 30, 100.0 + day as f64));
        history.push(bar(zones.chart, 2024, 7, day, 22, 0, 200.0 + day as f64));
    }

    let levels = recompute_levels(&history, &events, zones.chart, 6);
    assert_eq!(levels.len(), 6);
    assert_eq!(levels[0].date, NaiveDate::from_ymd_opt(2024, 7, 10).unwrap());
    assert_eq!(levels[5].date, NaiveDate::from_ymd_opt(2024, 7, 8).unwrap());
    assert!(levels.windows(2).all(|w| w[0].date >= w[1].date));
}
