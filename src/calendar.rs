//! Economic calendar rows and the process wide download cache.

use anyhow::Context;
use async_std::sync::Mutex;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, error, info};

pub const FOREX_FACTORY_THIS_WEEK: &str = "https://nfs.faireconomy.media/ff_calendar_thisweek.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub title: String,
    pub country: String,
    pub at: DateTime<Utc>,
    pub impact: String,
    pub forecast: String,
    pub previous: String,
}

/// Parses `title,country,date,time,impact,forecast,previous[,...]` rows after
/// a header line. Dates are `MM-DD-YYYY`, times `h:mmam` in UTC. Short rows
/// and rows without a concrete time ("All Day", "Tentative") are skipped.
pub fn parse_calendar_csv(data: &str) -> Vec<CalendarEvent> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let mut events = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                debug!("Skipping malformed calendar row: {}", e);
                continue;
            }
        };
        if record.len() < 7 {
            continue;
        }

        let stamp = format!("{} {}", &record[2], &record[3]);
        let at = match NaiveDateTime::parse_from_str(&stamp, "%m-%d-%Y %I:%M%p") {
            Ok(naive) => naive.and_utc(),
            Err(_) => {
                debug!("Skipping calendar row '{}' with time '{}'", &record[0], stamp);
                continue;
            }
        };

        events.push(CalendarEvent {
            title: record[0].to_string(),
            country: record[1].to_string(),
            at,
            impact: record[4].to_string(),
            forecast: record[5].to_string(),
            previous: record[6].to_string(),
        });
    }
    events
}

/// Currency and impact allow-lists, both given as space separated words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarFilter {
    currencies: Vec<String>,
    impacts: Vec<String>,
}

impl CalendarFilter {
    pub fn new(currencies: &str, impacts: &str) -> Self {
        CalendarFilter {
            currencies: currencies.split_whitespace().map(str::to_uppercase).collect(),
            impacts: impacts.split_whitespace().map(str::to_lowercase).collect(),
        }
    }

    pub fn matches(&self, event: &CalendarEvent) -> bool {
        self.currencies.contains(&event.country.trim().to_uppercase())
            && self.impacts.contains(&event.impact.trim().to_lowercase())
    }
}

#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpCalendarSource {
    url: String,
}

impl HttpCalendarSource {
    pub fn new(url: impl Into<String>) -> Self {
        HttpCalendarSource { url: url.into() }
    }
}

impl Default for HttpCalendarSource {
    fn default() -> Self {
        Self::new(FOREX_FACTORY_THIS_WEEK)
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn fetch(&self) -> anyhow::Result<String> {
        let url = self.url.clone();
        // reqwest's blocking client brings its own runtime.
        async_std::task::spawn_blocking(move || -> anyhow::Result<String> {
            let body = reqwest::blocking::get(&url)
                .with_context(|| format!("GET {}", url))?
                .error_for_status()?
                .text()?;
            Ok(body)
        })
        .await
    }
}

#[derive(Debug, Clone)]
pub struct FileCalendarSource {
    path: PathBuf,
}

impl FileCalendarSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCalendarSource { path: path.into() }
    }
}

#[async_trait]
impl CalendarSource for FileCalendarSource {
    async fn fetch(&self) -> anyhow::Result<String> {
        async_std::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))
    }
}

/// Events of the most recent successful download. `generation` changes with
/// every download so each reader can tell fresh data from data it has
/// already drawn.
#[derive(Debug, Clone, Default)]
pub struct CalendarSnapshot {
    pub events: Arc<Vec<CalendarEvent>>,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    snapshot: CalendarSnapshot,
    downloaded_at: Option<DateTime<Utc>>,
}

/// Shared by every connection of the process.
pub struct CalendarCache {
    source: Box<dyn CalendarSource>,
    refresh_interval: Duration,
    state: Mutex<CacheState>,
}

impl CalendarCache {
    pub fn new(source: Box<dyn CalendarSource>, refresh_interval: Duration) -> Self {
        CalendarCache {
            source,
            refresh_interval,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn hourly(source: Box<dyn CalendarSource>) -> Self {
        Self::new(source, Duration::hours(1))
    }

    /// Downloads again when the last successful download is older than the
    /// refresh interval. A failed download keeps the previous events and is
    /// retried on the next call.
    pub async fn get(&self, now: DateTime<Utc>) -> CalendarSnapshot {
        let mut state = self.state.lock().await;

        let stale = state
            .downloaded_at
            .map_or(true, |at| now - at >= self.refresh_interval);
        if stale {
            match self.source.fetch().await {
                Ok(body) => {
                    let events = parse_calendar_csv(&body);
                    info!("Downloaded economic calendar with {} events", events.len());
                    let generation = state.snapshot.generation + 1;
                    state.snapshot = CalendarSnapshot {
                        events: Arc::new(events),
                        generation,
                    };
                    state.downloaded_at = Some(now);
                }
                Err(e) => error!("Error loading economic calendar data: {:#}", e),
            }
        }

        state.snapshot.clone()
    }
}

impl std::fmt::Debug for CalendarCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarCache")
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}
