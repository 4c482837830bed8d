use super::{
    config::AnnotationOptions,
    indicators::{build_indicator, ChartContext, Indicator},
};
use crate::{
    calendar::CalendarCache,
    draw::{AnnotationCanvas, Color, DrawCommand, DrawKind, Issued},
    session::{BarSample, PricedBar},
};
use async_std::{channel::Sender, sync::Mutex};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use kapacitor_udf::{
    proto::{
        response, BeginBatch, EdgeType, EndBatch, InfoResponse, InitRequest, InitResponse, Point,
        Response, RestoreRequest, RestoreResponse, SnapshotResponse,
    },
    traits::Handler,
};
use serde::{Deserialize, Serialize};
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Failed to send response: {0}")]
    ResponseSendError(String),
    #[error("EndBatch called without BeginBatch")]
    MissingBeginBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct RawBar {
    time: i64,
    close: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AnnotationData {
    history: Vec<RawBar>,
    #[serde(skip)]
    batch_points: Vec<Point>,
}

pub struct AnnotationHandler {
    responses: Arc<Mutex<Sender<Response>>>,
    base_options: AnnotationOptions,
    options: AnnotationOptions,
    calendar: Arc<CalendarCache>,
    data: AnnotationData,
    indicator: Box<dyn Indicator>,
    chart_zone: Tz,
    canvas: AnnotationCanvas,
    history_loaded: bool,
    begin_batch: Option<BeginBatch>,
}

impl AnnotationHandler {
    #[instrument(skip(responses, options, calendar))]
    pub async fn new(
        responses: Arc<Mutex<Sender<Response>>>,
        options: AnnotationOptions,
        calendar: Arc<CalendarCache>,
    ) -> Self {
        debug!("Creating new AnnotationHandler");

        let indicator = build_indicator(&options, Arc::clone(&calendar));
        let chart_zone = options.chart_zone();

        AnnotationHandler {
            responses,
            base_options: options.clone(),
            options,
            calendar,
            data: AnnotationData::default(),
            indicator,
            chart_zone,
            canvas: AnnotationCanvas::new(),
            history_loaded: false,
            begin_batch: None,
        }
    }

    fn reconfigure(&mut self, options: AnnotationOptions) {
        self.indicator = build_indicator(&options, Arc::clone(&self.calendar));
        self.chart_zone = options.chart_zone();
        self.options = options;
        self.data = AnnotationData::default();
        self.canvas = AnnotationCanvas::new();
        self.history_loaded = false;
    }

    /// Merges incoming bars into the history. Bars at known timestamps
    /// replace the stored close. Returns the index of the first bar that is
    /// newer than everything seen before.
    fn merge_bars(&mut self, mut incoming: Vec<RawBar>) -> usize {
        incoming.sort_by_key(|b| b.time);
        let history = &mut self.data.history;
        let newest_known = history.last().map(|b| b.time);

        for bar in incoming {
            match history.binary_search_by_key(&bar.time, |b| b.time) {
                Ok(i) => history[i].close = bar.close,
                Err(i) => history.insert(i, bar),
            }
        }

        let limit = self.options.history_limit.max(1);
        let mut first_new =
            history.partition_point(|b| newest_known.map_or(false, |t| b.time <= t));
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
            first_new = first_new.saturating_sub(excess);
        }
        first_new
    }

    fn chart_bars(&self) -> Vec<PricedBar> {
        self.data
            .history
            .iter()
            .map(|b| PricedBar {
                timestamp: Utc.timestamp_nanos(b.time).with_timezone(&self.chart_zone),
                close: b.close,
            })
            .collect()
    }

    /// Feeds the history to the indicator and collects the draws and removals
    /// it issued.
    async fn run_indicator(&mut self, first_new: usize, now: DateTime<Utc>) -> Vec<Issued> {
        let bars = self.chart_bars();
        let Some(last) = bars.len().checked_sub(1) else {
            return Vec::new();
        };

        let context = |i: usize| ChartContext {
            bars: &bars[..=i],
            sample: BarSample {
                timestamp: bars[i].timestamp,
                is_first_tick_of_bar: true,
                is_last_bar_on_chart: i == last,
            },
            now,
        };

        if !self.history_loaded {
            info!("History loaded with {} bars for {}", bars.len(), self.indicator.name());
            self.indicator
                .on_history_loaded(&context(last), &mut self.canvas)
                .await;
            self.history_loaded = true;
        }

        for i in first_new..=last {
            self.indicator.on_bar(&context(i), &mut self.canvas).await;
        }

        self.canvas.drain_issued()
    }

    fn annotation_point(&self, template: &Point, issued: &Issued) -> Point {
        let mut p = template.clone();
        p.name = self.options.as_measurement.clone();
        p.fields_double.clear();
        p.fields_int.clear();
        p.fields_string.clear();

        p.tags.insert("tag".to_string(), issued.tag().to_string());
        p.tags.insert("indicator".to_string(), self.indicator.name().to_string());

        match issued {
            Issued::Draw(command) => Self::fill_draw_fields(&mut p, command),
            Issued::Remove(_) => {
                p.tags.insert("kind".to_string(), "remove".to_string());
                p.fields_int.insert("removed".to_string(), 1);
            }
        }
        p
    }

    fn fill_draw_fields(p: &mut Point, command: &DrawCommand) {
        p.tags.insert("kind".to_string(), command.kind.name().to_string());
        p.fields_string.insert("color".to_string(), command.color.to_string());
        p.fields_string.insert("style".to_string(), command.style.to_string());
        p.fields_int.insert("opacity".to_string(), command.opacity as i64);
        p.fields_int.insert("alpha".to_string(), Color::alpha(command.opacity) as i64);
        p.fields_int.insert("thickness".to_string(), command.thickness as i64);

        match &command.kind {
            DrawKind::HorizontalLine { price } => {
                p.fields_double.insert("price".to_string(), *price);
            }
            DrawKind::VerticalLine { at } => {
                if let Some(ns) = at.timestamp_nanos_opt() {
                    p.time = ns;
                }
            }
            DrawKind::FixedText {
                position,
                text,
                font_size,
                background,
            } => {
                p.fields_string.insert("text".to_string(), text.clone());
                p.fields_string.insert("position".to_string(), position.to_string());
                p.fields_string.insert("background".to_string(), background.to_string());
                p.fields_int.insert("font_size".to_string(), *font_size as i64);
            }
        }
    }

    async fn send_response(&self, response: Response) -> Result<(), AnnotationError> {
        trace!("Sending response: {:?}", response);

        let sender = self.responses.lock().await;
        match sender.send(response).await {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Failed to send response: {}", e);
                Err(AnnotationError::ResponseSendError(e.to_string()))
            }
        }
    }
}

fn to_io(e: AnnotationError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

#[async_trait]
impl Handler for AnnotationHandler {
    #[instrument(skip(self))]
    async fn info(&self) -> io::Result<InfoResponse> {
        debug!("Info request received");
        let info = InfoResponse {
            wants: EdgeType::Batch.into(),
            provides: EdgeType::Batch.into(),
            options: self.options.to_option_info(),
        };
        trace!("Responding with info: {:?}", info);
        Ok(info)
    }

    #[instrument(skip(self, r))]
    async fn init(&mut self, r: &InitRequest) -> io::Result<InitResponse> {
        debug!("Init request received: {:?}", r);
        match self.base_options.with_proto_options(&r.options) {
            Ok(options) => {
                info!("Initialized {:?} annotations", options.indicator_type);
                self.reconfigure(options);
                Ok(InitResponse {
                    success: true,
                    error: String::new(),
                })
            }
            Err(e) => {
                error!("Failed to initialize: {}", e);
                Ok(InitResponse {
                    success: false,
                    error: e.to_string(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn snapshot(&self) -> io::Result<SnapshotResponse> {
        debug!("Snapshot request received");
        let snapshot = serde_json::to_vec(&self.data).map_err(|e| {
            error!("Failed to serialize state: {}", e);
            io::Error::new(io::ErrorKind::Other, e)
        })?;
        Ok(SnapshotResponse { snapshot })
    }

    #[instrument(skip(self, req))]
    async fn restore(&mut self, req: &RestoreRequest) -> io::Result<RestoreResponse> {
        debug!("Restore request received");
        match serde_json::from_slice::<AnnotationData>(&req.snapshot) {
            Ok(data) => {
                self.data = data;
                // Levels are rebuilt from the restored history on the next batch.
                self.history_loaded = false;
                Ok(RestoreResponse {
                    success: true,
                    error: String::new(),
                })
            }
            Err(e) => {
                error!("Failed to restore state: {}", e);
                Ok(RestoreResponse {
                    success: false,
                    error: e.to_string(),
                })
            }
        }
    }

    #[instrument(skip(self, begin))]
    async fn begin_batch(&mut self, begin: &BeginBatch) -> io::Result<()> {
        debug!("BeginBatch called: {:?}", begin);
        self.begin_batch = Some(begin.clone());
        self.data.batch_points.clear();
        Ok(())
    }

    #[instrument(skip(self, p), fields(point_name = %p.name, point_time = %p.time))]
    async fn point(&mut self, p: &Point) -> io::Result<()> {
        if p.fields_double.contains_key(&self.options.field) {
            self.data.batch_points.push(p.clone());
            trace!("Batch size: {}", self.data.batch_points.len());
        } else {
            warn!("Missing '{}' field in point", self.options.field);
        }
        Ok(())
    }

    #[instrument(skip(self, end))]
    async fn end_batch(&mut self, end: &EndBatch) -> io::Result<()> {
        debug!("EndBatch called: {:?}", end);

        let mut begin = self
            .begin_batch
            .take()
            .ok_or(AnnotationError::MissingBeginBatch)
            .map_err(to_io)?;

        let points = std::mem::take(&mut self.data.batch_points);
        let Some(template) = points.last().cloned() else {
            warn!("Empty batch, nothing to annotate");
            return Ok(());
        };

        let incoming: Vec<RawBar> = points
            .iter()
            .filter_map(|p| {
                let close = *p.fields_double.get(&self.options.field)?;
                Some(RawBar { time: p.time, close })
            })
            .collect();

        let first_new = self.merge_bars(incoming);
        let commands = self.run_indicator(first_new, Utc::now()).await;
        debug!("Indicator issued {} draws and removals", commands.len());

        begin.name = self.options.as_measurement.clone();
        begin.size = commands.len() as i64;
        self.send_response(Response {
            message: Some(response::Message::Begin(begin)),
        })
        .await
        .map_err(to_io)?;

        for command in &commands {
            let point = self.annotation_point(&template, command);
            self.send_response(Response {
                message: Some(response::Message::Point(point)),
            })
            .await
            .map_err(to_io)?;
        }

        let mut end = end.clone();
        end.name = self.options.as_measurement.clone();
        self.send_response(Response {
            message: Some(response::Message::End(end)),
        })
        .await
        .map_err(to_io)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&mut self) {
        debug!("Stop called, closing agent responses");
        let _ = self.responses.lock().await.close();
        debug!("AnnotationHandler stopped");
    }
}

impl std::fmt::Debug for AnnotationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationHandler")
            .field("options", &self.options)
            .field("history_len", &self.data.history.len())
            .field("annotations", &self.canvas.len())
            .finish()
    }
}
