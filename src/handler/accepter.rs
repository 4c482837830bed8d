//! Accepter implementation for the annotation UDF server.
//!
//! Each accepted Unix socket connection gets its own agent and its own
//! `AnnotationHandler`, so indicator state is never shared between tasks.
//! The economic calendar cache is the one exception and is shared on purpose.

use async_std::{
    os::unix::net::UnixStream,
    sync::{Arc, Mutex},
    task::{self, block_on},
};
use async_trait::async_trait;
use kapacitor_udf::{agent::Agent, traits::AccepterTrait};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, error, info};

use crate::{
    calendar::{CalendarCache, HttpCalendarSource},
    handler::{annotation_handler::AnnotationHandler, config::AnnotationOptions},
};

/// An accepter for new UDF connections.
///
/// This struct keeps track of the number of connections it has accepted
/// and creates a new agent for each connection.
#[derive(Debug)]
pub struct Accepter {
    /// Counter for the number of connections accepted.
    count: Arc<AtomicI64>,
    /// Options every new handler starts from, before Kapacitor's `init`.
    options: AnnotationOptions,
    /// Economic calendar downloads, shared across connections.
    calendar: Arc<CalendarCache>,
}

impl Accepter {
    /// Creates a new `Accepter` instance.
    ///
    /// # Arguments
    ///
    /// * `options` - Base options for every handler.
    /// * `calendar` - Process wide economic calendar cache.
    pub fn new(options: AnnotationOptions, calendar: Arc<CalendarCache>) -> Self {
        Accepter {
            count: Arc::new(AtomicI64::new(0)),
            options,
            calendar,
        }
    }
}

impl Default for Accepter {
    /// Default options, calendar downloaded hourly from the public feed.
    fn default() -> Self {
        Self::new(
            AnnotationOptions::default(),
            Arc::new(CalendarCache::hourly(Box::new(HttpCalendarSource::default()))),
        )
    }
}

#[async_trait]
impl AccepterTrait for Accepter {
    /// Accepts a new connection and sets up an agent to handle it.
    ///
    /// # Arguments
    ///
    /// * `stream` - The Unix stream for the new connection.
    fn accept(&self, stream: UnixStream) {
        let count = self.count.fetch_add(1, Ordering::SeqCst);
        debug!("Accept() called, connection count: {}", count);

        let mut agent = Agent::new(Box::new(stream.clone()), Box::new(stream));
        let responses = agent.responses().clone();

        let handler = Box::new(block_on(AnnotationHandler::new(
            responses,
            self.options.clone(),
            Arc::clone(&self.calendar),
        )));
        agent.set_handler(Some(handler));

        let agent = Arc::new(Mutex::new(agent));

        info!("Starting agent for connection {}", count);

        task::spawn(async move {
            if let Err(e) = agent.lock().await.start() {
                error!("Agent for connection {} finished with error: {}", count, e);
                std::process::exit(1);
            }
            info!("Agent for connection {} finished", count);
        });
    }
}
