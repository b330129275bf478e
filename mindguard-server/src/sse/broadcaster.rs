//! SSE broadcaster for real-time viewer updates

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use mindguard_common::events::FusionEvent;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Broadcaster fans fusion events out to every connected viewer
///
/// Slow viewers lag and skip events; publishers never wait on them.
#[derive(Clone)]
pub struct SseBroadcaster {
    tx: broadcast::Sender<FusionEvent>,
}

impl SseBroadcaster {
    /// Create a new SSE broadcaster
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        info!("SSE broadcaster initialized with capacity {}", capacity);
        Self { tx }
    }

    /// Broadcast an event, ignoring if no viewers are connected
    pub fn broadcast_lossy(&self, event: FusionEvent) {
        if let Ok(count) = self.tx.send(event) {
            debug!("Broadcast event to {} clients", count);
        }
    }

    /// Subscribe directly to the event channel
    pub fn subscribe(&self) -> broadcast::Receiver<FusionEvent> {
        self.tx.subscribe()
    }

    /// Get current number of connected clients
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Create an SSE stream for a new client connection
    pub fn subscribe_stream(&self) -> impl Stream<Item = Result<Event, Infallible>> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| async move {
            match result {
                Ok(event) => Event::default()
                    .event(event.event_type())
                    .id(Uuid::new_v4().to_string())
                    .json_data(&event)
                    .map_err(|e| warn!("Failed to serialize event: {}", e))
                    .ok()
                    .map(Ok),
                Err(e) => {
                    // Lagged receiver: events were skipped, keep streaming
                    warn!("SSE client error: {:?}", e);
                    None
                }
            }
        })
    }

    /// Axum SSE response for GET /events
    pub fn handle_sse_connection(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        info!("New SSE client connected, total clients: {}", self.client_count() + 1);

        Sse::new(self.subscribe_stream()).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
    }
}
