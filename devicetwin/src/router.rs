//! Receive path: turns inbound messages into queued events.
//!
//! Runs on the transport's receive task. It only classifies, takes ownership
//! of the payload and enqueues; it never parses documents.

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::command::CommandRequest;
use crate::event::Event;
use crate::queue::EventSender;
use crate::topic::{TopicKind, Topics};
use crate::types::Status;

/// Classifies inbound messages and enqueues them.
#[derive(Debug, Clone)]
pub struct Router {
    topics: Topics,
    queue: EventSender,
    push_timeout: Duration,
}

impl Router {
    pub fn new(topics: Topics, queue: EventSender, push_timeout: Duration) -> Self {
        Self {
            topics,
            queue,
            push_timeout,
        }
    }

    /// Builds the event for an inbound message, if it needs processing.
    ///
    /// Reported-property acknowledgments are logged and consumed here.
    /// Unrecognized topics are logged and ignored.
    pub fn route(&self, topic: &str, payload: Bytes) -> Option<Event> {
        let c = match self.topics.classify(topic) {
            Ok(c) => c,
            Err(e) => {
                warn!("ignoring message: {}", e);
                return None;
            }
        };

        match c.kind {
            TopicKind::TwinReported => {
                info!(
                    "reported properties accepted (rid={})",
                    c.request_id.as_deref().unwrap_or("-")
                );
                None
            }
            TopicKind::TwinGet => Some(Event::TwinDocument {
                payload,
                status: c.status.unwrap_or(Status::Ok),
            }),
            TopicKind::TwinDesired => Some(Event::TwinDesiredUpdate {
                payload,
                version: c.version,
            }),
            TopicKind::Command => Some(Event::CommandInvoked(CommandRequest {
                name: c.command.unwrap_or_default(),
                request_id: c.request_id.unwrap_or_default(),
                payload,
            })),
        }
    }

    /// Routes and enqueues one message.
    ///
    /// Returns true when an event was queued. Waits at most the push
    /// timeout; a zero timeout never waits.
    pub async fn on_message(&self, topic: &str, payload: Bytes) -> bool {
        debug!("message on {} ({} bytes)", topic, payload.len());
        match self.route(topic, payload) {
            Some(event) if self.push_timeout.is_zero() => self.queue.try_push(event),
            Some(event) => self.queue.push(event, self.push_timeout).await,
            None => false,
        }
    }
}
