//! Twin synchronization state machine.
//!
//! ```text
//! Init --start--> AwaitingDocument --full document--> Synced
//!                                                       |  ^
//!                                                       +--+ desired patch
//! ```
//!
//! Each desired value is reconciled into [`DeviceState`] and acknowledged
//! with a reported patch. When a patch raises the session maximum, a second
//! report of the maximum follows without acknowledgment metadata.
//!
//! The synchronizer is owned by the processing task and is the only writer
//! of device state. Publish failures are logged and counted; processing
//! continues with the next event.

use tracing::{debug, info, warn};

use crate::command::CommandDispatcher;
use crate::config::TwinConfig;
use crate::correlation::RequestIdGenerator;
use crate::document::{Ack, PropertyDocument, TwinProperty, parse_desired_property};
use crate::error::Result;
use crate::event::Event;
use crate::state::DeviceState;
use crate::topic::{Outgoing, Topics};
use crate::transport::Transport;
use crate::types::QoS;

/// Synchronizer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Init,
    AwaitingDocument,
    Synced,
}

/// Counters kept over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub events_processed: u64,
    pub reports_published: u64,
    pub commands_answered: u64,
    pub publish_failures: u64,
}

pub struct TwinSynchronizer {
    topics: Topics,
    desired_property: String,
    max_property: String,
    ids: RequestIdGenerator,
    state: DeviceState,
    dispatcher: CommandDispatcher,
    sync_state: SyncState,
    stats: SyncStats,
}

impl TwinSynchronizer {
    /// Synchronizer with the default property names and built-in methods.
    pub fn new(topics: Topics) -> Self {
        Self::with_config(topics, &TwinConfig::default(), CommandDispatcher::default())
    }

    pub fn with_config(topics: Topics, twin: &TwinConfig, dispatcher: CommandDispatcher) -> Self {
        debug!(
            "direct methods: {}",
            dispatcher.names().collect::<Vec<_>>().join(", ")
        );
        Self {
            topics,
            desired_property: twin.desired_property.clone(),
            max_property: twin.max_property.clone(),
            ids: RequestIdGenerator::new(),
            state: DeviceState::new(twin.baseline),
            dispatcher,
            sync_state: SyncState::Init,
            stats: SyncStats::default(),
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Requests the full twin document.
    ///
    /// A failure here aborts session setup.
    pub async fn start<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<()> {
        let topic = self.topics.build(Outgoing::TwinGet, &self.ids.next_id());
        transport.publish(&topic, b"", QoS::AtMostOnce).await?;
        info!("requested twin document on {}", topic);
        self.sync_state = SyncState::AwaitingDocument;
        Ok(())
    }

    /// Processes one dequeued event to completion.
    pub async fn handle_event<T: Transport + ?Sized>(&mut self, transport: &T, event: Event) {
        self.stats.events_processed += 1;
        match event {
            Event::TwinDocument { payload, status } => {
                if !status.is_success() {
                    warn!("twin get failed with status {}", status);
                    return;
                }
                if self.sync_state != SyncState::AwaitingDocument {
                    debug!("twin document received in state {:?}", self.sync_state);
                }
                match parse_desired_property(&payload, &self.desired_property, true) {
                    Some(prop) => self.apply_desired(transport, prop, false).await,
                    None => info!("twin document has no desired {}", self.desired_property),
                }
                self.sync_state = SyncState::Synced;
            }
            Event::TwinDesiredUpdate { payload, version } => {
                match parse_desired_property(&payload, &self.desired_property, false) {
                    Some(prop) => self.apply_desired(transport, prop, true).await,
                    None => info!(
                        "desired patch (version {:?}) has no {}",
                        version, self.desired_property
                    ),
                }
            }
            Event::CommandInvoked(req) => {
                info!("method {} invoked (rid={})", req.name, req.request_id);
                let resp = self.dispatcher.handle(&req, &self.state);
                let topic = self
                    .topics
                    .build(Outgoing::CommandResponse(resp.status), &resp.request_id);
                if self.publish(transport, &topic, &resp.payload).await {
                    self.stats.commands_answered += 1;
                }
            }
        }
    }

    async fn apply_desired<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        prop: TwinProperty,
        report_new_maximum: bool,
    ) {
        info!(
            "desired {} = {} (version {})",
            prop.name, prop.value, prop.version
        );
        let Some(reconciled) = self.state.reconcile(prop.value) else {
            return;
        };

        let ack = PropertyDocument::new()
            .property(&self.desired_property, self.state.current())
            .ack(Ack::success(prop.version));
        self.report(transport, &ack).await;

        if report_new_maximum && reconciled.new_maximum {
            let max = PropertyDocument::new().property(&self.max_property, self.state.maximum());
            self.report(transport, &max).await;
        }
    }

    async fn report<T: Transport + ?Sized>(&mut self, transport: &T, doc: &PropertyDocument) {
        let payload = match doc.to_vec() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("report not sent: {}", e);
                return;
            }
        };
        let topic = self.topics.build(Outgoing::TwinReported, &self.ids.next_id());
        if self.publish(transport, &topic, &payload).await {
            self.stats.reports_published += 1;
        }
    }

    async fn publish<T: Transport + ?Sized>(&mut self, transport: &T, topic: &str, payload: &[u8]) -> bool {
        match transport.publish(topic, payload, QoS::AtMostOnce).await {
            Ok(()) => {
                debug!("published {} bytes to {}", payload.len(), topic);
                true
            }
            Err(e) => {
                warn!("publish to {} failed: {}", topic, e);
                self.stats.publish_failures += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crate::types::Status;
    use bytes::Bytes;

    fn setup() -> (TwinSynchronizer, MockTransport) {
        let topics = Topics::new("dev-1").unwrap();
        (TwinSynchronizer::new(topics), MockTransport::new())
    }

    #[tokio::test]
    async fn test_start_requests_document() {
        let (mut sync, t) = setup();
        assert_eq!(sync.sync_state(), SyncState::Init);
        sync.start(&t).await.unwrap();
        assert_eq!(sync.sync_state(), SyncState::AwaitingDocument);

        let sent = t.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "$iothub/twin/GET/?$rid=0");
        assert!(sent[0].payload.is_empty());
    }

    #[tokio::test]
    async fn test_start_failure() {
        let (mut sync, t) = setup();
        t.fail_next_publish("offline");
        assert!(sync.start(&t).await.is_err());
        assert_eq!(sync.sync_state(), SyncState::Init);
    }

    #[tokio::test]
    async fn test_document_without_property_still_syncs() {
        let (mut sync, t) = setup();
        sync.start(&t).await.unwrap();
        t.take_published();

        let event = Event::TwinDocument {
            payload: Bytes::from_static(br#"{"desired":{"$version":1},"reported":{}}"#),
            status: Status::Ok,
        };
        sync.handle_event(&t, event).await;
        assert_eq!(sync.sync_state(), SyncState::Synced);
        assert!(t.published().is_empty());
        assert_eq!(sync.state().sample_count(), 1);
    }

    #[tokio::test]
    async fn test_error_status_is_ignored() {
        let (mut sync, t) = setup();
        sync.start(&t).await.unwrap();
        t.take_published();

        let event = Event::TwinDocument {
            payload: Bytes::from_static(br#"{"desired":{"targetTemperature":30,"$version":1}}"#),
            status: Status::Other(429),
        };
        sync.handle_event(&t, event).await;
        assert_eq!(sync.sync_state(), SyncState::AwaitingDocument);
        assert!(t.published().is_empty());
        assert_eq!(sync.state().current(), 22.0);
    }

    #[tokio::test]
    async fn test_document_reports_ack_only() {
        let (mut sync, t) = setup();
        sync.start(&t).await.unwrap();
        t.take_published();

        let event = Event::TwinDocument {
            payload: Bytes::from_static(br#"{"desired":{"targetTemperature":30.0,"$version":3}}"#),
            status: Status::Ok,
        };
        sync.handle_event(&t, event).await;

        let sent = t.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].text(),
            r#"{"targetTemperature":{"value":30.00,"ac":200,"av":3,"ad":"success"}}"#
        );
        assert_eq!(sync.state().maximum(), 30.0);
        assert_eq!(sync.sync_state(), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_patch_below_max_reports_once() {
        let (mut sync, t) = setup();
        let event = Event::TwinDesiredUpdate {
            payload: Bytes::from_static(br#"{"targetTemperature":18.25,"$version":6}"#),
            version: Some(6),
        };
        sync.handle_event(&t, event).await;

        let sent = t.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].text(),
            r#"{"targetTemperature":{"value":18.25,"ac":200,"av":6,"ad":"success"}}"#
        );
        assert_eq!(sync.state().minimum(), 18.25);
        assert_eq!(sync.stats().reports_published, 1);
    }

    #[tokio::test]
    async fn test_malformed_patch_is_skipped() {
        let (mut sync, t) = setup();
        let event = Event::TwinDesiredUpdate {
            payload: Bytes::from_static(b"{not json"),
            version: None,
        };
        sync.handle_event(&t, event).await;
        assert!(t.published().is_empty());
        assert_eq!(sync.stats().events_processed, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_continues() {
        let (mut sync, t) = setup();
        t.fail_next_publish("busy");
        let event = Event::TwinDesiredUpdate {
            payload: Bytes::from_static(br#"{"targetTemperature":35,"$version":2}"#),
            version: Some(2),
        };
        sync.handle_event(&t, event).await;

        let sent = t.published();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text(), r#"{"maxTempSinceLastReboot":35.00}"#);
        assert_eq!(sync.stats().publish_failures, 1);
        assert_eq!(sync.state().maximum(), 35.0);
    }

    #[tokio::test]
    async fn test_report_request_ids_are_fresh() {
        let (mut sync, t) = setup();
        sync.start(&t).await.unwrap();
        let event = Event::TwinDesiredUpdate {
            payload: Bytes::from_static(br#"{"targetTemperature":40,"$version":2}"#),
            version: Some(2),
        };
        sync.handle_event(&t, event).await;

        let topics: Vec<_> = t.published().into_iter().map(|p| p.topic).collect();
        assert_eq!(
            topics,
            vec![
                "$iothub/twin/GET/?$rid=0",
                "$iothub/twin/PATCH/properties/reported/?$rid=1",
                "$iothub/twin/PATCH/properties/reported/?$rid=2",
            ]
        );
    }
}
