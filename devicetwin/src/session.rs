//! One device session: setup, the processing loop, teardown.
//!
//! Setup subscribes to the twin and method topics and requests the twin
//! document. The loop pops events with a bounded wait and hands each one to
//! the synchronizer. Each empty wait takes one poll interval off the session
//! watchdog. The loop ends when the transport disconnects, the watchdog
//! runs out, the receive path goes away, or the session is cancelled.
//! Teardown always runs.

use std::fmt;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::CommandDispatcher;
use crate::config::{DeviceConfig, SessionConfig};
use crate::document::PropertyDocument;
use crate::error::Result;
use crate::queue::{EventReceiver, event_queue};
use crate::router::Router;
use crate::synchronizer::TwinSynchronizer;
use crate::transport::{MqttTransport, Transport};
use crate::types::QoS;

/// Outcome of a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Setup and teardown steps that succeeded.
    pub passed: u32,
    /// Setup and teardown steps that failed.
    pub failed: u32,
    pub events_processed: u64,
    pub events_dropped: u64,
    pub reports_published: u64,
    pub commands_answered: u64,
    pub telemetry_sent: u64,
    pub publish_failures: u64,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "passed={} failed={} events={} dropped={} reports={} commands={} telemetry={} publish_failures={}",
            self.passed,
            self.failed,
            self.events_processed,
            self.events_dropped,
            self.reports_published,
            self.commands_answered,
            self.telemetry_sent,
            self.publish_failures,
        )
    }
}

/// Why the processing loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Disconnected,
    WatchdogExpired,
    QueueClosed,
    Cancelled,
}

pub struct Session<T: Transport> {
    transport: T,
    synchronizer: TwinSynchronizer,
    events: EventReceiver,
    config: SessionConfig,
    cancel: CancellationToken,
    report: SessionReport,
}

impl Session<MqttTransport> {
    /// Connects to the hub described by `config`.
    pub async fn connect(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        let topics = config.topics()?;
        let (tx, rx) = event_queue(config.session.queue_capacity);
        let router = Router::new(topics, tx, config.session.push_timeout());
        let transport = MqttTransport::connect(config, router).await?;
        Self::new(transport, config, rx)
    }
}

impl<T: Transport> Session<T> {
    /// Session over an already connected transport.
    ///
    /// `events` is the consumer half of the queue the transport's router
    /// feeds. Fails when `config` does not validate.
    pub fn new(transport: T, config: &DeviceConfig, events: EventReceiver) -> Result<Self> {
        config.validate()?;
        let synchronizer = TwinSynchronizer::with_config(
            config.topics()?,
            &config.twin,
            CommandDispatcher::default(),
        );
        Ok(Self::with_synchronizer(
            transport,
            synchronizer,
            events,
            config.session.clone(),
        ))
    }

    pub fn with_synchronizer(
        transport: T,
        synchronizer: TwinSynchronizer,
        events: EventReceiver,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            synchronizer,
            events,
            config,
            cancel: CancellationToken::new(),
            report: SessionReport::default(),
        }
    }

    /// Token that stops the processing loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn synchronizer(&self) -> &TwinSynchronizer {
        &self.synchronizer
    }

    /// Runs setup, the processing loop and teardown.
    pub async fn run(mut self) -> SessionReport {
        match self.setup().await {
            Ok(()) => {
                let reason = self.process().await;
                info!("session loop stopped: {:?}", reason);
            }
            Err(e) => warn!("session setup failed: {}", e),
        }
        self.teardown().await;
        self.finish()
    }

    /// Subscribes and requests the twin document.
    pub async fn setup(&mut self) -> Result<()> {
        let filters = self.synchronizer.topics().subscriptions();
        let subscribed = self.transport.subscribe(&filters, QoS::AtLeastOnce).await;
        self.step("subscribe", subscribed)?;

        let started = self.synchronizer.start(&self.transport).await;
        self.step("twin get", started)
    }

    /// Processes events until the loop has a reason to stop.
    pub async fn process(&mut self) -> StopReason {
        let poll = self.config.poll_interval();
        let telemetry = self.config.telemetry_interval();
        let mut next_telemetry = telemetry.map(|interval| Instant::now() + interval);
        let mut remaining = self.config.duration();

        loop {
            if !self.transport.is_connected() {
                return StopReason::Disconnected;
            }
            if remaining.is_zero() {
                return StopReason::WatchdogExpired;
            }
            if self.events.is_closed() {
                return StopReason::QueueClosed;
            }

            let event = tokio::select! {
                _ = self.cancel.cancelled() => return StopReason::Cancelled,
                event = self.events.pop(poll) => event,
            };
            match event {
                Some(event) => self.synchronizer.handle_event(&self.transport, event).await,
                // The watchdog only counts waits that came back empty.
                None => remaining = remaining.saturating_sub(poll),
            }

            if let (Some(due), Some(interval)) = (next_telemetry, telemetry) {
                if Instant::now() >= due {
                    self.send_telemetry().await;
                    next_telemetry = Some(due + interval);
                }
            }
        }
    }

    /// Disconnects from the hub.
    pub async fn teardown(&mut self) {
        let closed = self.transport.close().await;
        let _ = self.step("disconnect", closed);
    }

    async fn send_telemetry(&mut self) {
        let current = self.synchronizer.state().current();
        let payload = match PropertyDocument::new().property("temperature", current).to_vec() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("telemetry not sent: {}", e);
                return;
            }
        };
        let topic = self.synchronizer.topics().telemetry();
        match self.transport.publish(&topic, &payload, QoS::AtMostOnce).await {
            Ok(()) => self.report.telemetry_sent += 1,
            Err(e) => {
                warn!("telemetry publish failed: {}", e);
                self.report.publish_failures += 1;
            }
        }
    }

    fn step(&mut self, name: &str, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) => {
                info!("{}: passed", name);
                self.report.passed += 1;
            }
            Err(e) => {
                warn!("{}: failed: {}", name, e);
                self.report.failed += 1;
            }
        }
        result
    }

    fn finish(&self) -> SessionReport {
        let stats = self.synchronizer.stats();
        let report = SessionReport {
            events_processed: stats.events_processed,
            events_dropped: self.events.dropped(),
            reports_published: stats.reports_published,
            commands_answered: stats.commands_answered,
            publish_failures: self.report.publish_failures + stats.publish_failures,
            ..self.report
        };
        info!("session finished: {}", report);
        report
    }
}
