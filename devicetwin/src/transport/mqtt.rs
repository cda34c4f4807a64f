//! Hub connection over rumqttc.
//!
//! The event loop runs on its own task. Every inbound publish goes through
//! the [`Router`]; a ConnAck sets the connected flag and any disconnect or
//! event loop error clears it, which ends the running session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Transport;
use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::router::Router;
use crate::types::QoS;

const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// MQTT connection to the hub.
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl MqttTransport {
    /// Connects to the hub and waits for the broker to accept the session.
    pub async fn connect(config: &DeviceConfig, router: Router) -> Result<Self> {
        let mut options = MqttOptions::new(config.client_id(), &config.hub_host, config.port);
        options.set_keep_alive(config.keep_alive());
        options.set_clean_session(true);
        if let Some(token) = &config.sas_token {
            options.set_credentials(config.username(), token);
        }
        if config.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(run_event_loop(
            event_loop,
            router,
            connected.clone(),
            cancel.clone(),
        ));

        info!(
            "connecting to {}:{} as {}",
            config.hub_host,
            config.port,
            config.client_id()
        );

        let timeout = config.connect_timeout();
        let start = tokio::time::Instant::now();
        while !connected.load(Ordering::SeqCst) {
            if start.elapsed() > timeout {
                cancel.cancel();
                return Err(Error::Connection(format!(
                    "no connack from {} within {:?}",
                    config.hub_host, timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Ok(Self {
            client,
            connected,
            cancel,
        })
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    router: Router,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("mqtt event loop cancelled");
                return;
            }
            event = event_loop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            info!("connected to hub");
                            connected.store(true, Ordering::SeqCst);
                        } else {
                            warn!("hub refused connection: {:?}", ack.code);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        router.on_message(&publish.topic, publish.payload).await;
                    }
                    Ok(Event::Incoming(Packet::SubAck(suback))) => {
                        debug!("subscription acknowledged: {:?}", suback.return_codes);
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("disconnected by hub");
                        connected.store(false, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("mqtt event loop error: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, filters: &[String], qos: QoS) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        for filter in filters {
            self.client
                .subscribe(filter.as_str(), qos.into())
                .await
                .map_err(|e| Error::Subscribe(format!("{}: {}", filter, e)))?;
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.client
            .publish(topic, qos.into(), false, payload.to_vec())
            .await
            .map_err(|e| Error::Publish(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        let result = self.client.disconnect().await;
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        result?;
        Ok(())
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
