//! The publish/subscribe channel the engine talks through.
//!
//! The engine only publishes and subscribes. Inbound messages reach it
//! through [`Router`](crate::Router), which the concrete transport calls from
//! its receive path.

mod mock;
mod mqtt;

pub use mock::{MockTransport, Published};
pub use mqtt::MqttTransport;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::QoS;

/// Outbound side of the hub connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribes to every filter with the given QoS.
    async fn subscribe(&self, filters: &[String], qos: QoS) -> Result<()>;

    /// Publishes one message.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<()>;

    /// False once the connection has been lost.
    fn is_connected(&self) -> bool;

    /// Disconnects from the hub.
    async fn close(&self) -> Result<()>;
}
