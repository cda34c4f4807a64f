//! Device twin and direct-method synchronization over MQTT.
//!
//! A device keeps a "digital twin" on the hub in step with local state and
//! answers remotely invoked methods. Inbound messages are classified by topic
//! on the transport's receive task and queued; a single processing task pops
//! them, reconciles desired properties into local state, reports the result
//! back with acknowledgment metadata and answers methods.
//!
//! ```text
//! hub --> MqttTransport --> Router --> event queue --> Session
//!                                                        |
//!                              TwinSynchronizer <--------+
//!                              (DeviceState, CommandDispatcher)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use giztoy_devicetwin::{DeviceConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DeviceConfig::load("device.yaml")?;
//!     let session = Session::connect(&config).await?;
//!     let report = session.run().await;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

mod command;
mod config;
mod correlation;
mod document;
mod error;
mod event;
mod queue;
mod router;
mod session;
mod state;
mod synchronizer;
mod topic;
mod transport;
mod types;

pub use command::{
    CommandDispatcher, CommandError, CommandHandler, CommandRequest, CommandResponse,
    GetMaxMinReport, Ping,
};
pub use config::{API_VERSION, DeviceConfig, SessionConfig, TwinConfig};
pub use correlation::RequestIdGenerator;
pub use document::{Ack, PropertyDocument, TwinProperty, parse_desired_property};
pub use error::{Error, Result};
pub use event::Event;
pub use queue::{EventReceiver, EventSender, event_queue};
pub use router::Router;
pub use session::{Session, SessionReport, StopReason};
pub use state::{DeviceState, Reconciled};
pub use synchronizer::{SyncState, SyncStats, TwinSynchronizer};
pub use topic::{Classified, Outgoing, TopicKind, Topics};
pub use transport::{MockTransport, MqttTransport, Published, Transport};
pub use types::{QoS, Status};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::{
        CommandDispatcher, CommandHandler, DeviceConfig, DeviceState, Error, Event, MqttTransport,
        Result, Router, Session, SessionReport, Status, Topics, Transport, TwinSynchronizer,
    };
}
