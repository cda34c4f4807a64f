//! Inbound events handed from the network callback to the processing task.

use bytes::Bytes;

use crate::command::CommandRequest;
use crate::types::Status;

/// A classified inbound message with an owned payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Response to a twin get. Carries the full document.
    TwinDocument { payload: Bytes, status: Status },
    /// Desired-property patch pushed by the hub.
    TwinDesiredUpdate { payload: Bytes, version: Option<i64> },
    /// Direct method invocation.
    CommandInvoked(CommandRequest),
}

impl Event {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TwinDocument { .. } => "twin_document",
            Event::TwinDesiredUpdate { .. } => "twin_desired",
            Event::CommandInvoked(_) => "command",
        }
    }
}
