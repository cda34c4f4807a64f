//! Direct method dispatch.
//!
//! Every request yields exactly one [`CommandResponse`]: the handler's result
//! with status 200, `{}` with 404 when no handler matches, or `{}` with 400
//! when the handler rejects the payload.

use bytes::Bytes;
use chrono::Local;
use serde::Serialize;
use tracing::{debug, warn};

use crate::document::PropertyDocument;
use crate::state::DeviceState;
use crate::types::Status;

/// Body of every non-success response.
pub const EMPTY_BODY: &[u8] = b"{}";

/// Format of `endTime` in the max/min report.
pub const REPORT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// An inbound method invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub name: String,
    pub request_id: String,
    pub payload: Bytes,
}

/// The single response to a [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub request_id: String,
    pub status: Status,
    pub payload: Vec<u8>,
}

impl CommandResponse {
    fn empty(request_id: &str, status: Status) -> Self {
        Self {
            request_id: request_id.to_string(),
            status,
            payload: EMPTY_BODY.to_vec(),
        }
    }
}

/// Error returned by a command handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("encode: {0}")]
    Encode(String),
}

/// A named method the device answers.
pub trait CommandHandler: Send + Sync {
    /// Method name, matched exactly.
    fn name(&self) -> &str;

    /// Produces the response body for a request payload.
    fn handle(&self, payload: &[u8], state: &DeviceState) -> Result<Vec<u8>, CommandError>;
}

/// Routes requests to handlers by exact name.
pub struct CommandDispatcher {
    handlers: Vec<Box<dyn CommandHandler>>,
}

impl Default for CommandDispatcher {
    /// Dispatcher with the built-in `ping` and `getMaxMinReport` methods.
    fn default() -> Self {
        let mut d = Self::empty();
        d.register(Ping);
        d.register(GetMaxMinReport);
        d
    }
}

impl CommandDispatcher {
    /// Dispatcher with no methods.
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Adds a handler. A later handler with the same name is never reached.
    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.push(Box::new(handler));
    }

    /// Registered method names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|h| h.name())
    }

    /// Answers a request.
    pub fn handle(&self, req: &CommandRequest, state: &DeviceState) -> CommandResponse {
        let Some(handler) = self.handlers.iter().find(|h| h.name() == req.name) else {
            debug!("no handler for method {}", req.name);
            return CommandResponse::empty(&req.request_id, Status::NotFound);
        };

        match handler.handle(&req.payload, state) {
            Ok(payload) => CommandResponse {
                request_id: req.request_id.clone(),
                status: Status::Ok,
                payload,
            },
            Err(e) => {
                warn!("method {} failed: {}", req.name, e);
                CommandResponse::empty(&req.request_id, Status::BadRequest)
            }
        }
    }
}

/// Liveness check. Always answers `{"response":"pong"}`.
pub struct Ping;

#[derive(Serialize)]
struct Pong {
    response: &'static str,
}

impl CommandHandler for Ping {
    fn name(&self) -> &str {
        "ping"
    }

    fn handle(&self, _payload: &[u8], _state: &DeviceState) -> Result<Vec<u8>, CommandError> {
        serde_json::to_vec(&Pong { response: "pong" }).map_err(|e| CommandError::Encode(e.to_string()))
    }
}

/// Reports max, min and average temperature since a caller-supplied time.
///
/// The payload is a JSON string echoed back as `startTime`.
pub struct GetMaxMinReport;

impl CommandHandler for GetMaxMinReport {
    fn name(&self) -> &str {
        "getMaxMinReport"
    }

    fn handle(&self, payload: &[u8], state: &DeviceState) -> Result<Vec<u8>, CommandError> {
        let since: String = serde_json::from_slice(payload)
            .map_err(|e| CommandError::BadRequest(format!("since: {}", e)))?;
        if since.is_empty() {
            return Err(CommandError::BadRequest("since is empty".to_string()));
        }

        let now = Local::now().format(REPORT_TIME_FORMAT).to_string();
        PropertyDocument::new()
            .property("maxTemp", state.maximum())
            .property("minTemp", state.minimum())
            .property("avgTemp", state.average())
            .time_range(since, now)
            .to_vec()
            .map_err(|e| CommandError::Encode(e.to_string()))
    }
}
