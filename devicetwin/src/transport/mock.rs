//! In-memory transport that records what the engine sends.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::Transport;
use crate::error::{Error, Result};
use crate::types::QoS;

/// A message captured by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl Published {
    /// Payload as UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Transport double for tests and dry runs.
///
/// Starts connected. Clones share state.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug)]
struct MockTransportInner {
    connected: bool,
    published: Vec<Published>,
    subscriptions: Vec<(String, QoS)>,
    fail_next_publish: Option<String>,
    fail_subscribe: Option<String>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner {
                connected: true,
                published: Vec::new(),
                subscriptions: Vec::new(),
                fail_next_publish: None,
                fail_subscribe: None,
            })),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<Published> {
        self.inner.lock().published.clone()
    }

    /// Drains the captured publishes.
    pub fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut self.inner.lock().published)
    }

    /// Filters subscribed so far.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.inner.lock().subscriptions.clone()
    }

    /// Simulates a connection drop or recovery.
    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    /// Makes the next publish fail.
    pub fn fail_next_publish(&self, error: &str) {
        self.inner.lock().fail_next_publish = Some(error.to_string());
    }

    /// Makes every subscribe fail.
    pub fn fail_subscribe(&self, error: &str) {
        self.inner.lock().fail_subscribe = Some(error.to_string());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn subscribe(&self, filters: &[String], qos: QoS) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        if let Some(error) = &inner.fail_subscribe {
            return Err(Error::Subscribe(error.clone()));
        }
        inner
            .subscriptions
            .extend(filters.iter().map(|f| (f.clone(), qos)));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.connected {
            return Err(Error::NotConnected);
        }
        if let Some(error) = inner.fail_next_publish.take() {
            return Err(Error::Publish(error));
        }
        inner.published.push(Published {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().connected = false;
        Ok(())
    }
}
