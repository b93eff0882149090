//! Test helpers
//!
//! [`MockPublisher`] stands in for the MQTT link: it records every publish
//! and can be switched into an outage to exercise the fail-fast path.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::publisher::{LinkState, Publisher};

/// Recording publisher for tests
pub struct MockPublisher {
    state: Mutex<LinkState>,
    published: Mutex<Vec<(String, Bytes)>>,
}

impl MockPublisher {
    /// A connected mock
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LinkState::Connected),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Change the simulated link state
    pub fn set_state(&self, state: LinkState) {
        *self.state.lock() = state;
    }

    /// Everything published so far
    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().clone()
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        if !self.state.lock().is_connected() {
            return Err(BridgeError::BrokerUnavailable);
        }
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }

    fn link_state(&self) -> LinkState {
        *self.state.lock()
    }
}
