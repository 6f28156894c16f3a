use std::time::Duration;

use modemipc_frame::DEFAULT_MAX_PAYLOAD;

/// Default time a sent request may wait for its response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for one [`Transport`](crate::Transport) instance.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline applied to every request that expects a response.
    /// `None` lets requests wait forever.
    pub response_timeout: Option<Duration>,
    /// Largest payload accepted by `enqueue`.
    pub max_payload_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl TransportConfig {
    pub fn with_response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }
}
