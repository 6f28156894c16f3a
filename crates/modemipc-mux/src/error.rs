use std::time::Duration;

use modemipc_frame::MessageType;

/// Errors returned synchronously by transport operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Every sequence id in [1, 254] belongs to a queued or pending request.
    #[error("no free sequence id (254 requests outstanding)")]
    SequenceExhausted,

    /// The subscription id space is used up.
    #[error("no free subscription id")]
    SubscriptionExhausted,

    /// The payload does not fit in one frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Only GET, SET and EXEC may be enqueued.
    #[error("{0} is not a request type")]
    NotARequest(MessageType),

    /// Frame-level error from the channel.
    #[error("frame error: {0}")]
    Frame(#[from] modemipc_frame::FrameError),

    /// Transport-level error from the channel.
    #[error("transport error: {0}")]
    Transport(#[from] modemipc_transport::TransportError),

    /// The channel to the baseband is gone.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, MuxError>;

/// Failure delivered to a completion callback instead of a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// No response arrived before the request's deadline.
    #[error("no response within {0:?}")]
    TimedOut(Duration),
}
