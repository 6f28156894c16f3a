//! Request/response multiplexing over one baseband channel.
//!
//! Feature drivers share a single FMT channel. This crate sits between
//! them and the wire:
//!
//! - outbound requests are queued and sent one per writable event, in
//!   enqueue order, each tagged with a sequence id in [1, 254]
//! - responses are matched to their request by the echoed sequence id,
//!   falling back to the command id for modems that do not echo it
//! - notifications and indications fan out to every subscriber of their
//!   (class, command) pair, in registration order
//!
//! Everything runs on one thread. Callbacks get `&mut Transport` so they can
//! queue follow-up requests or drop their own subscription mid-dispatch.
//!
//! ```no_run
//! use modemipc_frame::MessageType;
//! use modemipc_mux::{Device, TransportConfig};
//!
//! # fn main() -> modemipc_mux::Result<()> {
//! let mut device = Device::open("/dev/umts_ipc0", TransportConfig::default())?;
//! device.transport_mut().request(0x0A01, MessageType::Get, &b""[..], |_, resp| {
//!     if let Ok(resp) = resp {
//!         println!("{} bytes", resp.payload.len());
//!     }
//! })?;
//! device.settle(None)?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod pending;
mod queue;
pub mod registry;
pub mod sequence;
pub mod transport;

pub use channel::{Channel, StreamChannel};
pub use config::{TransportConfig, DEFAULT_RESPONSE_TIMEOUT};
pub use device::Device;
pub use error::{MuxError, RequestError, Result};
pub use pending::Correlation;
pub use registry::{MessageClass, SubscriptionId};
pub use sequence::{SequenceAllocator, SequenceId, MAX_SEQUENCE, MIN_SEQUENCE};
pub use transport::{
    CompletionFn, Drained, Notification, NotifyFn, Response, ResponseResult, Transport,
};
