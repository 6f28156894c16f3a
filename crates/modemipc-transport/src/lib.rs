//! Byte-stream endpoints to a baseband processor.
//!
//! This is the lowest layer of modemipc. It opens the channel to the modem,
//! either a kernel device node or a Unix domain socket, and reports
//! readable/writable readiness so the layers above can run a
//! single-threaded event loop. Everything else builds on [`IpcStream`].

pub mod error;
pub mod readiness;
pub mod stream;
pub mod uds;

pub use error::{Result, TransportError};
pub use readiness::{wait_fd, Interest, Readiness};
pub use stream::IpcStream;
pub use uds::{open_endpoint, SocketEndpoint};
