//! Host-side IPC with a cellular baseband processor.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte streams to the modem device node or a Unix socket
//! - [`frame`]: the FMT wire format and message reader/writer
//! - [`mux`]: request queue, response correlation, notification fan-out

/// Re-export transport types.
pub mod transport {
    pub use modemipc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use modemipc_frame::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use modemipc_mux::*;
}
