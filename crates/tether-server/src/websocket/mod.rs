//! Per-connection WebSocket lifecycle.
//!
//! A [`session::ConnectionSession`] runs three concurrent activities over one
//! connection: the [`reader`] loop, the [`heartbeat`] prober and the [`echo`]
//! dispatcher. All writes go through one [`writer::WriteSerializer`], and the
//! first component to fail ends the session for all of them.

pub mod echo;
pub mod heartbeat;
pub mod reader;
pub mod session;
pub mod stats;
pub mod transport;
pub mod writer;
