//! rawrecv - datagram-style receive over raw frame capture
//!
//! Captures link-layer frames with a kernel filter, walks
//! Ethernet -> IPv4/IPv6 -> TCP/UDP, and hands back only the payload and
//! sender address of frames that carry data. SYN-only handshake probes are
//! swallowed so the caller sees one message per data segment.

pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod telemetry;

pub use classifier::{classify, Classification, SkipReason};
pub use error::{Error, ReadError, Result};
pub use session::Session;
