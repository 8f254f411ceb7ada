//! Header views for the layers a captured frame is walked through
//!
//! Every parser borrows the capture buffer and bounds-checks on `parse`,
//! so accessors never index past the data they were given.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod types;
pub mod udp;

pub use types::*;
