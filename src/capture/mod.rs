//! Frame sources
//!
//! A frame source hands out one link-layer frame per read and is configured
//! once with a filter expression and a capture direction. Backends:
//! - AF_PACKET: raw socket on a Linux interface, kernel-side BPF filter
//! - Memory: in-process queue fed by a `FrameInjector`, filter run in userspace

#[cfg(target_os = "linux")]
mod af_packet;
pub mod bpf;
pub mod filter;
mod memory;

#[cfg(target_os = "linux")]
pub use af_packet::AfPacketSource;
pub use filter::{CaptureFilter, FilterProtocol};
pub use memory::{FrameInjector, MemorySource};

use crate::Result;
use std::fmt;
use std::sync::Arc;

/// Which traffic a source should capture, relative to the local host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Frames received by this host
    In,
    /// Frames sent by this host
    Out,
    #[default]
    InOut,
}

impl Direction {
    pub fn admits(self, packet: PacketDirection) -> bool {
        match (self, packet) {
            (Direction::InOut, _) => true,
            (Direction::In, PacketDirection::Incoming) => true,
            (Direction::Out, PacketDirection::Outgoing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("in"),
            Direction::Out => f.write_str("out"),
            Direction::InOut => f.write_str("inout"),
        }
    }
}

/// Direction of a single captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Incoming,
    Outgoing,
}

/// Whether capture drivers on this platform honour a direction restriction.
///
/// The Windows capture driver accepts the call but filters unreliably, so
/// sessions skip the attempt there and live with outbound frames.
pub fn supports_direction_filter() -> bool {
    !cfg!(windows)
}

/// A blocking source of raw link-layer frames
pub trait FrameSource: Send {
    /// Install a filter expression; only matching frames are returned
    fn set_filter(&mut self, expr: &str) -> Result<()>;

    /// Restrict capture to one direction
    fn set_direction(&mut self, direction: Direction) -> Result<()>;

    /// Whether `set_direction` should be attempted at all
    fn supports_direction_filter(&self) -> bool {
        supports_direction_filter()
    }

    /// Block until the next frame arrives.
    ///
    /// The slice borrows the source's buffer and is overwritten by the next
    /// call. Fails with `ReadError::Closed` once the source has been closed.
    fn read_frame(&mut self) -> Result<&[u8]>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);

    /// A handle that can close the source from another thread
    fn close_handle(&self) -> CloseHandle;
}

/// Something that can wake and shut down a blocked reader
pub trait Closer: Send + Sync {
    fn close(&self);
}

/// Cloneable, thread-safe handle that closes a frame source.
///
/// A reader blocked in `read_frame` returns `ReadError::Closed` shortly
/// after `close` is called.
#[derive(Clone)]
pub struct CloseHandle(Arc<dyn Closer>);

impl CloseHandle {
    pub fn new(closer: Arc<dyn Closer>) -> Self {
        Self(closer)
    }

    pub fn close(&self) {
        self.0.close();
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle").finish_non_exhaustive()
    }
}
