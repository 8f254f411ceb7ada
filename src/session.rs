//! Receive session
//!
//! Pulls frames from a source, classifies them and returns the first one
//! that carries data. Skips never reach the caller.

use crate::capture::{CaptureFilter, CloseHandle, Direction, FrameSource};
use crate::classifier::{classify, Classification};
use crate::telemetry::ReceiveStats;
use crate::{ReadError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace};

#[cfg(target_os = "linux")]
use crate::capture::AfPacketSource;
#[cfg(target_os = "linux")]
use crate::config::NetworkConfig;

/// A configured frame source plus the receive loop over it
#[derive(Debug)]
pub struct Session<S: FrameSource> {
    source: S,
    filter: String,
    inbound_only: bool,
    stats: Arc<ReceiveStats>,
    closed: bool,
}

#[cfg(target_os = "linux")]
impl Session<AfPacketSource> {
    /// Open a packet socket on `config.interface` and receive TCP data
    /// addressed to `config.port`.
    pub fn open(config: &NetworkConfig) -> Result<Self> {
        let source = AfPacketSource::open(
            &config.interface,
            config.promiscuous(),
            config.snaplen(),
        )?;
        Self::with_source(source, config.port)
    }
}

impl<S: FrameSource> Session<S> {
    /// Configure `source` for `port`: inbound only where the platform can,
    /// then the filter. Both happen before the first read.
    pub fn with_source(mut source: S, port: u16) -> Result<Self> {
        let inbound_only = source.supports_direction_filter();
        if inbound_only {
            source.set_direction(Direction::In)?;
        } else {
            debug!("direction filtering unsupported, outbound frames may be captured");
        }

        let filter = CaptureFilter::tcp_dst_port(port).to_string();
        source.set_filter(&filter)?;

        debug!(filter = %filter, inbound_only, "capture session opened");

        Ok(Self {
            source,
            filter,
            inbound_only,
            stats: Arc::new(ReceiveStats::new()),
            closed: false,
        })
    }

    /// Block until a frame with data arrives and return a copy of its
    /// payload with the sender's address.
    pub fn read(&mut self) -> Result<(Vec<u8>, SocketAddr)> {
        self.next_message(|payload| payload.to_vec())
    }

    /// Like `read`, but copies into `buf`. A payload longer than `buf` is
    /// truncated and the rest discarded, as with a datagram socket.
    pub fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.next_message(|payload| {
            let len = payload.len().min(buf.len());
            buf[..len].copy_from_slice(&payload[..len]);
            len
        })
    }

    fn next_message<T>(
        &mut self,
        mut take: impl FnMut(&[u8]) -> T,
    ) -> Result<(T, SocketAddr)> {
        if self.closed {
            return Err(ReadError::Closed.into());
        }

        loop {
            let frame = match self.source.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    if !e.is_closed() {
                        self.stats.record_read_error();
                    }
                    return Err(e);
                }
            };
            self.stats.record_frame(frame.len());

            match classify(frame) {
                Classification::Deliver { payload, addr } => {
                    self.stats.record_delivery(payload.len());
                    return Ok((take(payload), addr));
                }
                Classification::Skip(reason) => {
                    self.stats.record_skip(reason);
                    trace!(%reason, len = frame.len(), "frame skipped");
                }
            }
        }
    }

    /// Release the source. Further reads fail with `ReadError::Closed`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.source.close();
        debug!(filter = %self.filter, "capture session closed");
    }

    /// Handle for closing the session from another thread
    pub fn close_handle(&self) -> CloseHandle {
        self.source.close_handle()
    }

    pub fn stats(&self) -> Arc<ReceiveStats> {
        Arc::clone(&self.stats)
    }

    /// Installed filter expression
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Whether the source was restricted to inbound frames
    pub fn inbound_only(&self) -> bool {
        self.inbound_only
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: FrameSource> Drop for Session<S> {
    fn drop(&mut self) {
        self.close();
    }
}
