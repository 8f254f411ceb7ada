//! In-memory frame source
//!
//! Frames are pushed through a `FrameInjector` and read back in order. The
//! installed filter is compiled to the same BPF program the kernel would run
//! and evaluated here, so replayed traffic is filtered like live traffic.

use super::bpf::Program;
use super::filter::{CaptureFilter, MAX_SNAPLEN};
use super::{CloseHandle, Closer, Direction, FrameSource, PacketDirection};
use crate::{Error, ReadError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Queue {
    frames: VecDeque<(Vec<u8>, PacketDirection)>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl Shared {
    // Every update is a single push, pop or clear; a poisoned queue is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, frame: Vec<u8>, direction: PacketDirection) -> bool {
        let mut queue = self.lock();
        if queue.closed {
            return false;
        }
        queue.frames.push_back((frame, direction));
        self.ready.notify_one();
        true
    }
}

impl Closer for Shared {
    fn close(&self) {
        let mut queue = self.lock();
        queue.closed = true;
        queue.frames.clear();
        self.ready.notify_all();
    }
}

/// Feeds frames into a `MemorySource`. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct FrameInjector {
    shared: Arc<Shared>,
}

impl FrameInjector {
    /// Queue a frame as if it had been received by this host.
    /// Returns false once the source is closed.
    pub fn inject(&self, frame: impl Into<Vec<u8>>) -> bool {
        self.shared.push(frame.into(), PacketDirection::Incoming)
    }

    /// Queue a frame as if this host had sent it
    pub fn inject_outgoing(&self, frame: impl Into<Vec<u8>>) -> bool {
        self.shared.push(frame.into(), PacketDirection::Outgoing)
    }

    /// Number of frames not yet read
    pub fn pending(&self) -> usize {
        self.shared.lock().frames.len()
    }
}

/// Frame source backed by an in-process queue
#[derive(Debug)]
pub struct MemorySource {
    shared: Arc<Shared>,
    program: Option<Program>,
    direction: Direction,
    direction_filter: bool,
    current: Vec<u8>,
}

impl MemorySource {
    pub fn new() -> (Self, FrameInjector) {
        let shared = Arc::new(Shared::default());
        let source = Self {
            shared: Arc::clone(&shared),
            program: None,
            direction: Direction::InOut,
            direction_filter: true,
            current: Vec::new(),
        };
        (source, FrameInjector { shared })
    }

    /// Behave like a driver that cannot filter by direction: sessions skip
    /// `set_direction` and outgoing frames are delivered too.
    pub fn without_direction_filter(mut self) -> Self {
        self.direction_filter = false;
        self
    }
}

impl FrameSource for MemorySource {
    fn set_filter(&mut self, expr: &str) -> Result<()> {
        let filter: CaptureFilter = expr.parse()?;
        self.program = Some(filter.compile(MAX_SNAPLEN));
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        if !self.direction_filter {
            return Err(Error::Direction(
                "direction filtering not supported by this source".into(),
            ));
        }
        self.direction = direction;
        Ok(())
    }

    fn supports_direction_filter(&self) -> bool {
        self.direction_filter
    }

    fn read_frame(&mut self) -> Result<&[u8]> {
        loop {
            let (mut frame, packet_direction) = {
                let mut queue = self.shared.lock();
                loop {
                    if queue.closed {
                        return Err(ReadError::Closed.into());
                    }
                    if let Some(entry) = queue.frames.pop_front() {
                        break entry;
                    }
                    queue = self
                        .shared
                        .ready
                        .wait(queue)
                        .unwrap_or_else(|e| e.into_inner());
                }
            };

            if !self.direction.admits(packet_direction) {
                continue;
            }

            if let Some(program) = &self.program {
                let keep = program.run(&frame) as usize;
                if keep == 0 {
                    continue;
                }
                frame.truncate(keep);
            }

            self.current = frame;
            return Ok(&self.current);
        }
    }

    fn close(&mut self) {
        self.shared.close();
    }

    fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(self.shared.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_frames_read_in_order() {
        let (mut source, injector) = MemorySource::new();
        injector.inject(vec![1, 2, 3]);
        injector.inject(vec![4]);

        assert_eq!(source.read_frame().unwrap(), &[1, 2, 3]);
        assert_eq!(source.read_frame().unwrap(), &[4]);
        assert_eq!(injector.pending(), 0);
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (mut source, _injector) = MemorySource::new();
        let handle = source.close_handle();

        let reader = thread::spawn(move || source.read_frame().map(|f| f.to_vec()));
        thread::sleep(Duration::from_millis(50));
        handle.close();

        let err = reader.join().unwrap().unwrap_err();
        assert!(err.is_closed());
    }

    #[test]
    fn test_inject_after_close_rejected() {
        let (mut source, injector) = MemorySource::new();
        source.close();
        source.close();
        assert!(!injector.inject(vec![0u8; 60]));
        assert!(source.read_frame().unwrap_err().is_closed());
    }

    #[test]
    fn test_inbound_only_drops_outgoing() {
        let (mut source, injector) = MemorySource::new();
        source.set_direction(Direction::In).unwrap();
        injector.inject_outgoing(vec![0xaa]);
        injector.inject(vec![0xbb]);

        assert_eq!(source.read_frame().unwrap(), &[0xbb]);
    }

    #[test]
    fn test_without_direction_filter() {
        let (source, _injector) = MemorySource::new();
        let mut source = source.without_direction_filter();

        assert!(!source.supports_direction_filter());
        let err = source.set_direction(Direction::In).unwrap_err();
        assert!(matches!(err, Error::Direction(_)));
    }

    #[test]
    fn test_bad_filter_rejected() {
        let (mut source, _injector) = MemorySource::new();
        let err = source.set_filter("port 9000").unwrap_err();
        assert!(matches!(err, Error::Filter(_)));
    }
}
