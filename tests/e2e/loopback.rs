//! Loopback traffic helpers

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A kernel TCP listener on 127.0.0.1 that drains whatever it is sent
pub struct Sink {
    pub addr: SocketAddr,
    handle: JoinHandle<Vec<u8>>,
}

impl Sink {
    pub fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");

        let handle = thread::spawn(move || {
            let mut received = Vec::new();
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.read_to_end(&mut received);
            }
            received
        });

        Self { addr, handle }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Bytes the kernel stack delivered to the listener
    pub fn join(self) -> Vec<u8> {
        self.handle.join().unwrap_or_default()
    }
}

/// Connect to `addr` after `delay`, send `payload`, and return the local
/// address the connection used.
pub fn send_after(
    addr: SocketAddr,
    payload: &'static [u8],
    delay: Duration,
) -> JoinHandle<SocketAddr> {
    thread::spawn(move || {
        thread::sleep(delay);
        let mut stream = TcpStream::connect(addr).expect("connect over loopback");
        stream.set_nodelay(true).expect("disable Nagle");
        stream.write_all(payload).expect("send payload");
        let local = stream.local_addr().expect("local address");
        // Keep the connection open long enough for the capture to see it
        thread::sleep(Duration::from_millis(100));
        local
    })
}
