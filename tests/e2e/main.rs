//! Live capture tests on the loopback interface
//!
//! Run with: sudo -E cargo test --test e2e --features e2e

#![cfg(target_os = "linux")]

mod loopback;

use loopback::{send_after, Sink};
use rawrecv::config::NetworkConfig;
use rawrecv::{Session, SkipReason};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn loopback_config(port: u16) -> NetworkConfig {
    NetworkConfig {
        promiscuous: Some(false),
        ..NetworkConfig::new("lo", port)
    }
}

/// A real handshake on lo: the SYN and the bare ACK are skipped and the
/// data segment is delivered with the client's address.
#[test]
#[cfg_attr(not(feature = "e2e"), ignore)]
fn test_receive_over_loopback() {
    let sink = Sink::bind();
    let mut session = Session::open(&loopback_config(sink.port())).expect("open lo capture");
    assert!(session.inbound_only());

    let client = send_after(sink.addr, b"hello", Duration::from_millis(100));

    let (payload, addr) = session.read().expect("read from lo");
    let client_addr = client.join().expect("client thread");

    assert_eq!(payload, b"hello");
    assert_eq!(addr, client_addr);
    assert!(session.stats().skipped(SkipReason::HandshakeProbe) >= 1);

    session.close();
    assert_eq!(sink.join(), b"hello");
}

/// Closing from another thread wakes a read parked on an idle port
#[test]
#[cfg_attr(not(feature = "e2e"), ignore)]
fn test_close_handle_unblocks_live_read() {
    let sink = Sink::bind();
    let mut session = Session::open(&loopback_config(sink.port())).expect("open lo capture");
    let handle = session.close_handle();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(session.read());
    });

    thread::sleep(Duration::from_millis(100));
    handle.close();

    let result = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("read should return after close");
    assert!(result.unwrap_err().is_closed());
}

#[test]
#[cfg_attr(not(feature = "e2e"), ignore)]
fn test_unknown_interface() {
    let err = Session::open(&NetworkConfig::new("rawrecv-missing0", 9000)).unwrap_err();
    match err {
        rawrecv::Error::Open { device, source } => {
            assert_eq!(device, "rawrecv-missing0");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected an open error, got {:?}", other),
    }
}
