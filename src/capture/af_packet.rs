//! AF_PACKET frame source
//!
//! Blocking reads multiplexed with an eventfd through poll(2), so a
//! `CloseHandle` on another thread can wake a reader that is parked on an
//! idle interface.

use super::filter::{CaptureFilter, MAX_SNAPLEN};
use super::{CloseHandle, Closer, Direction, FrameSource, PacketDirection};
use crate::{Error, ReadError, Result};
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

// <linux/if_packet.h>, added in 4.20
const PACKET_IGNORE_OUTGOING: libc::c_int = 23;

/// Wakes a reader blocked in poll(2)
#[derive(Debug)]
struct Wakeup {
    event: OwnedFd,
    closed: AtomicBool,
}

impl Wakeup {
    fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            event: unsafe { OwnedFd::from_raw_fd(fd) },
            closed: AtomicBool::new(false),
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Closer for Wakeup {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // The counter stays non-zero, so every later poll sees it readable
        let one: u64 = 1;
        unsafe {
            libc::write(
                self.event.as_raw_fd(),
                &one as *const u64 as *const libc::c_void,
                mem::size_of::<u64>(),
            )
        };
    }
}

/// Raw packet socket bound to one interface
#[derive(Debug)]
pub struct AfPacketSource {
    socket: Option<OwnedFd>,
    device: String,
    ifindex: i32,
    promiscuous: bool,
    snaplen: u32,
    buffer: Vec<u8>,
    direction: Direction,
    /// Outgoing frames are already dropped by the kernel
    kernel_direction: bool,
    wakeup: Arc<Wakeup>,
}

impl AfPacketSource {
    /// Open a packet socket on `device`. Needs CAP_NET_RAW.
    ///
    /// An unknown interface or a snaplen outside `1..=MAX_SNAPLEN` is an
    /// `Error::Open` like any other device failure.
    pub fn open(device: &str, promiscuous: bool, snaplen: u32) -> Result<Self> {
        let open_err = |source: io::Error| Error::Open {
            device: device.to_string(),
            source,
        };

        if snaplen == 0 || snaplen > MAX_SNAPLEN {
            return Err(open_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("snaplen {} outside 1..={}", snaplen, MAX_SNAPLEN),
            )));
        }

        let ifindex = lookup_ifindex(device).map_err(open_err)?;

        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                (libc::ETH_P_ALL as u16).to_be() as i32,
            )
        };
        if fd < 0 {
            return Err(open_err(io::Error::last_os_error()));
        }
        let socket = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = (libc::ETH_P_ALL as u16).to_be();
        addr.sll_ifindex = ifindex;

        let ret = unsafe {
            libc::bind(
                socket.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(open_err(io::Error::last_os_error()));
        }

        if promiscuous {
            set_membership(socket.as_raw_fd(), ifindex, libc::PACKET_ADD_MEMBERSHIP)
                .map_err(open_err)?;
        }

        let wakeup = Wakeup::new().map_err(open_err)?;

        debug!(device, ifindex, promiscuous, snaplen, "packet socket opened");

        Ok(Self {
            socket: Some(socket),
            device: device.to_string(),
            ifindex,
            promiscuous,
            snaplen,
            buffer: vec![0u8; snaplen as usize],
            direction: Direction::InOut,
            kernel_direction: false,
            wakeup: Arc::new(wakeup),
        })
    }

    fn raw_fd(&self) -> Result<RawFd> {
        self.socket
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or_else(|| ReadError::Closed.into())
    }

    /// Throw away frames queued between bind and filter attach
    fn drain(&mut self) -> Result<()> {
        let fd = self.raw_fd()?;
        loop {
            let n = unsafe {
                libc::recv(
                    fd,
                    self.buffer.as_mut_ptr() as *mut libc::c_void,
                    self.buffer.len(),
                    libc::MSG_DONTWAIT,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                return match err.kind() {
                    io::ErrorKind::WouldBlock => Ok(()),
                    io::ErrorKind::Interrupted => continue,
                    _ => Err(Error::Io(err)),
                };
            }
        }
    }

    /// Block until the socket is readable; fails with `Closed` on wakeup
    fn wait_readable(&self, fd: RawFd) -> Result<()> {
        loop {
            if self.wakeup.is_closed() {
                return Err(ReadError::Closed.into());
            }

            let mut fds = [
                libc::pollfd {
                    fd,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wakeup.event.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ReadError::Io(err).into());
            }

            if fds[1].revents != 0 {
                return Err(ReadError::Closed.into());
            }
            if fds[0].revents != 0 {
                return Ok(());
            }
        }
    }
}

impl FrameSource for AfPacketSource {
    fn set_filter(&mut self, expr: &str) -> Result<()> {
        let fd = self.raw_fd()?;
        let filter: CaptureFilter = expr.parse()?;
        let program = filter.compile(self.snaplen);

        let mut insns: Vec<libc::sock_filter> = program
            .instructions()
            .iter()
            .map(|i| libc::sock_filter {
                code: i.code,
                jt: i.jt,
                jf: i.jf,
                k: i.k,
            })
            .collect();
        let fprog = libc::sock_fprog {
            len: insns.len() as libc::c_ushort,
            filter: insns.as_mut_ptr(),
        };

        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &fprog as *const libc::sock_fprog as *const libc::c_void,
                mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Filter(format!(
                "{}: {}",
                expr,
                io::Error::last_os_error()
            )));
        }

        self.drain()?;
        debug!(device = %self.device, filter = expr, "capture filter attached");
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let fd = self.raw_fd()?;
        let ignore_outgoing: libc::c_int = (direction == Direction::In).into();

        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                PACKET_IGNORE_OUTGOING,
                &ignore_outgoing as *const libc::c_int as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };

        self.kernel_direction = if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOPROTOOPT) {
                return Err(Error::Direction(err.to_string()));
            }
            debug!(
                device = %self.device,
                "kernel lacks PACKET_IGNORE_OUTGOING, filtering direction in userspace"
            );
            false
        } else {
            direction != Direction::Out
        };
        self.direction = direction;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<&[u8]> {
        let fd = self.raw_fd()?;
        let len = loop {
            self.wait_readable(fd)?;

            let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
            let mut addr_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
            let n = unsafe {
                libc::recvfrom(
                    fd,
                    self.buffer.as_mut_ptr() as *mut libc::c_void,
                    self.buffer.len(),
                    libc::MSG_DONTWAIT,
                    &mut addr as *mut libc::sockaddr_ll as *mut libc::sockaddr,
                    &mut addr_len,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => continue,
                    _ => return Err(ReadError::Io(err).into()),
                }
            }

            if !self.kernel_direction {
                let packet_direction = if addr.sll_pkttype == libc::PACKET_OUTGOING as u8 {
                    PacketDirection::Outgoing
                } else {
                    PacketDirection::Incoming
                };
                if !self.direction.admits(packet_direction) {
                    continue;
                }
            }

            break n as usize;
        };

        Ok(&self.buffer[..len])
    }

    fn close(&mut self) {
        self.wakeup.close();
        if let Some(socket) = self.socket.take() {
            if self.promiscuous {
                let _ = set_membership(
                    socket.as_raw_fd(),
                    self.ifindex,
                    libc::PACKET_DROP_MEMBERSHIP,
                );
            }
            debug!(device = %self.device, "packet socket closed");
        }
    }

    fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(self.wakeup.clone())
    }
}

impl Drop for AfPacketSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_membership(fd: RawFd, ifindex: i32, optname: libc::c_int) -> io::Result<()> {
    let mreq = libc::packet_mreq {
        mr_ifindex: ifindex,
        mr_type: libc::PACKET_MR_PROMISC as u16,
        mr_alen: 0,
        mr_address: [0; 8],
    };

    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            optname,
            &mreq as *const libc::packet_mreq as *const libc::c_void,
            mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn lookup_ifindex(device: &str) -> io::Result<i32> {
    let not_found = || io::Error::new(io::ErrorKind::NotFound, "no such interface");
    let name = CString::new(device).map_err(|_| not_found())?;
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(not_found());
    }
    Ok(index as i32)
}
