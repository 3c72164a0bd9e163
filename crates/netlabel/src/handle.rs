//! Blocking Generic Netlink socket handle.

use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_GENERIC};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{NlMsgHdr, NlMsgType};

/// Receive buffer size in bytes.
///
/// The kernel sizes each dump batch to fit a few pages (NLMSG_GOODSIZE,
/// under 8 KiB), so 32 KiB holds any single batch with room to spare.
/// Should a datagram ever exceed this, the tail is cut off at the
/// socket and the batch walker reports the short final message as a
/// truncation error rather than returning partial records.
const RECV_BUF_SIZE: usize = 32768;

/// Process-wide receive timeout in seconds. Zero disables the timeout.
static TIMEOUT_SECS: AtomicU32 = AtomicU32::new(10);

/// Set the receive timeout applied to handles opened afterwards.
///
/// A value of zero disables the timeout entirely; receives then block
/// until the kernel responds.
pub fn set_timeout(seconds: u32) {
    TIMEOUT_SECS.store(seconds, Ordering::Relaxed);
}

/// A connected Generic Netlink socket.
///
/// Handles are cheap to open; one-shot operations open a transient
/// handle internally. A caller doing several operations in a row can
/// open one handle and pass it to each to reuse the socket.
///
/// After a `Timeout` error the kernel's response may still arrive and
/// sit queued on the socket; drop the handle instead of reusing it.
pub struct Handle {
    socket: Socket,
    seq: AtomicU32,
    pid: u32,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("fd", &self.socket.as_raw_fd())
            .field("pid", &self.pid)
            .finish()
    }
}

impl Handle {
    /// Open a new connected Generic Netlink socket.
    pub fn open() -> Result<Self> {
        let mut socket = Socket::new(NETLINK_GENERIC)?;

        // Bind with pid 0; the kernel assigns a unique port ID.
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        socket.connect(&SocketAddr::new(0, 0))?;

        let timeout = TIMEOUT_SECS.load(Ordering::Relaxed);
        if timeout > 0 {
            set_recv_timeout(&socket, timeout)?;
        }

        debug!(fd = socket.as_raw_fd(), pid, timeout, "opened GENL socket");

        Ok(Self {
            socket,
            seq: AtomicU32::new(1),
            pid,
        })
    }

    /// The kernel-assigned port ID of this socket.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the next sequence number.
    pub fn next_seq(&self) -> u32 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a complete netlink message.
    pub fn send(&self, data: &[u8]) -> Result<usize> {
        trace!(len = data.len(), "sending netlink message");
        sent_len(self.socket.send(data, 0)?)
    }

    /// Receive one datagram, verifying its netlink type.
    ///
    /// The first message must carry `expected_type` or be one of the
    /// control sentinels (error/ACK, done); anything else means the
    /// response belongs to a different protocol family.
    pub fn recv(&self, expected_type: u16) -> Result<Vec<u8>> {
        let data = self.recv_raw()?;

        let header = NlMsgHdr::from_bytes(&data)?;
        let actual = header.nlmsg_type;
        if actual != expected_type && actual != NlMsgType::ERROR && actual != NlMsgType::DONE {
            return Err(Error::ProtocolMismatch {
                expected: expected_type,
                actual,
            });
        }

        Ok(data)
    }

    /// Receive one datagram without inspecting it.
    ///
    /// Dump reassembly uses this; the batch walker does its own header
    /// validation.
    pub fn recv_raw(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(RECV_BUF_SIZE);
        let n = self.socket.recv(&mut buf, 0).map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) {
                Error::Timeout
            } else {
                Error::Io(e)
            }
        })?;

        if n == 0 {
            return Err(Error::NoData);
        }

        trace!(len = n, "received netlink message");
        Ok(buf.to_vec())
    }
}

/// Interpret a send(2) return value: a zero-byte send means nothing
/// went out on the wire.
fn sent_len(n: usize) -> Result<usize> {
    if n == 0 {
        return Err(Error::NoData);
    }
    Ok(n)
}

/// Apply SO_RCVTIMEO to the socket.
fn set_recv_timeout(socket: &Socket, seconds: u32) -> Result<()> {
    let timeout = libc::timeval {
        tv_sec: seconds as libc::time_t,
        tv_usec: 0,
    };
    // SAFETY: fd is a valid open socket and timeval is a plain struct
    // passed by pointer with its exact size.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &timeout as *const libc::timeval as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sent_len_zero_is_no_data() {
        assert!(matches!(sent_len(0), Err(Error::NoData)));
    }

    #[test]
    fn test_sent_len_passes_through() {
        assert_eq!(sent_len(20).unwrap(), 20);
    }
}
