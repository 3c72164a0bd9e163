//! Error types for NetLabel operations.

use std::io;

/// Result type for NetLabel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the NetLabel subsystem.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A blocking receive exceeded the configured timeout.
    ///
    /// The handle that timed out may have response data still queued and
    /// should be dropped rather than reused.
    #[error("receive timed out")]
    Timeout,

    /// A send or receive completed with zero bytes where data was required.
    #[error("no data")]
    NoData,

    /// Bad caller input; no I/O was attempted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The subsystem's family ID has not been resolved yet.
    #[error("subsystem {subsystem} not initialized")]
    NotInitialized {
        /// Generic Netlink family name of the subsystem.
        subsystem: &'static str,
    },

    /// The kernel does not register this NetLabel subsystem.
    #[error("subsystem not supported by the kernel: {name}")]
    UnsupportedSubsystem {
        /// Generic Netlink family name that failed to resolve.
        name: String,
    },

    /// A received message carried an unexpected netlink type.
    #[error("protocol mismatch: expected type {expected}, got {actual}")]
    ProtocolMismatch {
        /// The family ID the response was expected to carry.
        expected: u16,
        /// The netlink type actually received.
        actual: u16,
    },

    /// A received message's command or attribute shape does not match
    /// what was requested.
    #[error("bad message: {0}")]
    BadMessage(String),

    /// An acknowledgement response carried no embedded result code.
    #[error("malformed acknowledgement")]
    MalformedAck,

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// An attribute payload too large to frame; the length field is 16
    /// bits.
    #[error("cannot encode attribute of {len} bytes")]
    Encoding {
        /// Payload length that failed to encode.
        len: usize,
    },

    /// The kernel rejected a well-formed request.
    ///
    /// This is not a client bug; the errno is passed through verbatim and
    /// never retried.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },
}

impl Error {
    /// Create a kernel error from a (negative) errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// Check if this is a "not found" error (ENOENT).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kernel { errno, .. } if *errno == libc::ENOENT)
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Kernel { errno, .. }
                 if *errno == libc::EPERM || *errno == libc::EACCES)
    }
}
