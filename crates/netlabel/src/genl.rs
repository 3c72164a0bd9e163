//! Generic Netlink plumbing shared by all NetLabel subsystems.
//!
//! Every NetLabel message is a GENL message:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ nlmsghdr (16 bytes)                     │
//! │   nlmsg_len, nlmsg_type (family_id),    │
//! │   nlmsg_flags, nlmsg_seq, nlmsg_pid     │
//! ├─────────────────────────────────────────┤
//! │ genlmsghdr (4 bytes)                    │
//! │   cmd (u8), version (u8), reserved (u16)│
//! ├─────────────────────────────────────────┤
//! │ Attributes (TLV format)                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Family IDs are assigned dynamically by the kernel; `resolve_family`
//! asks the GENL controller to translate a family name into an ID.

use tracing::debug;

use crate::attr::{find_attr, get};
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::message::{MessageIter, NLM_F_ACK, NLM_F_REQUEST, NlMsgError};

/// NetLabel Generic Netlink protocol version.
pub const NETLBL_PROTO_VERSION: u8 = 3;

/// Size of the GENL header in bytes.
pub const GENL_HDRLEN: usize = 4;

/// Fixed family ID of the GENL controller.
pub const GENL_ID_CTRL: u16 = 0x10;

/// Generic Netlink message header.
///
/// This header immediately follows the standard netlink header.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenlMsgHdr {
    /// Command identifier (family-specific)
    pub cmd: u8,
    /// Interface version
    pub version: u8,
    /// Reserved for future use
    pub reserved: u16,
}

impl GenlMsgHdr {
    /// Create a new GENL header with the given command and version.
    #[inline]
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }

    /// Parse a header from a byte slice.
    ///
    /// Returns `None` if the slice is too short.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < GENL_HDRLEN {
            return None;
        }
        Some(Self {
            cmd: data[0],
            version: data[1],
            reserved: u16::from_ne_bytes([data[2], data[3]]),
        })
    }

    /// Encode the header into its 4-byte wire form.
    pub fn to_bytes(self) -> [u8; GENL_HDRLEN] {
        let reserved = self.reserved.to_ne_bytes();
        [self.cmd, self.version, reserved[0], reserved[1]]
    }
}

/// GENL controller commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CtrlCmd {
    NewFamily = 1,
    GetFamily = 3,
}

/// GENL controller attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CtrlAttr {
    FamilyId = 1,
    FamilyName = 2,
}

/// Build a NetLabel request: netlink header + GENL header with the
/// NetLabel protocol version.
pub(crate) fn netlabel_msg(family_id: u16, cmd: u8, flags: u16) -> MessageBuilder {
    let mut builder = MessageBuilder::new(family_id, NLM_F_REQUEST | flags);
    builder.append_bytes(&GenlMsgHdr::new(cmd, NETLBL_PROTO_VERSION).to_bytes());
    builder
}

/// Find the embedded result code in an acknowledgement response.
///
/// Zero means success; a nonzero code is the kernel's (negative) errno
/// for the rejected request.
pub(crate) fn parse_ack(data: &[u8]) -> Result<()> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;
        if !header.is_error() {
            continue;
        }
        let err = NlMsgError::from_bytes(payload)?;
        if err.is_ack() {
            return Ok(());
        }
        return Err(Error::from_errno(err.error));
    }
    Err(Error::MalformedAck)
}

/// Check a query response for an embedded kernel error.
///
/// Unlike `parse_ack`, the absence of an error message is fine; data
/// responses do not carry one.
pub(crate) fn check_status(data: &[u8]) -> Result<()> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;
        if !header.is_error() {
            continue;
        }
        let err = NlMsgError::from_bytes(payload)?;
        if !err.is_ack() {
            return Err(Error::from_errno(err.error));
        }
    }
    Ok(())
}

/// Extract the attribute block of the first data message in a response,
/// verifying its GENL command matches what was requested.
pub(crate) fn response_attrs(data: &[u8], expected_cmd: u8) -> Result<&[u8]> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;
        if header.is_error() || header.is_done() {
            continue;
        }
        let genl = GenlMsgHdr::from_bytes(payload).ok_or(Error::Truncated {
            expected: GENL_HDRLEN,
            actual: payload.len(),
        })?;
        if genl.cmd != expected_cmd {
            return Err(Error::BadMessage(format!(
                "unexpected response command: expected {}, got {}",
                expected_cmd, genl.cmd
            )));
        }
        return Ok(&payload[GENL_HDRLEN..]);
    }
    Err(Error::NoData)
}

/// Send an acknowledged command and wait for the result code.
///
/// `hndl` of `None` opens a transient handle for this one exchange, the
/// common case for one-shot configuration changes.
pub(crate) fn ack_command(
    hndl: Option<&Handle>,
    family_id: u16,
    cmd: u8,
    build_attrs: impl FnOnce(&mut MessageBuilder),
) -> Result<()> {
    let owned;
    let hndl = match hndl {
        Some(h) => h,
        None => {
            owned = Handle::open()?;
            &owned
        }
    };

    let mut builder = netlabel_msg(family_id, cmd, NLM_F_ACK);
    build_attrs(&mut builder);
    builder.set_seq(hndl.next_seq());
    builder.set_pid(hndl.pid());

    hndl.send(&builder.finish()?)?;
    let response = hndl.recv(family_id)?;
    parse_ack(&response)
}

/// Send a query command and return the raw response for the caller to
/// decode. Kernel errors embedded in the response are surfaced here.
pub(crate) fn query(
    hndl: Option<&Handle>,
    family_id: u16,
    cmd: u8,
    build_attrs: impl FnOnce(&mut MessageBuilder),
) -> Result<Vec<u8>> {
    let owned;
    let hndl = match hndl {
        Some(h) => h,
        None => {
            owned = Handle::open()?;
            &owned
        }
    };

    let mut builder = netlabel_msg(family_id, cmd, 0);
    build_attrs(&mut builder);
    builder.set_seq(hndl.next_seq());
    builder.set_pid(hndl.pid());

    hndl.send(&builder.finish()?)?;
    let response = hndl.recv(family_id)?;
    check_status(&response)?;
    Ok(response)
}

/// Resolve a GENL family name to its kernel-assigned ID.
pub(crate) fn resolve_family(hndl: &Handle, name: &str) -> Result<u16> {
    debug!(family = name, "resolving GENL family");

    // The controller speaks its own version 1, not the NetLabel version.
    let mut builder = MessageBuilder::new(GENL_ID_CTRL, NLM_F_REQUEST | NLM_F_ACK);
    builder.append_bytes(&GenlMsgHdr::new(CtrlCmd::GetFamily as u8, 1).to_bytes());
    builder.append_attr_str(CtrlAttr::FamilyName as u16, name);
    builder.set_seq(hndl.next_seq());
    builder.set_pid(hndl.pid());

    hndl.send(&builder.finish()?)?;
    let response = hndl.recv(GENL_ID_CTRL)?;

    check_status(&response).map_err(|e| {
        if e.is_not_found() {
            Error::UnsupportedSubsystem {
                name: name.to_string(),
            }
        } else {
            e
        }
    })?;

    let attrs = response_attrs(&response, CtrlCmd::NewFamily as u8)?;
    let id = find_attr(attrs, CtrlAttr::FamilyId as u16)
        .ok_or_else(|| Error::BadMessage("family response missing ID".into()))
        .and_then(get::u16_ne)?;

    debug!(family = name, id, "resolved GENL family");
    Ok(id)
}
