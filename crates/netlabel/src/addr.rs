//! Network address and mask pairs used in NetLabel selectors.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::builder::MessageBuilder;
use crate::error::{Error, Result};

/// An IPv4 or IPv6 address with its netmask.
///
/// NetLabel carries the address and mask as separate raw attributes
/// whose types differ per subsystem; the IDs are supplied at the call
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetAddr {
    V4 {
        addr: Ipv4Addr,
        mask: Ipv4Addr,
    },
    V6 {
        addr: Ipv6Addr,
        mask: Ipv6Addr,
    },
}

impl NetAddr {
    /// Create an IPv4 address/mask pair.
    pub fn v4(addr: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self::V4 { addr, mask }
    }

    /// Create an IPv6 address/mask pair.
    pub fn v6(addr: Ipv6Addr, mask: Ipv6Addr) -> Self {
        Self::V6 { addr, mask }
    }

    /// The socket address family constant (AF_INET / AF_INET6).
    pub fn family(&self) -> u16 {
        match self {
            Self::V4 { .. } => libc::AF_INET as u16,
            Self::V6 { .. } => libc::AF_INET6 as u16,
        }
    }

    /// Append this address as a pair of raw attributes, using the
    /// attribute IDs for whichever family the address belongs to.
    pub(crate) fn append(
        &self,
        builder: &mut MessageBuilder,
        v4_addr_id: u16,
        v4_mask_id: u16,
        v6_addr_id: u16,
        v6_mask_id: u16,
    ) {
        match self {
            Self::V4 { addr, mask } => {
                builder.append_attr(v4_addr_id, &addr.octets());
                builder.append_attr(v4_mask_id, &mask.octets());
            }
            Self::V6 { addr, mask } => {
                builder.append_attr(v6_addr_id, &addr.octets());
                builder.append_attr(v6_mask_id, &mask.octets());
            }
        }
    }

    /// Decode an address from an attribute block, trying IPv4 first.
    ///
    /// Address and mask payloads must be exactly 4 (IPv4) or 16 (IPv6)
    /// bytes; anything else is a malformed record.
    pub(crate) fn from_attrs(
        attrs: &[u8],
        v4_addr_id: u16,
        v4_mask_id: u16,
        v6_addr_id: u16,
        v6_mask_id: u16,
    ) -> Result<Self> {
        use crate::attr::find_attr;

        if let (Some(addr), Some(mask)) =
            (find_attr(attrs, v4_addr_id), find_attr(attrs, v4_mask_id))
        {
            return Ok(Self::V4 {
                addr: Ipv4Addr::from(octets4(addr)?),
                mask: Ipv4Addr::from(octets4(mask)?),
            });
        }

        if let (Some(addr), Some(mask)) =
            (find_attr(attrs, v6_addr_id), find_attr(attrs, v6_mask_id))
        {
            return Ok(Self::V6 {
                addr: Ipv6Addr::from(octets16(addr)?),
                mask: Ipv6Addr::from(octets16(mask)?),
            });
        }

        Err(Error::BadMessage("record missing address attributes".into()))
    }
}

fn octets4(data: &[u8]) -> Result<[u8; 4]> {
    data.try_into()
        .map_err(|_| Error::BadMessage(format!("IPv4 address of {} bytes", data.len())))
}

fn octets16(data: &[u8]) -> Result<[u8; 16]> {
    data.try_into()
        .map_err(|_| Error::BadMessage(format!("IPv6 address of {} bytes", data.len())))
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 { addr, mask } => write!(f, "{}/{}", addr, mask),
            Self::V6 { addr, mask } => write!(f, "{}/{}", addr, mask),
        }
    }
}
