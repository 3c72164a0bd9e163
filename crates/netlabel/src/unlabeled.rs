//! NetLabel unlabeled-traffic subsystem.
//!
//! Controls whether unlabeled packets are accepted at all, and manages
//! static labels: security labels assigned to unlabeled traffic by
//! source address and optionally by interface. Static labels without
//! an interface form the fallback set, consulted when no
//! interface-specific entry matches.

use tracing::debug;

use crate::addr::NetAddr;
use crate::attr::{find_attr, get};
use crate::builder::MessageBuilder;
use crate::dump;
use crate::error::{Error, Result};
use crate::family::{self, Subsystem};
use crate::genl;
use crate::handle::Handle;

/// Unlabeled-traffic commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum UnlblCmd {
    Accept = 1,
    List = 2,
    StaticAdd = 3,
    StaticRemove = 4,
    StaticList = 5,
    StaticAddDef = 6,
    StaticRemoveDef = 7,
    StaticListDef = 8,
}

/// Unlabeled-traffic attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
enum UnlblAttr {
    AcceptFlag = 1,
    Ipv6Addr = 2,
    Ipv6Mask = 3,
    Ipv4Addr = 4,
    Ipv4Mask = 5,
    Iface = 6,
    SecCtx = 7,
}

/// A static label: a security label applied to unlabeled traffic from
/// an address range, optionally scoped to one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMapping {
    /// Interface name, or `None` for a fallback entry.
    pub dev: Option<String>,
    /// Source address range.
    pub addr: NetAddr,
    /// The LSM security context to apply.
    pub label: String,
}

/// Enable or disable acceptance of unlabeled packets.
pub fn accept(hndl: Option<&Handle>, allow: bool) -> Result<()> {
    let family_id = family::lookup(Subsystem::Unlabeled)?;
    debug!(allow, "setting unlabeled accept flag");
    genl::ack_command(hndl, family_id, UnlblCmd::Accept as u8, |builder| {
        builder.append_attr_u8(UnlblAttr::AcceptFlag as u16, allow as u8);
    })
}

/// Query whether unlabeled packets are currently accepted.
pub fn accept_flag(hndl: Option<&Handle>) -> Result<bool> {
    let family_id = family::lookup(Subsystem::Unlabeled)?;
    let response = genl::query(hndl, family_id, UnlblCmd::List as u8, |_| {})?;
    let attrs = genl::response_attrs(&response, UnlblCmd::List as u8)?;
    parse_accept_flag(attrs)
}

fn parse_accept_flag(attrs: &[u8]) -> Result<bool> {
    let flag = find_attr(attrs, UnlblAttr::AcceptFlag as u16)
        .ok_or_else(|| Error::BadMessage("accept response missing flag".into()))
        .and_then(get::u8)?;
    Ok(flag != 0)
}

/// Add a static label for traffic from `addr` arriving on `dev`.
pub fn static_add(
    hndl: Option<&Handle>,
    dev: &str,
    addr: &NetAddr,
    label: &str,
) -> Result<()> {
    if dev.is_empty() {
        return Err(Error::InvalidArgument("empty interface name".into()));
    }
    if label.is_empty() {
        return Err(Error::InvalidArgument("empty security label".into()));
    }

    let family_id = family::lookup(Subsystem::Unlabeled)?;
    debug!(dev, %addr, label, "adding static label");
    genl::ack_command(hndl, family_id, UnlblCmd::StaticAdd as u8, |builder| {
        builder.append_attr_str(UnlblAttr::Iface as u16, dev);
        append_addr(builder, addr);
        builder.append_attr_str(UnlblAttr::SecCtx as u16, label);
    })
}

/// Add a fallback static label, used when no interface entry matches.
pub fn static_add_default(hndl: Option<&Handle>, addr: &NetAddr, label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::InvalidArgument("empty security label".into()));
    }

    let family_id = family::lookup(Subsystem::Unlabeled)?;
    debug!(%addr, label, "adding fallback static label");
    genl::ack_command(hndl, family_id, UnlblCmd::StaticAddDef as u8, |builder| {
        append_addr(builder, addr);
        builder.append_attr_str(UnlblAttr::SecCtx as u16, label);
    })
}

/// Remove the static label for `addr` on `dev`.
pub fn static_remove(hndl: Option<&Handle>, dev: &str, addr: &NetAddr) -> Result<()> {
    if dev.is_empty() {
        return Err(Error::InvalidArgument("empty interface name".into()));
    }

    let family_id = family::lookup(Subsystem::Unlabeled)?;
    debug!(dev, %addr, "removing static label");
    genl::ack_command(hndl, family_id, UnlblCmd::StaticRemove as u8, |builder| {
        builder.append_attr_str(UnlblAttr::Iface as u16, dev);
        append_addr(builder, addr);
    })
}

/// Remove the fallback static label for `addr`.
pub fn static_remove_default(hndl: Option<&Handle>, addr: &NetAddr) -> Result<()> {
    let family_id = family::lookup(Subsystem::Unlabeled)?;
    debug!(%addr, "removing fallback static label");
    genl::ack_command(
        hndl,
        family_id,
        UnlblCmd::StaticRemoveDef as u8,
        |builder| {
            append_addr(builder, addr);
        },
    )
}

/// List all interface-scoped static labels.
pub fn static_list(hndl: Option<&Handle>) -> Result<Vec<StaticMapping>> {
    let family_id = family::lookup(Subsystem::Unlabeled)?;
    dump::dump(
        hndl,
        family_id,
        UnlblCmd::StaticList as u8,
        |_| {},
        |attrs| {
            let dev = find_attr(attrs, UnlblAttr::Iface as u16)
                .ok_or_else(|| Error::BadMessage("static label missing interface".into()))
                .and_then(get::string)?
                .to_owned();
            parse_static(attrs, Some(dev))
        },
    )
}

/// List all fallback static labels.
pub fn static_list_default(hndl: Option<&Handle>) -> Result<Vec<StaticMapping>> {
    let family_id = family::lookup(Subsystem::Unlabeled)?;
    dump::dump(
        hndl,
        family_id,
        UnlblCmd::StaticListDef as u8,
        |_| {},
        |attrs| parse_static(attrs, None),
    )
}

fn append_addr(builder: &mut MessageBuilder, addr: &NetAddr) {
    addr.append(
        builder,
        UnlblAttr::Ipv4Addr as u16,
        UnlblAttr::Ipv4Mask as u16,
        UnlblAttr::Ipv6Addr as u16,
        UnlblAttr::Ipv6Mask as u16,
    );
}

fn parse_static(attrs: &[u8], dev: Option<String>) -> Result<StaticMapping> {
    let addr = NetAddr::from_attrs(
        attrs,
        UnlblAttr::Ipv4Addr as u16,
        UnlblAttr::Ipv4Mask as u16,
        UnlblAttr::Ipv6Addr as u16,
        UnlblAttr::Ipv6Mask as u16,
    )?;
    let label = find_attr(attrs, UnlblAttr::SecCtx as u16)
        .ok_or_else(|| Error::BadMessage("static label missing security context".into()))
        .and_then(get::string)?
        .to_owned();

    Ok(StaticMapping { dev, addr, label })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{NLM_F_REQUEST, NLMSG_HDRLEN};
    use std::net::Ipv4Addr;

    fn attrs_of(build: impl FnOnce(&mut MessageBuilder)) -> Vec<u8> {
        let mut builder = MessageBuilder::new(0, NLM_F_REQUEST);
        build(&mut builder);
        builder.finish().unwrap()[NLMSG_HDRLEN..].to_vec()
    }

    #[test]
    fn test_parse_static_with_interface() {
        let attrs = attrs_of(|b| {
            b.append_attr_str(UnlblAttr::Iface as u16, "eth0");
            b.append_attr(UnlblAttr::Ipv4Addr as u16, &[10, 0, 0, 0]);
            b.append_attr(UnlblAttr::Ipv4Mask as u16, &[255, 0, 0, 0]);
            b.append_attr_str(
                UnlblAttr::SecCtx as u16,
                "system_u:object_r:netlabel_peer_t:s0",
            );
        });

        let dev = get::string(find_attr(&attrs, UnlblAttr::Iface as u16).unwrap())
            .unwrap()
            .to_owned();
        let mapping = parse_static(&attrs, Some(dev)).unwrap();
        assert_eq!(mapping.dev.as_deref(), Some("eth0"));
        assert_eq!(
            mapping.addr,
            NetAddr::v4(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 0, 0))
        );
        assert_eq!(mapping.label, "system_u:object_r:netlabel_peer_t:s0");
    }

    #[test]
    fn test_parse_accept_flag_values() {
        for (value, expected) in [(1u8, true), (0u8, false)] {
            let attrs = attrs_of(|b| b.append_attr_u8(UnlblAttr::AcceptFlag as u16, value));
            assert_eq!(parse_accept_flag(&attrs).unwrap(), expected);
        }
    }

    #[test]
    fn test_parse_accept_flag_missing() {
        let attrs = attrs_of(|b| b.append_attr_str(UnlblAttr::Iface as u16, "eth0"));
        assert!(matches!(
            parse_accept_flag(&attrs),
            Err(Error::BadMessage(_))
        ));
    }

    #[test]
    fn test_parse_static_missing_label() {
        let attrs = attrs_of(|b| {
            b.append_attr(UnlblAttr::Ipv4Addr as u16, &[10, 0, 0, 0]);
            b.append_attr(UnlblAttr::Ipv4Mask as u16, &[255, 0, 0, 0]);
        });
        assert!(matches!(
            parse_static(&attrs, None),
            Err(Error::BadMessage(_))
        ));
    }

    #[test]
    fn test_static_add_validates_before_io() {
        // No kernel in the test environment; argument errors must
        // surface before any socket work.
        let addr = NetAddr::v4(Ipv4Addr::LOCALHOST, Ipv4Addr::BROADCAST);
        assert!(matches!(
            static_add(None, "", &addr, "label_t"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            static_add(None, "eth0", &addr, ""),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            static_add_default(None, &addr, ""),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            static_remove(None, "", &addr),
            Err(Error::InvalidArgument(_))
        ));
    }
}
