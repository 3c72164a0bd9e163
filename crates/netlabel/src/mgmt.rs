//! NetLabel management subsystem: domain to labeling-protocol mappings.
//!
//! A domain mapping tells the kernel which labeling protocol to apply
//! to traffic for a given LSM domain (e.g. a SELinux type). A mapping
//! either names a protocol outright or carries a per-address selector
//! list, built kernel-side from repeated adds with an address.

use tracing::debug;

use crate::addr::NetAddr;
use crate::attr::{AttrIter, find_attr, get};
use crate::builder::MessageBuilder;
use crate::dump;
use crate::error::{Error, Result};
use crate::family::{self, Subsystem};
use crate::genl;
use crate::handle::Handle;

/// Management commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum MgmtCmd {
    Add = 1,
    Remove = 2,
    ListAll = 3,
    AddDef = 4,
    RemoveDef = 5,
    ListDef = 6,
    Protocols = 7,
    Version = 8,
}

/// Management attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
enum MgmtAttr {
    Domain = 1,
    Protocol = 2,
    Version = 3,
    Cv4Doi = 4,
    Ipv6Addr = 5,
    Ipv6Mask = 6,
    Ipv4Addr = 7,
    Ipv4Mask = 8,
    AddrSelector = 9,
    SelectorList = 10,
    Family = 11,
    ClpDoi = 12,
}

/// Labeling protocol type identifiers.
pub mod nltype {
    pub const NONE: u32 = 0;
    pub const MGMT: u32 = 1;
    pub const RIPSO: u32 = 2;
    pub const CIPSOV4: u32 = 3;
    pub const CALIPSO: u32 = 4;
    pub const UNLABELED: u32 = 5;
    pub const ADDRSELECT: u32 = 6;
}

/// The labeling protocol a domain mapping applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainProtocol {
    /// Pass traffic unlabeled.
    Unlabeled,
    /// CIPSO IPv4 labeling with the given DOI.
    Cipsov4(u32),
    /// CALIPSO IPv6 labeling with the given DOI.
    Calipso(u32),
    /// Per-address selectors. Only ever returned by list operations;
    /// the kernel assembles the list from adds carrying an address.
    AddressSelect(Vec<AddrSelector>),
}

impl DomainProtocol {
    /// The wire protocol type identifier.
    pub fn nltype(&self) -> u32 {
        match self {
            Self::Unlabeled => nltype::UNLABELED,
            Self::Cipsov4(_) => nltype::CIPSOV4,
            Self::Calipso(_) => nltype::CALIPSO,
            Self::AddressSelect(_) => nltype::ADDRSELECT,
        }
    }
}

/// The protocol applied to one address range within a selector list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorProtocol {
    Unlabeled,
    Cipsov4 { doi: u32 },
    Calipso { doi: u32 },
}

/// One entry of a per-address selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrSelector {
    /// The address range this selector covers.
    pub addr: NetAddr,
    /// The labeling protocol applied within that range.
    pub protocol: SelectorProtocol,
}

/// A domain mapping as returned by the list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMapping {
    /// The LSM domain, or `None` for the default mapping.
    pub domain: Option<String>,
    /// Address family the mapping applies to (AF_UNSPEC, AF_INET,
    /// AF_INET6).
    pub family: u16,
    /// The labeling protocol.
    pub protocol: DomainProtocol,
}

/// Query the kernel's NetLabel protocol version.
pub fn version(hndl: Option<&Handle>) -> Result<u32> {
    let family_id = family::lookup(Subsystem::Mgmt)?;
    let response = genl::query(hndl, family_id, MgmtCmd::Version as u8, |_| {})?;
    let attrs = genl::response_attrs(&response, MgmtCmd::Version as u8)?;
    find_attr(attrs, MgmtAttr::Version as u16)
        .ok_or_else(|| Error::BadMessage("version response missing value".into()))
        .and_then(get::u32_ne)
}

/// List the labeling protocols the kernel supports.
pub fn protocols(hndl: Option<&Handle>) -> Result<Vec<u32>> {
    let family_id = family::lookup(Subsystem::Mgmt)?;
    dump::dump(
        hndl,
        family_id,
        MgmtCmd::Protocols as u8,
        |_| {},
        |attrs| {
            find_attr(attrs, MgmtAttr::Protocol as u16)
                .ok_or_else(|| Error::BadMessage("protocol record missing type".into()))
                .and_then(get::u32_ne)
        },
    )
}

/// Add a mapping for a specific domain.
///
/// `family` selects the address family the mapping covers (AF_UNSPEC
/// for both). With `addr` set, the kernel folds the add into the
/// domain's per-address selector list.
pub fn add(
    hndl: Option<&Handle>,
    domain: &str,
    protocol: &DomainProtocol,
    family: u16,
    addr: Option<&NetAddr>,
) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::InvalidArgument("empty domain".into()));
    }
    validate_add(protocol, addr)?;

    let family_id = family::lookup(Subsystem::Mgmt)?;
    debug!(domain, ?protocol, "adding domain mapping");
    genl::ack_command(hndl, family_id, MgmtCmd::Add as u8, |builder| {
        builder.append_attr_str(MgmtAttr::Domain as u16, domain);
        append_mapping(builder, protocol, family, addr);
    })
}

/// Add the default mapping, applied to domains with no mapping of
/// their own.
pub fn add_default(
    hndl: Option<&Handle>,
    protocol: &DomainProtocol,
    family: u16,
    addr: Option<&NetAddr>,
) -> Result<()> {
    validate_add(protocol, addr)?;

    let family_id = family::lookup(Subsystem::Mgmt)?;
    debug!(?protocol, "adding default domain mapping");
    genl::ack_command(hndl, family_id, MgmtCmd::AddDef as u8, |builder| {
        append_mapping(builder, protocol, family, addr);
    })
}

/// Remove the mapping for a specific domain.
pub fn remove(hndl: Option<&Handle>, domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::InvalidArgument("empty domain".into()));
    }

    let family_id = family::lookup(Subsystem::Mgmt)?;
    debug!(domain, "removing domain mapping");
    genl::ack_command(hndl, family_id, MgmtCmd::Remove as u8, |builder| {
        builder.append_attr_str(MgmtAttr::Domain as u16, domain);
    })
}

/// Remove the default mapping.
pub fn remove_default(hndl: Option<&Handle>) -> Result<()> {
    let family_id = family::lookup(Subsystem::Mgmt)?;
    debug!("removing default domain mapping");
    genl::ack_command(hndl, family_id, MgmtCmd::RemoveDef as u8, |_| {})
}

/// List all domain mappings.
pub fn list_all(hndl: Option<&Handle>) -> Result<Vec<DomainMapping>> {
    let family_id = family::lookup(Subsystem::Mgmt)?;
    dump::dump(
        hndl,
        family_id,
        MgmtCmd::ListAll as u8,
        |_| {},
        |attrs| {
            let domain = find_attr(attrs, MgmtAttr::Domain as u16)
                .map(|payload| get::string(payload).map(str::to_owned))
                .transpose()?
                .ok_or_else(|| Error::BadMessage("mapping record missing domain".into()))?;
            parse_mapping(attrs, Some(domain))
        },
    )
}

/// Fetch the default mapping for an address family.
pub fn list_default(hndl: Option<&Handle>, family: u16) -> Result<DomainMapping> {
    let family_id = family::lookup(Subsystem::Mgmt)?;
    let response = genl::query(hndl, family_id, MgmtCmd::ListDef as u8, |builder| {
        builder.append_attr_u16(MgmtAttr::Family as u16, family);
    })?;
    let attrs = genl::response_attrs(&response, MgmtCmd::ListDef as u8)?;
    parse_mapping(attrs, None)
}

fn validate_add(protocol: &DomainProtocol, addr: Option<&NetAddr>) -> Result<()> {
    match protocol {
        DomainProtocol::AddressSelect(_) => Err(Error::InvalidArgument(
            "selector lists are kernel-assembled; add per-address mappings instead".into(),
        )),
        // A CIPSO DOI only labels IPv4, a CALIPSO DOI only IPv6.
        DomainProtocol::Cipsov4(_) if matches!(addr, Some(NetAddr::V6 { .. })) => Err(
            Error::InvalidArgument("CIPSOv4 mapping with an IPv6 address".into()),
        ),
        DomainProtocol::Calipso(_) if matches!(addr, Some(NetAddr::V4 { .. })) => Err(
            Error::InvalidArgument("CALIPSO mapping with an IPv4 address".into()),
        ),
        _ => Ok(()),
    }
}

fn append_mapping(
    builder: &mut MessageBuilder,
    protocol: &DomainProtocol,
    family: u16,
    addr: Option<&NetAddr>,
) {
    builder.append_attr_u32(MgmtAttr::Protocol as u16, protocol.nltype());
    builder.append_attr_u16(MgmtAttr::Family as u16, family);
    match protocol {
        DomainProtocol::Cipsov4(doi) => {
            builder.append_attr_u32(MgmtAttr::Cv4Doi as u16, *doi);
        }
        DomainProtocol::Calipso(doi) => {
            builder.append_attr_u32(MgmtAttr::ClpDoi as u16, *doi);
        }
        DomainProtocol::Unlabeled | DomainProtocol::AddressSelect(_) => {}
    }
    if let Some(addr) = addr {
        addr.append(
            builder,
            MgmtAttr::Ipv4Addr as u16,
            MgmtAttr::Ipv4Mask as u16,
            MgmtAttr::Ipv6Addr as u16,
            MgmtAttr::Ipv6Mask as u16,
        );
    }
}

/// Decode a mapping's attribute block into a `DomainMapping`.
fn parse_mapping(attrs: &[u8], domain: Option<String>) -> Result<DomainMapping> {
    let family = find_attr(attrs, MgmtAttr::Family as u16)
        .map(get::u16_ne)
        .transpose()?
        .unwrap_or(libc::AF_UNSPEC as u16);

    if let Some(payload) = find_attr(attrs, MgmtAttr::Protocol as u16) {
        let protocol = match get::u32_ne(payload)? {
            nltype::UNLABELED => DomainProtocol::Unlabeled,
            nltype::CIPSOV4 => {
                let doi = find_attr(attrs, MgmtAttr::Cv4Doi as u16)
                    .ok_or_else(|| Error::BadMessage("CIPSOv4 mapping missing DOI".into()))
                    .and_then(get::u32_ne)?;
                DomainProtocol::Cipsov4(doi)
            }
            nltype::CALIPSO => {
                let doi = find_attr(attrs, MgmtAttr::ClpDoi as u16)
                    .ok_or_else(|| Error::BadMessage("CALIPSO mapping missing DOI".into()))
                    .and_then(get::u32_ne)?;
                DomainProtocol::Calipso(doi)
            }
            other => {
                return Err(Error::BadMessage(format!(
                    "unknown labeling protocol type {}",
                    other
                )));
            }
        };
        return Ok(DomainMapping {
            domain,
            family,
            protocol,
        });
    }

    if let Some(list) = find_attr(attrs, MgmtAttr::SelectorList as u16) {
        return Ok(DomainMapping {
            domain,
            family,
            protocol: DomainProtocol::AddressSelect(parse_selector_list(list)?),
        });
    }

    Err(Error::BadMessage("mapping record missing protocol".into()))
}

/// Decode a nested selector list: each entry is an address range plus
/// the protocol applied within it.
fn parse_selector_list(list: &[u8]) -> Result<Vec<AddrSelector>> {
    let mut selectors = Vec::new();

    for (kind, entry) in AttrIter::new(list) {
        if kind != MgmtAttr::AddrSelector as u16 {
            continue;
        }

        let addr = NetAddr::from_attrs(
            entry,
            MgmtAttr::Ipv4Addr as u16,
            MgmtAttr::Ipv4Mask as u16,
            MgmtAttr::Ipv6Addr as u16,
            MgmtAttr::Ipv6Mask as u16,
        )?;

        let proto_type = find_attr(entry, MgmtAttr::Protocol as u16)
            .ok_or_else(|| Error::BadMessage("selector missing protocol".into()))
            .and_then(get::u32_ne)?;

        let protocol = match proto_type {
            nltype::UNLABELED => SelectorProtocol::Unlabeled,
            nltype::CIPSOV4 => {
                let doi = find_attr(entry, MgmtAttr::Cv4Doi as u16)
                    .ok_or_else(|| Error::BadMessage("CIPSOv4 selector missing DOI".into()))
                    .and_then(get::u32_ne)?;
                SelectorProtocol::Cipsov4 { doi }
            }
            nltype::CALIPSO => {
                let doi = find_attr(entry, MgmtAttr::ClpDoi as u16)
                    .ok_or_else(|| Error::BadMessage("CALIPSO selector missing DOI".into()))
                    .and_then(get::u32_ne)?;
                SelectorProtocol::Calipso { doi }
            }
            other => {
                return Err(Error::BadMessage(format!(
                    "unknown selector protocol type {}",
                    other
                )));
            }
        };

        selectors.push(AddrSelector { addr, protocol });
    }

    Ok(selectors)
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
    fn test_append_mapping_cipsov4() {
        let attrs = attrs_of(|b| {
            append_mapping(b, &DomainProtocol::Cipsov4(16), libc::AF_INET as u16, None)
        });

        let protocol = find_attr(&attrs, MgmtAttr::Protocol as u16).unwrap();
        assert_eq!(get::u32_ne(protocol).unwrap(), nltype::CIPSOV4);
        let doi = find_attr(&attrs, MgmtAttr::Cv4Doi as u16).unwrap();
        assert_eq!(get::u32_ne(doi).unwrap(), 16);
        let family = find_attr(&attrs, MgmtAttr::Family as u16).unwrap();
        assert_eq!(get::u16_ne(family).unwrap(), libc::AF_INET as u16);
    }

    #[test]
    fn test_append_mapping_with_address() {
        let addr = NetAddr::v4(
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(255, 0, 0, 0),
        );
        let attrs = attrs_of(|b| {
            append_mapping(
                b,
                &DomainProtocol::Unlabeled,
                libc::AF_INET as u16,
                Some(&addr),
            )
        });

        assert_eq!(
            find_attr(&attrs, MgmtAttr::Ipv4Addr as u16).unwrap(),
            &[10, 0, 0, 0]
        );
        assert_eq!(
            find_attr(&attrs, MgmtAttr::Ipv4Mask as u16).unwrap(),
            &[255, 0, 0, 0]
        );
    }

    #[test]
    fn test_validate_rejects_selector_list_add() {
        let protocol = DomainProtocol::AddressSelect(Vec::new());
        assert!(matches!(
            validate_add(&protocol, None),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_rejects_family_mismatch() {
        let v6 = NetAddr::v6("::1".parse().unwrap(), "::".parse().unwrap());
        assert!(matches!(
            validate_add(&DomainProtocol::Cipsov4(16), Some(&v6)),
            Err(Error::InvalidArgument(_))
        ));

        let v4 = NetAddr::v4(Ipv4Addr::LOCALHOST, Ipv4Addr::BROADCAST);
        assert!(matches!(
            validate_add(&DomainProtocol::Calipso(16), Some(&v4)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_mapping_plain_protocol() {
        let attrs = attrs_of(|b| {
            b.append_attr_u16(MgmtAttr::Family as u16, libc::AF_INET as u16);
            b.append_attr_u32(MgmtAttr::Protocol as u16, nltype::CIPSOV4);
            b.append_attr_u32(MgmtAttr::Cv4Doi as u16, 16);
        });

        let mapping = parse_mapping(&attrs, Some("web_t".into())).unwrap();
        assert_eq!(mapping.domain.as_deref(), Some("web_t"));
        assert_eq!(mapping.family, libc::AF_INET as u16);
        assert_eq!(mapping.protocol, DomainProtocol::Cipsov4(16));
    }

    #[test]
    fn test_parse_mapping_defaults_family() {
        let attrs = attrs_of(|b| {
            b.append_attr_u32(MgmtAttr::Protocol as u16, nltype::UNLABELED);
        });

        let mapping = parse_mapping(&attrs, None).unwrap();
        assert_eq!(mapping.family, libc::AF_UNSPEC as u16);
        assert_eq!(mapping.protocol, DomainProtocol::Unlabeled);
    }

    #[test]
    fn test_parse_mapping_missing_doi() {
        let attrs = attrs_of(|b| {
            b.append_attr_u32(MgmtAttr::Protocol as u16, nltype::CALIPSO);
        });
        assert!(matches!(
            parse_mapping(&attrs, None),
            Err(Error::BadMessage(_))
        ));
    }

    #[test]
    fn test_parse_selector_list() {
        let attrs = attrs_of(|b| {
            b.append_attr_u16(MgmtAttr::Family as u16, libc::AF_INET as u16);
            let list = b.nest_start(MgmtAttr::SelectorList as u16);

            let entry = b.nest_start(MgmtAttr::AddrSelector as u16);
            b.append_attr(MgmtAttr::Ipv4Addr as u16, &[10, 0, 0, 0]);
            b.append_attr(MgmtAttr::Ipv4Mask as u16, &[255, 0, 0, 0]);
            b.append_attr_u32(MgmtAttr::Protocol as u16, nltype::CIPSOV4);
            b.append_attr_u32(MgmtAttr::Cv4Doi as u16, 16);
            b.nest_end(entry);

            let entry = b.nest_start(MgmtAttr::AddrSelector as u16);
            b.append_attr(MgmtAttr::Ipv4Addr as u16, &[192, 168, 0, 0]);
            b.append_attr(MgmtAttr::Ipv4Mask as u16, &[255, 255, 0, 0]);
            b.append_attr_u32(MgmtAttr::Protocol as u16, nltype::UNLABELED);
            b.nest_end(entry);

            b.nest_end(list);
        });

        let mapping = parse_mapping(&attrs, Some("web_t".into())).unwrap();
        let DomainProtocol::AddressSelect(selectors) = mapping.protocol else {
            panic!("expected selector list");
        };
        assert_eq!(selectors.len(), 2);
        assert_eq!(selectors[0].protocol, SelectorProtocol::Cipsov4 { doi: 16 });
        assert_eq!(
            selectors[0].addr,
            NetAddr::v4(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 0, 0, 0))
        );
        assert_eq!(selectors[1].protocol, SelectorProtocol::Unlabeled);
    }

    #[test]
    fn test_parse_mapping_without_protocol_or_selectors() {
        let attrs = attrs_of(|b| {
            b.append_attr_u16(MgmtAttr::Family as u16, libc::AF_UNSPEC as u16);
        });
        assert!(matches!(
            parse_mapping(&attrs, None),
            Err(Error::BadMessage(_))
        ));
    }
}
