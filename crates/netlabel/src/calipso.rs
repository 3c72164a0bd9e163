//! NetLabel CALIPSO subsystem: IPv6 DOI definitions.
//!
//! CALIPSO is the IPv6 counterpart of CIPSO. The kernel only
//! implements the pass-through map type, so the surface here is
//! correspondingly small.

use tracing::debug;

use crate::attr::{find_attr, get};
use crate::dump;
use crate::error::{Error, Result};
use crate::family::{self, Subsystem};
use crate::genl;
use crate::handle::Handle;

/// CALIPSO commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ClpCmd {
    Add = 1,
    Remove = 2,
    List = 3,
    ListAll = 4,
}

/// CALIPSO attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
enum ClpAttr {
    Doi = 1,
    MapType = 2,
}

/// Pass-through map type, the only one the kernel supports.
pub const MAP_PASS: u32 = 2;

/// A DOI and its map type, as returned by `list_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoiMapping {
    pub doi: u32,
    pub mtype: u32,
}

/// Add a pass-through DOI definition.
pub fn add_pass(hndl: Option<&Handle>, doi: u32) -> Result<()> {
    if doi == 0 {
        return Err(Error::InvalidArgument("DOI zero is reserved".into()));
    }

    let family_id = family::lookup(Subsystem::Calipso)?;
    debug!(doi, "adding pass-through CALIPSO DOI");
    genl::ack_command(hndl, family_id, ClpCmd::Add as u8, |builder| {
        builder.append_attr_u32(ClpAttr::Doi as u16, doi);
        builder.append_attr_u32(ClpAttr::MapType as u16, MAP_PASS);
    })
}

/// Remove a DOI definition.
pub fn remove(hndl: Option<&Handle>, doi: u32) -> Result<()> {
    let family_id = family::lookup(Subsystem::Calipso)?;
    debug!(doi, "removing CALIPSO DOI");
    genl::ack_command(hndl, family_id, ClpCmd::Remove as u8, |builder| {
        builder.append_attr_u32(ClpAttr::Doi as u16, doi);
    })
}

/// Fetch one DOI definition's map type.
pub fn list(hndl: Option<&Handle>, doi: u32) -> Result<u32> {
    let family_id = family::lookup(Subsystem::Calipso)?;
    let response = genl::query(hndl, family_id, ClpCmd::List as u8, |builder| {
        builder.append_attr_u32(ClpAttr::Doi as u16, doi);
    })?;
    let attrs = genl::response_attrs(&response, ClpCmd::List as u8)?;
    find_attr(attrs, ClpAttr::MapType as u16)
        .ok_or_else(|| Error::BadMessage("DOI definition missing map type".into()))
        .and_then(get::u32_ne)
}

/// List every defined DOI with its map type.
pub fn list_all(hndl: Option<&Handle>) -> Result<Vec<DoiMapping>> {
    let family_id = family::lookup(Subsystem::Calipso)?;
    dump::dump(
        hndl,
        family_id,
        ClpCmd::ListAll as u8,
        |_| {},
        |attrs| {
            let doi = find_attr(attrs, ClpAttr::Doi as u16)
                .ok_or_else(|| Error::BadMessage("DOI record missing DOI".into()))
                .and_then(get::u32_ne)?;
            let mtype = find_attr(attrs, ClpAttr::MapType as u16)
                .ok_or_else(|| Error::BadMessage("DOI record missing map type".into()))
                .and_then(get::u32_ne)?;
            Ok(DoiMapping { doi, mtype })
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_rejects_reserved_doi() {
        assert!(matches!(
            add_pass(None, 0),
            Err(Error::InvalidArgument(_))
        ));
    }
}
