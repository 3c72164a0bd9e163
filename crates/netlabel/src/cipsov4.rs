//! NetLabel CIPSO IPv4 subsystem: DOI definitions.
//!
//! A CIPSO Domain of Interpretation (DOI) definition tells the kernel
//! how to encode MLS labels in the CIPSO IP option. Three map types
//! exist: translated (explicit local/remote level and category maps),
//! pass-through (labels copied verbatim), and local (labels never
//! leave the host, carried via a private tag).

use tracing::debug;

use crate::attr::{AttrIter, find_attr, get};
use crate::builder::MessageBuilder;
use crate::dump;
use crate::error::{Error, Result};
use crate::family::{self, Subsystem};
use crate::genl;
use crate::handle::Handle;

/// CIPSOv4 commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Cv4Cmd {
    Add = 1,
    Remove = 2,
    List = 3,
    ListAll = 4,
}

/// CIPSOv4 attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
enum Cv4Attr {
    Doi = 1,
    MapType = 2,
    Tag = 3,
    TagList = 4,
    MlsLvlLocal = 5,
    MlsLvlRemote = 6,
    MlsLvl = 7,
    MlsLvlList = 8,
    MlsCatLocal = 9,
    MlsCatRemote = 10,
    MlsCat = 11,
    MlsCatList = 12,
}

/// DOI map types.
pub const MAP_TRANS: u32 = 1;
pub const MAP_PASS: u32 = 2;
pub const MAP_LOCAL: u32 = 3;

/// CIPSO tag type reserved for local (host-only) labeling.
const TAG_LOCAL: u8 = 128;

/// One level or category translation: the local MLS value and the
/// value carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MlsTranslation {
    pub local: u32,
    pub remote: u32,
}

/// A full DOI definition as returned by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cipsov4Mapping {
    /// Map type (MAP_TRANS, MAP_PASS, MAP_LOCAL).
    pub mtype: u32,
    /// CIPSO tag types, in preference order.
    pub tags: Vec<u8>,
    /// Level translations; empty except for MAP_TRANS.
    pub levels: Vec<MlsTranslation>,
    /// Category translations; empty except for MAP_TRANS.
    pub categories: Vec<MlsTranslation>,
}

/// A DOI and its map type, as returned by `list_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoiMapping {
    pub doi: u32,
    pub mtype: u32,
}

/// Add a translated DOI definition with explicit level and category
/// maps.
pub fn add_trans(
    hndl: Option<&Handle>,
    doi: u32,
    tags: &[u8],
    levels: &[MlsTranslation],
    categories: &[MlsTranslation],
) -> Result<()> {
    if doi == 0 {
        return Err(Error::InvalidArgument("DOI zero is reserved".into()));
    }
    if tags.is_empty() {
        return Err(Error::InvalidArgument("no CIPSO tags given".into()));
    }
    if levels.is_empty() {
        return Err(Error::InvalidArgument("no level translations given".into()));
    }

    let family_id = family::lookup(Subsystem::Cipsov4)?;
    debug!(doi, "adding translated CIPSOv4 DOI");
    genl::ack_command(hndl, family_id, Cv4Cmd::Add as u8, |builder| {
        builder.append_attr_u32(Cv4Attr::Doi as u16, doi);
        builder.append_attr_u32(Cv4Attr::MapType as u16, MAP_TRANS);
        append_tags(builder, tags);

        let list = builder.nest_start(Cv4Attr::MlsLvlList as u16);
        for lvl in levels {
            let entry = builder.nest_start(Cv4Attr::MlsLvl as u16);
            builder.append_attr_u32(Cv4Attr::MlsLvlLocal as u16, lvl.local);
            builder.append_attr_u32(Cv4Attr::MlsLvlRemote as u16, lvl.remote);
            builder.nest_end(entry);
        }
        builder.nest_end(list);

        if !categories.is_empty() {
            let list = builder.nest_start(Cv4Attr::MlsCatList as u16);
            for cat in categories {
                let entry = builder.nest_start(Cv4Attr::MlsCat as u16);
                builder.append_attr_u32(Cv4Attr::MlsCatLocal as u16, cat.local);
                builder.append_attr_u32(Cv4Attr::MlsCatRemote as u16, cat.remote);
                builder.nest_end(entry);
            }
            builder.nest_end(list);
        }
    })
}

/// Add a pass-through DOI definition.
pub fn add_pass(hndl: Option<&Handle>, doi: u32, tags: &[u8]) -> Result<()> {
    if doi == 0 {
        return Err(Error::InvalidArgument("DOI zero is reserved".into()));
    }
    if tags.is_empty() {
        return Err(Error::InvalidArgument("no CIPSO tags given".into()));
    }

    let family_id = family::lookup(Subsystem::Cipsov4)?;
    debug!(doi, "adding pass-through CIPSOv4 DOI");
    genl::ack_command(hndl, family_id, Cv4Cmd::Add as u8, |builder| {
        builder.append_attr_u32(Cv4Attr::Doi as u16, doi);
        builder.append_attr_u32(Cv4Attr::MapType as u16, MAP_PASS);
        append_tags(builder, tags);
    })
}

/// Add a local DOI definition. The tag is fixed; local labels are
/// never emitted on the wire.
pub fn add_local(hndl: Option<&Handle>, doi: u32) -> Result<()> {
    if doi == 0 {
        return Err(Error::InvalidArgument("DOI zero is reserved".into()));
    }

    let family_id = family::lookup(Subsystem::Cipsov4)?;
    debug!(doi, "adding local CIPSOv4 DOI");
    genl::ack_command(hndl, family_id, Cv4Cmd::Add as u8, |builder| {
        builder.append_attr_u32(Cv4Attr::Doi as u16, doi);
        builder.append_attr_u32(Cv4Attr::MapType as u16, MAP_LOCAL);
        append_tags(builder, &[TAG_LOCAL]);
    })
}

/// Remove a DOI definition.
pub fn remove(hndl: Option<&Handle>, doi: u32) -> Result<()> {
    let family_id = family::lookup(Subsystem::Cipsov4)?;
    debug!(doi, "removing CIPSOv4 DOI");
    genl::ack_command(hndl, family_id, Cv4Cmd::Remove as u8, |builder| {
        builder.append_attr_u32(Cv4Attr::Doi as u16, doi);
    })
}

/// Fetch one DOI definition.
pub fn list(hndl: Option<&Handle>, doi: u32) -> Result<Cipsov4Mapping> {
    let family_id = family::lookup(Subsystem::Cipsov4)?;
    let response = genl::query(hndl, family_id, Cv4Cmd::List as u8, |builder| {
        builder.append_attr_u32(Cv4Attr::Doi as u16, doi);
    })?;
    let attrs = genl::response_attrs(&response, Cv4Cmd::List as u8)?;
    parse_mapping(attrs)
}

/// List every defined DOI with its map type.
pub fn list_all(hndl: Option<&Handle>) -> Result<Vec<DoiMapping>> {
    let family_id = family::lookup(Subsystem::Cipsov4)?;
    dump::dump(
        hndl,
        family_id,
        Cv4Cmd::ListAll as u8,
        |_| {},
        |attrs| {
            let doi = find_attr(attrs, Cv4Attr::Doi as u16)
                .ok_or_else(|| Error::BadMessage("DOI record missing DOI".into()))
                .and_then(get::u32_ne)?;
            let mtype = find_attr(attrs, Cv4Attr::MapType as u16)
                .ok_or_else(|| Error::BadMessage("DOI record missing map type".into()))
                .and_then(get::u32_ne)?;
            Ok(DoiMapping { doi, mtype })
        },
    )
}

fn append_tags(builder: &mut MessageBuilder, tags: &[u8]) {
    let list = builder.nest_start(Cv4Attr::TagList as u16);
    for &tag in tags {
        builder.append_attr_u8(Cv4Attr::Tag as u16, tag);
    }
    builder.nest_end(list);
}

fn parse_mapping(attrs: &[u8]) -> Result<Cipsov4Mapping> {
    let mtype = find_attr(attrs, Cv4Attr::MapType as u16)
        .ok_or_else(|| Error::BadMessage("DOI definition missing map type".into()))
        .and_then(get::u32_ne)?;

    let mut tags = Vec::new();
    if let Some(list) = find_attr(attrs, Cv4Attr::TagList as u16) {
        for (kind, payload) in AttrIter::new(list) {
            if kind == Cv4Attr::Tag as u16 {
                tags.push(get::u8(payload)?);
            }
        }
    }

    let levels = find_attr(attrs, Cv4Attr::MlsLvlList as u16)
        .map(|list| {
            parse_translations(
                list,
                Cv4Attr::MlsLvl as u16,
                Cv4Attr::MlsLvlLocal as u16,
                Cv4Attr::MlsLvlRemote as u16,
            )
        })
        .transpose()?
        .unwrap_or_default();

    let categories = find_attr(attrs, Cv4Attr::MlsCatList as u16)
        .map(|list| {
            parse_translations(
                list,
                Cv4Attr::MlsCat as u16,
                Cv4Attr::MlsCatLocal as u16,
                Cv4Attr::MlsCatRemote as u16,
            )
        })
        .transpose()?
        .unwrap_or_default();

    Ok(Cipsov4Mapping {
        mtype,
        tags,
        levels,
        categories,
    })
}

fn parse_translations(
    list: &[u8],
    entry_id: u16,
    local_id: u16,
    remote_id: u16,
) -> Result<Vec<MlsTranslation>> {
    let mut out = Vec::new();
    for (kind, entry) in AttrIter::new(list) {
        if kind != entry_id {
            continue;
        }
        let local = find_attr(entry, local_id)
            .ok_or_else(|| Error::BadMessage("translation missing local value".into()))
            .and_then(get::u32_ne)?;
        let remote = find_attr(entry, remote_id)
            .ok_or_else(|| Error::BadMessage("translation missing remote value".into()))
            .and_then(get::u32_ne)?;
        out.push(MlsTranslation { local, remote });
    }
    Ok(out)
}
