//! NetLabel subsystem catalog and family ID cache.
//!
//! Each NetLabel subsystem registers its own Generic Netlink family, so
//! the kernel-assigned family IDs differ per boot. Resolved IDs are
//! cached process-wide; operations read the cache only and fail with
//! `NotInitialized` until `init` (or a per-subsystem `resolve`) has
//! filled it.

use std::sync::atomic::{AtomicU16, Ordering};

use tracing::debug;

use crate::error::{Error, Result};
use crate::genl;
use crate::handle::Handle;

/// Generic Netlink family names registered by the NetLabel kernel code.
pub mod names {
    pub const MGMT: &str = "NLBL_MGMT";
    pub const RIPSO: &str = "NLBL_RIPSO";
    pub const CIPSOV4: &str = "NLBL_CIPSOv4";
    pub const CALIPSO: &str = "NLBL_CALIPSO";
    pub const UNLABELED: &str = "NLBL_UNLBL";
    pub const ADDRSELECT: &str = "NLBL_ADRSEL";
}

// A zero slot means "not resolved yet"; GENL never assigns family ID 0.
static MGMT_ID: AtomicU16 = AtomicU16::new(0);
static CIPSOV4_ID: AtomicU16 = AtomicU16::new(0);
static CALIPSO_ID: AtomicU16 = AtomicU16::new(0);
static UNLABELED_ID: AtomicU16 = AtomicU16::new(0);

/// The NetLabel subsystems this library speaks to.
///
/// RIPSO and the address selector families exist in the kernel's
/// catalog but expose no configuration commands, so they are not
/// listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Domain mapping management (NLBL_MGMT).
    Mgmt,
    /// CIPSO IPv4 DOI definitions (NLBL_CIPSOv4).
    Cipsov4,
    /// CALIPSO IPv6 DOI definitions (NLBL_CALIPSO).
    Calipso,
    /// Unlabeled traffic handling (NLBL_UNLBL).
    Unlabeled,
}

impl Subsystem {
    /// The subsystem's Generic Netlink family name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mgmt => names::MGMT,
            Self::Cipsov4 => names::CIPSOV4,
            Self::Calipso => names::CALIPSO,
            Self::Unlabeled => names::UNLABELED,
        }
    }

    fn slot(self) -> &'static AtomicU16 {
        match self {
            Self::Mgmt => &MGMT_ID,
            Self::Cipsov4 => &CIPSOV4_ID,
            Self::Calipso => &CALIPSO_ID,
            Self::Unlabeled => &UNLABELED_ID,
        }
    }
}

/// Get the family ID for a subsystem, querying the kernel on first use.
pub fn resolve(subsystem: Subsystem) -> Result<u16> {
    let slot = subsystem.slot();
    let cached = slot.load(Ordering::Acquire);
    if cached != 0 {
        return Ok(cached);
    }

    let hndl = Handle::open()?;
    let id = genl::resolve_family(&hndl, subsystem.name())?;
    slot.store(id, Ordering::Release);
    Ok(id)
}

/// Get the cached family ID for a subsystem without touching the kernel.
pub(crate) fn lookup(subsystem: Subsystem) -> Result<u16> {
    let id = subsystem.slot().load(Ordering::Acquire);
    if id == 0 {
        return Err(Error::NotInitialized {
            subsystem: subsystem.name(),
        });
    }
    Ok(id)
}

/// Resolve all subsystem family IDs up front.
///
/// Call once at startup; a kernel without NetLabel support surfaces
/// here as `UnsupportedSubsystem` instead of failing later mid-work.
pub fn init() -> Result<()> {
    for subsystem in [
        Subsystem::Mgmt,
        Subsystem::Cipsov4,
        Subsystem::Calipso,
        Subsystem::Unlabeled,
    ] {
        let id = resolve(subsystem)?;
        debug!(subsystem = subsystem.name(), id, "resolved subsystem");
    }
    Ok(())
}

/// Forget all cached family IDs.
///
/// The next operation on each subsystem re-resolves it. There is no
/// kernel-side state to release.
pub fn exit() {
    for slot in [&MGMT_ID, &CIPSOV4_ID, &CALIPSO_ID, &UNLABELED_ID] {
        slot.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests only touch subsystem slots that no other test writes,
    // so they stay independent of test ordering.

    #[test]
    fn test_lookup_before_resolve_fails() {
        let err = lookup(Subsystem::Mgmt).unwrap_err();
        assert!(matches!(
            err,
            Error::NotInitialized {
                subsystem: "NLBL_MGMT"
            }
        ));
    }

    #[test]
    fn test_resolve_uses_cache() {
        // Seed the slot directly; resolve must return it without any
        // kernel available.
        CALIPSO_ID.store(29, Ordering::Release);
        assert_eq!(resolve(Subsystem::Calipso).unwrap(), 29);
        assert_eq!(lookup(Subsystem::Calipso).unwrap(), 29);
    }

    #[test]
    fn test_subsystem_names() {
        assert_eq!(Subsystem::Mgmt.name(), "NLBL_MGMT");
        assert_eq!(Subsystem::Cipsov4.name(), "NLBL_CIPSOv4");
        assert_eq!(Subsystem::Calipso.name(), "NLBL_CALIPSO");
        assert_eq!(Subsystem::Unlabeled.name(), "NLBL_UNLBL");
    }
}
