//! Configuration library for the Linux NetLabel subsystem.
//!
//! NetLabel attaches security labels to network traffic so that LSM
//! policy (SELinux, Smack) can follow packets across hosts. The kernel
//! exposes it over Generic Netlink as a set of subsystems; this crate
//! speaks that protocol:
//!
//! - [`mgmt`] - domain to labeling-protocol mappings
//! - [`unlabeled`] - unlabeled-traffic policy and static labels
//! - [`cipsov4`] - CIPSO IPv4 DOI definitions
//! - [`calipso`] - CALIPSO IPv6 DOI definitions
//!
//! All operations are blocking request/response exchanges and require
//! CAP_NET_ADMIN for anything that changes state.
//!
//! # Example
//!
//! ```ignore
//! use netlabel::{Handle, mgmt};
//!
//! fn main() -> netlabel::Result<()> {
//!     // Resolve the kernel's NetLabel families once at startup.
//!     netlabel::init()?;
//!
//!     // One-shot calls open a socket per operation...
//!     println!("NetLabel protocol v{}", mgmt::version(None)?);
//!
//!     // ...or reuse a handle across several.
//!     let hndl = Handle::open()?;
//!     for mapping in mgmt::list_all(Some(&hndl))? {
//!         println!("{:?}", mapping);
//!     }
//!     Ok(())
//! }
//! ```

pub mod addr;
pub mod attr;
pub mod builder;
pub mod calipso;
pub mod cipsov4;
mod dump;
pub mod error;
pub mod family;
pub mod genl;
pub mod handle;
pub mod message;
pub mod mgmt;
pub mod unlabeled;

// Re-export common types at crate root for convenience
pub use addr::NetAddr;
pub use error::{Error, Result};
pub use family::{Subsystem, exit, init};
pub use handle::{Handle, set_timeout};
