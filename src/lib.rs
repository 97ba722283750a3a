//! locdb - Signed IP Location Database
//!
//! locdb builds and queries compact database files that map IP networks to
//! a country, an autonomous system and a handful of special-purpose flags,
//! and autonomous system numbers to organization names.
//!
//! # Quick Start
//!
//! ```rust
//! use locdb::{Database, NetworkFlags, Writer};
//!
//! let mut writer = Writer::new();
//! writer.set_metadata("Example Vendor", "Example data", "CC0-1.0");
//!
//! let network = writer.add_network("2a07:1c44:5800::/40")?;
//! network.set_country_code("DE")?;
//! network.set_asn(204867);
//!
//! let anycast = writer.add_network("192.0.2.0/24")?;
//! anycast.set_flag(NetworkFlags::ANYCAST);
//!
//! writer.add_as(204867)?.set_name("Lightning Wire Labs GmbH");
//!
//! let db = Database::from_bytes(writer.to_bytes()?)?;
//!
//! let hit = db.lookup("2a07:1c44:5800::1")?.expect("covered");
//! assert_eq!(hit.to_string(), "2a07:1c44:5800::/40");
//! assert_eq!(hit.asn(), 204867);
//!
//! let system = db.get_as(hit.asn())?.expect("known AS");
//! assert_eq!(system.name, "Lightning Wire Labs GmbH");
//! # Ok::<(), locdb::LocError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │  Writer                      │      │  Database (mmap or Vec<u8>)  │
//! │  NetworkTree (arena trie)    │      │  header + section table      │
//! │  AsTable / CountryTable      │ ───▶ │  string pool                 │
//! │  dedup + path compression    │      │  AS / country tables         │
//! │  Ed25519 signature           │      │  network records + radix     │
//! └──────────────────────────────┘      └──────────────────────────────┘
//! ```
//!
//! IPv4 and IPv6 share one tree: IPv4 addresses live in `::ffff:0:0/96`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Address bit helpers
pub mod address;
/// Autonomous system records
pub mod autonomous_system;
/// Country records
pub mod country;
/// Database reader
pub mod database;
/// Error types
pub mod error;
/// Feed reader with gzip support
pub mod file_reader;
/// On-disk binary format
pub mod format;
/// Network records and flags
pub mod network;
/// In-memory network trie
pub mod network_tree;
/// Ed25519 signing and verification
pub mod signature;
/// Deduplicated string storage
pub mod stringpool;
/// Deep structural validation
pub mod validation;
/// Database writer
pub mod writer;

pub use crate::autonomous_system::{AsRecord, AutonomousSystem};
pub use crate::country::{Country, CountryRecord};
pub use crate::database::{AddressFamily, Database, NetworkFilter, NetworkIter, OpenOptions};
pub use crate::error::{LocError, Result};
pub use crate::network::{Network, NetworkFlags, UNKNOWN_COUNTRY_CODE};
pub use crate::network_tree::NetworkTree;
pub use crate::signature::{SigningKey, VerifyingKey};
pub use crate::writer::{Writer, WriterStats};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
