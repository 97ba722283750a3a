//! Database writer
//!
//! Collects networks, autonomous systems, countries and metadata in memory
//! and encodes them into a single file. Deduplication and path compression
//! of the network trie happen here, once, when the file is produced.

use crate::autonomous_system::{AsTable, AutonomousSystem};
use crate::country::{Country, CountryTable};
use crate::error::{LocError, Result};
use crate::format::{
    AsEntry, CountryEntry, FileHeader, NetworkEntry, NodeEntry, MAGIC, NO_NETWORK, VERSION,
};
use crate::network::Network;
use crate::network_tree::NetworkTree;
use crate::signature::{self, SigningKey, SIGNATURE_LENGTH};
use crate::stringpool::StringPool;
use log::{debug, info, warn};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{FromZeros, IntoBytes};

/// Summary of an encoded database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    /// Networks added to the writer
    pub networks_added: usize,
    /// Networks left after deduplication
    pub networks_written: usize,
    /// Nodes in the encoded radix tree
    pub nodes_written: usize,
    /// Autonomous systems written
    pub autonomous_systems: usize,
    /// Countries written
    pub countries: usize,
    /// Distinct strings in the pool, including ""
    pub strings: usize,
    /// Total file size in bytes
    pub bytes: usize,
    /// Whether a signature was appended
    pub signed: bool,
}

/// Builder for location databases
///
/// # Example
///
/// ```
/// use locdb::{Database, Writer};
///
/// let mut writer = Writer::new();
/// writer.set_metadata("Example Vendor", "Test data", "CC0");
/// writer.add_network("2001:db8::/32")?.set_country_code("DE")?;
/// writer.add_as(64512)?.set_name("Example Networks");
///
/// let db = Database::from_bytes(writer.to_bytes()?)?;
/// assert_eq!(db.lookup("2001:db8::1")?.unwrap().country_code(), Some("DE"));
/// # Ok::<(), locdb::LocError>(())
/// ```
#[derive(Default)]
pub struct Writer {
    tree: NetworkTree,
    ases: AsTable,
    countries: CountryTable,
    vendor: String,
    description: String,
    license: String,
    created_at: Option<u64>,
    expires_at: u64,
    signing_key: Option<SigningKey>,
}

impl Writer {
    /// Create an empty, unsigned writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign the output with the given key
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Set or clear the signing key
    pub fn set_signing_key(&mut self, key: Option<SigningKey>) {
        self.signing_key = key;
    }

    /// Set vendor, description and license in one call
    pub fn set_metadata(
        &mut self,
        vendor: impl Into<String>,
        description: impl Into<String>,
        license: impl Into<String>,
    ) {
        self.vendor = vendor.into();
        self.description = description.into();
        self.license = license.into();
    }

    /// Set the vendor string
    pub fn set_vendor(&mut self, vendor: impl Into<String>) {
        self.vendor = vendor.into();
    }

    /// Set the description string
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Set the license string
    pub fn set_license(&mut self, license: impl Into<String>) {
        self.license = license.into();
    }

    /// Override the creation timestamp (UNIX seconds, defaults to now)
    pub fn set_created_at(&mut self, created_at: u64) {
        self.created_at = Some(created_at);
    }

    /// Set the expiry timestamp (UNIX seconds, 0 = never)
    pub fn set_expires_at(&mut self, expires_at: u64) {
        self.expires_at = expires_at;
    }

    /// Add a network and return its record for setting attributes
    ///
    /// Adding an existing network replaces it with a fresh record.
    ///
    /// # Errors
    /// - `InvalidPrefix` if the string is not a valid network
    pub fn add_network(&mut self, network: &str) -> Result<&mut Network> {
        let network: Network = network.parse()?;
        debug!("add network {}", network);
        Ok(self.tree.insert(network))
    }

    /// Add an already constructed network, attributes included
    pub fn insert_network(&mut self, network: Network) -> &mut Network {
        self.tree.insert(network)
    }

    /// Add an autonomous system or return the existing one
    ///
    /// # Errors
    /// - `Encoding` for AS number 0
    pub fn add_as(&mut self, number: u32) -> Result<&mut AutonomousSystem> {
        self.ases.add(number)
    }

    /// Add a country or return the existing one
    ///
    /// # Errors
    /// - `InvalidCountryCode` if the code is not two letters
    pub fn add_country(&mut self, code: &str) -> Result<&mut Country> {
        self.countries.add(code)
    }

    /// The network trie collected so far
    pub fn networks(&self) -> &NetworkTree {
        &self.tree
    }

    /// Number of networks added so far
    pub fn network_count(&self) -> usize {
        self.tree.count_networks()
    }

    /// Number of autonomous systems added so far
    pub fn as_count(&self) -> usize {
        self.ases.len()
    }

    /// Encode the database into a byte vector
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.encode().map(|(bytes, _)| bytes)
    }

    /// Encode the database and publish it atomically at `path`
    ///
    /// The file is written to a temporary file in the same directory,
    /// synced and then renamed into place, so readers never observe a
    /// partially written database.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<WriterStats> {
        let path = path.as_ref();
        let (bytes, stats) = self.encode()?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LocError::Io(e.error))?;

        info!(
            "wrote {}: {} networks ({} added), {} nodes, {} ASes, {} bytes{}",
            path.display(),
            stats.networks_written,
            stats.networks_added,
            stats.nodes_written,
            stats.autonomous_systems,
            stats.bytes,
            if stats.signed { ", signed" } else { "" }
        );
        Ok(stats)
    }

    fn encode(&self) -> Result<(Vec<u8>, WriterStats)> {
        if self.tree.is_empty() && self.ases.is_empty() {
            warn!("database contains no networks and no autonomous systems");
        }

        let mut pool = StringPool::new();
        let vendor = pool.add(&self.vendor)?;
        let description = pool.add(&self.description)?;
        let license = pool.add(&self.license)?;

        let mut as_section = Vec::with_capacity(self.ases.len() * 8);
        for system in self.ases.iter() {
            let entry = AsEntry {
                number: U32::new(system.number()),
                name: U32::new(pool.add(system.name())?),
            };
            as_section.extend_from_slice(entry.as_bytes());
        }

        let mut country_section = Vec::with_capacity(self.countries.len() * 8);
        for country in self.countries.iter() {
            let entry = CountryEntry {
                code: country.raw_code(),
                continent_code: country.raw_continent_code(),
                name: U32::new(pool.add(country.name())?),
            };
            country_section.extend_from_slice(entry.as_bytes());
        }

        let (nodes, records) = self.tree.compress();
        debug!(
            "compressed {} trie nodes into {} radix nodes, {} of {} networks survive",
            self.tree.count_nodes(),
            nodes.len(),
            records.len(),
            self.tree.count_networks()
        );
        to_u32(records.len(), "network count")?;
        to_u32(nodes.len(), "node count")?;

        let mut network_section = Vec::with_capacity(records.len() * 32);
        for network in &records {
            network_section.extend_from_slice(NetworkEntry::from_network(network).as_bytes());
        }

        let mut node_section = Vec::with_capacity(nodes.len() * 16);
        for node in &nodes {
            let entry = NodeEntry {
                zero: U32::new(node.zero),
                one: U32::new(node.one),
                network: U32::new(node.network.unwrap_or(NO_NETWORK)),
                depth: node.depth,
                reserved: [0; 3],
            };
            node_section.extend_from_slice(entry.as_bytes());
        }

        let mut header = FileHeader::new_zeroed();
        header.magic = *MAGIC;
        header.version = U32::new(VERSION);
        header.created_at = U64::new(self.created_at.unwrap_or_else(now));
        header.expires_at = U64::new(self.expires_at);
        header.vendor = U32::new(vendor);
        header.description = U32::new(description);
        header.license = U32::new(license);
        if self.signing_key.is_some() {
            header.signature_length = U32::new(SIGNATURE_LENGTH as u32);
        }

        let sections: [(&[u8], &str); 5] = [
            (pool.as_bytes(), "string pool"),
            (&as_section, "AS table"),
            (&country_section, "country table"),
            (&network_section, "network records"),
            (&node_section, "radix nodes"),
        ];

        let mut offset = std::mem::size_of::<FileHeader>();
        let mut table = [(0u32, 0u32); 5];
        for (slot, (bytes, name)) in table.iter_mut().zip(sections.iter()) {
            let start = to_u32(offset, name)?;
            let length = to_u32(bytes.len(), name)?;
            offset += bytes.len();
            to_u32(offset, name)?;
            *slot = (start, length);
        }
        let [pool_s, as_s, countries_s, networks_s, nodes_s] = table;
        header.pool_offset = U32::new(pool_s.0);
        header.pool_length = U32::new(pool_s.1);
        header.as_offset = U32::new(as_s.0);
        header.as_length = U32::new(as_s.1);
        header.countries_offset = U32::new(countries_s.0);
        header.countries_length = U32::new(countries_s.1);
        header.networks_offset = U32::new(networks_s.0);
        header.networks_length = U32::new(networks_s.1);
        header.nodes_offset = U32::new(nodes_s.0);
        header.nodes_length = U32::new(nodes_s.1);

        let mut bytes = Vec::with_capacity(offset + SIGNATURE_LENGTH);
        bytes.extend_from_slice(header.as_bytes());
        for (section, _) in sections {
            bytes.extend_from_slice(section);
        }

        if let Some(key) = &self.signing_key {
            let sig = signature::sign(key, &bytes);
            bytes.extend_from_slice(&sig);
        }

        let stats = WriterStats {
            networks_added: self.tree.count_networks(),
            networks_written: records.len(),
            nodes_written: nodes.len(),
            autonomous_systems: self.ases.len(),
            countries: self.countries.len(),
            strings: pool.len(),
            bytes: bytes.len(),
            signed: self.signing_key.is_some(),
        };
        Ok((bytes, stats))
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| LocError::Encoding(format!("{} exceeds 32-bit offsets: {}", what, value)))
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{read_header, HEADER_SIZE};

    #[test]
    fn test_empty_writer_still_encodes() {
        let bytes = Writer::new().to_bytes().unwrap();
        let header = read_header(&bytes).unwrap();
        assert_eq!(header.pool_offset.get() as usize, HEADER_SIZE);
        assert_eq!(header.networks_length.get(), 0);
        // Just the root node
        assert_eq!(header.nodes_length.get(), 16);
        assert_eq!(header.signature_length.get(), 0);
    }

    #[test]
    fn test_sections_are_contiguous() {
        let mut writer = Writer::new();
        writer.add_network("10.0.0.0/8").unwrap();
        writer.add_as(64512).unwrap().set_name("Example");
        writer.add_country("DE").unwrap().set_name("Germany");
        let bytes = writer.to_bytes().unwrap();
        let h = read_header(&bytes).unwrap();

        assert_eq!(h.as_offset.get(), h.pool_offset.get() + h.pool_length.get());
        assert_eq!(h.countries_offset.get(), h.as_offset.get() + h.as_length.get());
        assert_eq!(
            h.networks_offset.get(),
            h.countries_offset.get() + h.countries_length.get()
        );
        assert_eq!(h.nodes_offset.get(), h.networks_offset.get() + h.networks_length.get());
        assert_eq!(
            (h.nodes_offset.get() + h.nodes_length.get()) as usize,
            bytes.len()
        );
        assert_eq!(h.as_length.get(), 8);
        assert_eq!(h.countries_length.get(), 8);
        assert_eq!(h.networks_length.get(), 32);
    }

    #[test]
    fn test_signed_output_has_trailer() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let mut writer = Writer::new().with_signing_key(key);
        writer.add_network("2001:db8::/32").unwrap();
        let bytes = writer.to_bytes().unwrap();
        let h = read_header(&bytes).unwrap();
        assert_eq!(h.signature_length.get() as usize, SIGNATURE_LENGTH);
        assert_eq!(
            (h.nodes_offset.get() + h.nodes_length.get()) as usize + SIGNATURE_LENGTH,
            bytes.len()
        );
    }

    #[test]
    fn test_created_at_override() {
        let mut writer = Writer::new();
        writer.set_created_at(1_700_000_000);
        writer.set_expires_at(1_800_000_000);
        let bytes = writer.to_bytes().unwrap();
        let h = read_header(&bytes).unwrap();
        assert_eq!(h.created_at.get(), 1_700_000_000);
        assert_eq!(h.expires_at.get(), 1_800_000_000);
    }

    #[test]
    fn test_add_network_errors() {
        let mut writer = Writer::new();
        assert!(matches!(
            writer.add_network("10.0.0.0/40"),
            Err(LocError::InvalidPrefix(_))
        ));
        assert!(writer.add_as(0).is_err());
        assert!(writer.add_country("GER").is_err());
        assert_eq!(writer.network_count(), 0);

        // The writer stays usable after rejected adds
        let network = writer.add_network("10.0.0.0/8").unwrap();
        network.set_country_code("AT").unwrap();
        network.set_asn(64512);
        writer.add_as(64512).unwrap().set_name("Example");
        writer.add_country("AT").unwrap();

        let db = crate::Database::from_bytes(writer.to_bytes().unwrap()).unwrap();
        assert_eq!(db.network_count(), 1);
        let found = db.lookup("10.1.2.3").unwrap().unwrap();
        assert_eq!(found.to_string(), "10.0.0.0/8");
        assert_eq!(found.country_code(), Some("AT"));
        assert_eq!(db.get_as(64512).unwrap().unwrap().name, "Example");
        assert!(db.get_country("AT").unwrap().is_some());
    }

    #[test]
    fn test_network_entry_roundtrip() {
        let mut network: Network = "10.1.0.0/16".parse().unwrap();
        network.set_country_code("AT").unwrap();
        network.set_asn(1853);
        network.set_flag(crate::network::NetworkFlags::ANYCAST);

        let entry = NetworkEntry::from_network(&network);
        assert_eq!(entry.to_network(), network);
    }

    #[test]
    fn test_write_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut writer = Writer::new();
        writer.add_network("10.0.0.0/8").unwrap().set_asn(64512);
        let stats = writer.write(&path).unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), stats.bytes);
        assert_eq!(stats.networks_written, 1);
        // No temp files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
