//! Database reader
//!
//! A [`Database`] is a read-only view over an encoded file, either memory
//! mapped or held in an owned buffer. Queries walk the stored structures in
//! place: nothing is rebuilt on open and strings are borrowed from the file.
//!
//! A `Database` is immutable after opening and is `Send + Sync`, so it can
//! be shared between threads behind an `Arc` without locking.

use crate::address;
use crate::autonomous_system::AsRecord;
use crate::country::CountryRecord;
use crate::error::{LocError, Result};
use crate::format::{self, AsEntry, CountryEntry, NetworkEntry, NodeEntry, NO_NETWORK};
use crate::network::{normalize_country_code, Network, NetworkFlags};
use crate::signature::{self, VerifyingKey};
use crate::stringpool;
use log::{debug, info};
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::net::IpAddr;
use std::ops::Range;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Storage for database data - either owned or memory-mapped
enum DatabaseStorage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl DatabaseStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            DatabaseStorage::Owned(v) => v.as_slice(),
            DatabaseStorage::Mmap(m) => &m[..],
        }
    }
}

/// Section boundaries and metadata copied out of the header on open
#[derive(Debug, Clone)]
struct Layout {
    created_at: u64,
    expires_at: u64,
    vendor: u32,
    description: u32,
    license: u32,
    pool: Range<usize>,
    ases: Range<usize>,
    countries: Range<usize>,
    networks: Range<usize>,
    nodes: Range<usize>,
    /// End of the signed payload
    payload_end: usize,
}

/// Options for opening a database
///
/// # Example
///
/// ```no_run
/// use locdb::{signature, OpenOptions};
///
/// let key = signature::load_verifying_key("signing-key.pub.pem")?;
/// let db = OpenOptions::new()
///     .in_memory(true)
///     .verify_with(key)
///     .open("location.db")?;
/// # Ok::<(), locdb::LocError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    in_memory: bool,
    verifying_key: Option<VerifyingKey>,
}

impl OpenOptions {
    /// Default options: memory mapped, no signature check
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the whole file into memory instead of mapping it
    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    /// Refuse to open the database unless it is signed by this key
    pub fn verify_with(mut self, key: VerifyingKey) -> Self {
        self.verifying_key = Some(key);
        self
    }

    /// Open a database file
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Database> {
        let path = path.as_ref();
        let storage = if self.in_memory {
            DatabaseStorage::Owned(std::fs::read(path)?)
        } else {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            if len < format::HEADER_SIZE as u64 {
                return Err(LocError::Format(format!(
                    "{}: file too small ({} bytes)",
                    path.display(),
                    len
                )));
            }
            // SAFETY: the mapping is read-only and databases are published by
            // atomic rename, so a mapped file is never rewritten in place.
            let mmap = unsafe { Mmap::map(&file) }?;
            DatabaseStorage::Mmap(mmap)
        };

        let db = self.finish(storage)?;
        info!(
            "opened {}: {} networks, {} ASes, {} bytes{}",
            path.display(),
            db.network_count(),
            db.as_count(),
            db.size(),
            if db.is_signed() { ", signed" } else { "" }
        );
        Ok(db)
    }

    /// Load a database from an owned buffer
    pub fn from_bytes(&self, data: Vec<u8>) -> Result<Database> {
        self.finish(DatabaseStorage::Owned(data))
    }

    fn finish(&self, storage: DatabaseStorage) -> Result<Database> {
        let db = Database::from_storage(storage)?;
        if let Some(key) = &self.verifying_key {
            db.verify(key)?;
        }
        Ok(db)
    }
}

/// Read-only location database
pub struct Database {
    data: DatabaseStorage,
    layout: Layout,
}

impl Database {
    /// Open a database file using memory mapping
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        OpenOptions::new().open(path)
    }

    /// Load a database from an owned buffer
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        OpenOptions::new().from_bytes(data)
    }

    fn from_storage(storage: DatabaseStorage) -> Result<Self> {
        let layout = Self::parse_layout(storage.as_slice())?;
        let db = Self {
            data: storage,
            layout,
        };

        // Metadata strings and the root node must be readable up front
        db.vendor()?;
        db.description()?;
        db.license()?;
        if db.nodes()?.is_empty() {
            return Err(LocError::Corrupt("radix tree has no root node".to_string()));
        }
        Ok(db)
    }

    fn parse_layout(data: &[u8]) -> Result<Layout> {
        let header = format::read_header(data)?;

        let signature_length = header.signature_length.get() as usize;
        let payload_end = data
            .len()
            .checked_sub(signature_length)
            .filter(|&end| end >= format::HEADER_SIZE)
            .ok_or_else(|| {
                LocError::Corrupt(format!(
                    "signature length {} exceeds file of {} bytes",
                    signature_length,
                    data.len()
                ))
            })?;

        let range = |offset: u32, length: u32, name: &str| -> Result<Range<usize>> {
            format::section(data, payload_end, offset, length, name)?;
            Ok(offset as usize..offset as usize + length as usize)
        };

        let layout = Layout {
            created_at: header.created_at.get(),
            expires_at: header.expires_at.get(),
            vendor: header.vendor.get(),
            description: header.description.get(),
            license: header.license.get(),
            pool: range(header.pool_offset.get(), header.pool_length.get(), "string pool")?,
            ases: range(header.as_offset.get(), header.as_length.get(), "AS table")?,
            countries: range(
                header.countries_offset.get(),
                header.countries_length.get(),
                "country table",
            )?,
            networks: range(
                header.networks_offset.get(),
                header.networks_length.get(),
                "network records",
            )?,
            nodes: range(header.nodes_offset.get(), header.nodes_length.get(), "radix nodes")?,
            payload_end,
        };

        // Reject sections whose length is not a whole number of records
        format::records::<AsEntry>(&data[layout.ases.clone()], "AS table")?;
        format::records::<CountryEntry>(&data[layout.countries.clone()], "country table")?;
        format::records::<NetworkEntry>(&data[layout.networks.clone()], "network records")?;
        format::records::<NodeEntry>(&data[layout.nodes.clone()], "radix nodes")?;

        Ok(layout)
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    fn pool(&self) -> &[u8] {
        &self.bytes()[self.layout.pool.clone()]
    }

    fn string(&self, offset: u32) -> Result<&str> {
        stringpool::read_string(self.pool(), offset)
    }

    fn as_entries(&self) -> Result<&[AsEntry]> {
        format::records(&self.bytes()[self.layout.ases.clone()], "AS table")
    }

    fn country_entries(&self) -> Result<&[CountryEntry]> {
        format::records(&self.bytes()[self.layout.countries.clone()], "country table")
    }

    fn network_entries(&self) -> Result<&[NetworkEntry]> {
        format::records(&self.bytes()[self.layout.networks.clone()], "network records")
    }

    fn nodes(&self) -> Result<&[NodeEntry]> {
        format::records(&self.bytes()[self.layout.nodes.clone()], "radix nodes")
    }

    fn network_at(&self, index: u32) -> Result<Network> {
        self.network_entries()?
            .get(index as usize)
            .map(NetworkEntry::to_network)
            .ok_or_else(|| LocError::Corrupt(format!("network index {} out of range", index)))
    }

    fn node_at(&self, index: u32) -> Result<&NodeEntry> {
        self.nodes()?
            .get(index as usize)
            .ok_or_else(|| LocError::Corrupt(format!("node index {} out of range", index)))
    }

    /// Look up an address string
    ///
    /// Returns the most specific network containing the address, or
    /// `Ok(None)` if no network covers it.
    ///
    /// # Errors
    /// - `InvalidAddress` if the string is not an IP address
    /// - `Corrupt` if the tree references records outside the file
    pub fn lookup(&self, address: &str) -> Result<Option<Network>> {
        let bits = address::parse_address(address)?;
        self.lookup_bits(bits)
    }

    /// Look up a parsed address
    pub fn lookup_ip(&self, address: IpAddr) -> Result<Option<Network>> {
        self.lookup_bits(address::to_bits(address))
    }

    fn lookup_bits(&self, bits: u128) -> Result<Option<Network>> {
        let mut best = None;
        let mut node = self.node_at(0)?;

        loop {
            let network_index = node.network.get();
            if network_index != NO_NETWORK {
                let network = self.network_at(network_index)?;
                if !network.contains_bits(bits) {
                    // Nothing below this record can contain the address either
                    break;
                }
                best = Some(network);
            }

            let depth = node.depth;
            if depth >= 128 {
                break;
            }
            let child = match address::get_bit(bits, depth) {
                0 => node.zero.get(),
                _ => node.one.get(),
            };
            if child == 0 {
                break;
            }
            let next = self.node_at(child)?;
            if next.depth <= depth {
                return Err(LocError::Corrupt(format!(
                    "node {} at depth {} below depth {}",
                    child, next.depth, depth
                )));
            }
            node = next;
        }

        debug!(
            "lookup {} -> {}",
            address::from_bits(bits),
            best.map(|n| n.to_string()).unwrap_or_else(|| "none".to_string())
        );
        Ok(best)
    }

    /// Look up an autonomous system by number
    pub fn get_as(&self, number: u32) -> Result<Option<AsRecord<'_>>> {
        let entries = self.as_entries()?;
        match entries.binary_search_by_key(&number, |e| e.number.get()) {
            Ok(i) => self.as_record(&entries[i]).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn as_record(&self, entry: &AsEntry) -> Result<AsRecord<'_>> {
        Ok(AsRecord {
            number: entry.number.get(),
            name: self.string(entry.name.get())?,
        })
    }

    /// All autonomous systems in ascending number order
    pub fn ases(&self) -> impl Iterator<Item = Result<AsRecord<'_>>> + '_ {
        self.as_entries()
            .unwrap_or_default()
            .iter()
            .map(move |e| self.as_record(e))
    }

    /// Autonomous systems whose name contains `needle`, ignoring case
    pub fn search_as(&self, needle: &str) -> Result<Vec<AsRecord<'_>>> {
        let needle = needle.to_lowercase();
        let mut found = Vec::new();
        for record in self.ases() {
            let record = record?;
            if record.name.to_lowercase().contains(&needle) {
                found.push(record);
            }
        }
        Ok(found)
    }

    /// Look up a country by its two letter code
    pub fn get_country(&self, code: &str) -> Result<Option<CountryRecord<'_>>> {
        let code = normalize_country_code(code)?;
        let entries = self.country_entries()?;
        match entries.binary_search_by_key(&code, |e| e.code) {
            Ok(i) => self.country_record(&entries[i]).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn country_record<'a>(&'a self, entry: &'a CountryEntry) -> Result<CountryRecord<'a>> {
        let code = std::str::from_utf8(&entry.code)
            .map_err(|_| LocError::Corrupt("country code is not ASCII".to_string()))?;
        let continent_code = if entry.continent_code == [0, 0] {
            ""
        } else {
            std::str::from_utf8(&entry.continent_code)
                .map_err(|_| LocError::Corrupt("continent code is not ASCII".to_string()))?
        };
        Ok(CountryRecord {
            code,
            continent_code,
            name: self.string(entry.name.get())?,
        })
    }

    /// All countries in code order
    pub fn countries(&self) -> impl Iterator<Item = Result<CountryRecord<'_>>> + '_ {
        self.country_entries()
            .unwrap_or_default()
            .iter()
            .map(move |e| self.country_record(e))
    }

    /// All stored networks, parents before children, ascending addresses
    ///
    /// Each call starts a fresh traversal of the node array.
    pub fn networks(&self) -> NetworkIter<'_> {
        NetworkIter {
            db: self,
            stack: vec![(0, None)],
            visited: vec![false; self.node_count()],
        }
    }

    /// Stored networks matching a filter
    pub fn networks_filtered(
        &self,
        filter: NetworkFilter,
    ) -> impl Iterator<Item = Result<Network>> + '_ {
        self.networks().filter(move |item| match item {
            Ok(network) => filter.matches(network),
            Err(_) => true,
        })
    }

    /// Check the signature against a public key
    ///
    /// # Errors
    /// - `Signature` if the database is unsigned or the signature does not match
    pub fn verify(&self, key: &VerifyingKey) -> Result<()> {
        if !self.is_signed() {
            return Err(LocError::Signature("database is not signed".to_string()));
        }
        let data = self.bytes();
        let (payload, sig) = data.split_at(self.layout.payload_end);
        signature::verify(key, payload, sig)?;
        debug!("signature verified");
        Ok(())
    }

    /// True if the file carries a signature trailer
    pub fn is_signed(&self) -> bool {
        self.layout.payload_end < self.bytes().len()
    }

    /// Vendor string
    pub fn vendor(&self) -> Result<&str> {
        self.string(self.layout.vendor)
    }

    /// Description string
    pub fn description(&self) -> Result<&str> {
        self.string(self.layout.description)
    }

    /// License string
    pub fn license(&self) -> Result<&str> {
        self.string(self.layout.license)
    }

    /// Creation time, UNIX seconds
    pub fn created_at(&self) -> u64 {
        self.layout.created_at
    }

    /// Expiry time, UNIX seconds, `None` if the database never expires
    pub fn expires_at(&self) -> Option<u64> {
        match self.layout.expires_at {
            0 => None,
            t => Some(t),
        }
    }

    /// True if an expiry time is set and has passed
    pub fn is_expired(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.is_expired_at(now)
    }

    /// True if the database is expired at the given UNIX time
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at().is_some_and(|t| now >= t)
    }

    /// Number of stored network records
    pub fn network_count(&self) -> usize {
        self.layout.networks.len() / std::mem::size_of::<NetworkEntry>()
    }

    /// Number of radix nodes
    pub fn node_count(&self) -> usize {
        self.layout.nodes.len() / std::mem::size_of::<NodeEntry>()
    }

    /// Number of autonomous systems
    pub fn as_count(&self) -> usize {
        self.layout.ases.len() / std::mem::size_of::<AsEntry>()
    }

    /// Number of countries
    pub fn country_count(&self) -> usize {
        self.layout.countries.len() / std::mem::size_of::<CountryEntry>()
    }

    /// File size in bytes
    pub fn size(&self) -> usize {
        self.bytes().len()
    }

    /// True if the database is memory mapped
    pub fn is_mmap(&self) -> bool {
        matches!(self.data, DatabaseStorage::Mmap(_))
    }

    pub(crate) fn raw_nodes(&self) -> Result<&[NodeEntry]> {
        self.nodes()
    }

    pub(crate) fn raw_networks(&self) -> Result<&[NetworkEntry]> {
        self.network_entries()
    }

    pub(crate) fn raw_ases(&self) -> Result<&[AsEntry]> {
        self.as_entries()
    }

    pub(crate) fn raw_countries(&self) -> Result<&[CountryEntry]> {
        self.country_entries()
    }

    pub(crate) fn string_at(&self, offset: u32) -> Result<&str> {
        self.string(offset)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("size", &self.size())
            .field("mmap", &self.is_mmap())
            .field("networks", &self.network_count())
            .field("nodes", &self.node_count())
            .field("ases", &self.as_count())
            .field("countries", &self.country_count())
            .field("signed", &self.is_signed())
            .finish()
    }
}

/// Iterator over stored networks, see [`Database::networks`]
pub struct NetworkIter<'a> {
    db: &'a Database,
    /// Node index and the depth of its parent
    stack: Vec<(u32, Option<u8>)>,
    visited: Vec<bool>,
}

impl NetworkIter<'_> {
    fn fail(&mut self, err: LocError) -> Option<Result<Network>> {
        self.stack.clear();
        Some(Err(err))
    }
}

impl Iterator for NetworkIter<'_> {
    type Item = Result<Network>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((index, parent_depth)) = self.stack.pop() {
            let node = match self.db.node_at(index) {
                Ok(node) => node,
                Err(e) => return self.fail(e),
            };
            match self.visited.get_mut(index as usize) {
                Some(seen) if *seen => {
                    return self.fail(LocError::Corrupt(format!(
                        "node {} reachable more than once",
                        index
                    )));
                }
                Some(seen) => *seen = true,
                None => {}
            }
            if parent_depth.is_some_and(|d| node.depth <= d) {
                return self.fail(LocError::Corrupt(format!(
                    "node {} does not descend below its parent",
                    index
                )));
            }

            let (zero, one) = (node.zero.get(), node.one.get());
            if one != 0 {
                self.stack.push((one, Some(node.depth)));
            }
            if zero != 0 {
                self.stack.push((zero, Some(node.depth)));
            }

            let network_index = node.network.get();
            if network_index != NO_NETWORK {
                return match self.db.network_at(network_index) {
                    Ok(network) => Some(Ok(network)),
                    Err(e) => self.fail(e),
                };
            }
        }
        None
    }
}

/// IP address family selector for filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// IPv4 networks only
    V4,
    /// IPv6 networks only
    V6,
}

/// Criteria for [`Database::networks_filtered`]
///
/// Every criterion that is set must match. Several countries or AS numbers
/// match if the network has any of them.
#[derive(Debug, Clone, Default)]
pub struct NetworkFilter {
    countries: Vec<[u8; 2]>,
    asns: Vec<u32>,
    flags: NetworkFlags,
    family: Option<AddressFamily>,
}

impl NetworkFilter {
    /// Filter matching every network
    pub fn new() -> Self {
        Self::default()
    }

    /// Match networks in a country
    ///
    /// The pseudo codes `A1`, `A2`, `A3` and `XD` select the
    /// corresponding flag instead.
    pub fn country(mut self, code: &str) -> Result<Self> {
        if let Some(flag) = NetworkFlags::from_code(code) {
            self.flags.insert(flag);
        } else {
            self.countries.push(normalize_country_code(code)?);
        }
        Ok(self)
    }

    /// Match networks announced by an AS
    pub fn asn(mut self, asn: u32) -> Self {
        self.asns.push(asn);
        self
    }

    /// Match networks carrying any of these flags
    pub fn flags(mut self, flags: NetworkFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    /// Match one address family only
    pub fn family(mut self, family: AddressFamily) -> Self {
        self.family = Some(family);
        self
    }

    /// True if the network passes the filter
    pub fn matches(&self, network: &Network) -> bool {
        if !self.countries.is_empty() && !self.countries.contains(&network.raw_country_code()) {
            return false;
        }
        if !self.asns.is_empty() && !self.asns.contains(&network.asn()) {
            return false;
        }
        if !self.flags.is_empty() && !network.flags().intersects(self.flags) {
            return false;
        }
        match self.family {
            Some(AddressFamily::V4) => network.is_ipv4(),
            Some(AddressFamily::V6) => !network.is_ipv4(),
            None => true,
        }
    }
}
