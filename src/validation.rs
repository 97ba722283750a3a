//! Database validation for untrusted files
//!
//! Opening a database only checks what lookups need: header, section bounds
//! and record sizes. This module walks every table and the whole radix tree
//! and reports structural problems without panicking, so a file from an
//! untrusted source can be audited before it is deployed.
//!
//! # Usage
//!
//! ```rust,no_run
//! use locdb::validation::{validate_database, ValidationLevel};
//! use std::path::Path;
//!
//! let report = validate_database(Path::new("location.db"), ValidationLevel::Strict)?;
//!
//! if !report.is_valid() {
//!     for error in &report.errors {
//!         eprintln!("  ERROR: {}", error);
//!     }
//! }
//! # Ok::<(), locdb::LocError>(())
//! ```

use crate::address;
use crate::country::CONTINENT_CODES;
use crate::database::Database;
use crate::error::Result;
use crate::format::{self, NO_NETWORK};
use crate::network::{Network, NetworkFlags};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::path::Path;

/// Validation strictness level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// Bounds, indexes, tree shape and string references
    Standard,
    /// Also cross-check records against each other (default)
    Strict,
}

/// Validation report with detailed findings
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Problems that make the database unusable or wrong
    pub errors: Vec<String>,
    /// Suspicious but usable content
    pub warnings: Vec<String>,
    /// Informational messages about database properties
    pub info: Vec<String>,
    /// Database statistics
    pub stats: DatabaseStats,
}

/// Statistics gathered during validation
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseStats {
    /// File size in bytes
    pub file_size: usize,
    /// Format version
    pub version: u32,
    /// Network records
    pub network_count: usize,
    /// IPv4 network records
    pub ipv4_networks: usize,
    /// IPv6 network records
    pub ipv6_networks: usize,
    /// Radix nodes
    pub node_count: usize,
    /// Autonomous systems
    pub as_count: usize,
    /// Countries
    pub country_count: usize,
    /// String pool size in bytes
    pub string_pool_size: usize,
    /// Signature trailer present
    pub signed: bool,
}

impl ValidationReport {
    /// Check if the database passed all validations (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.info.push(msg.into());
    }
}

impl DatabaseStats {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Version: v{}, Networks: {} ({} IPv4, {} IPv6), Nodes: {}, ASes: {}, Countries: {}, Size: {} KB",
            self.version,
            self.network_count,
            self.ipv4_networks,
            self.ipv6_networks,
            self.node_count,
            self.as_count,
            self.country_count,
            self.file_size / 1024
        )
    }
}

/// Validate a database file
///
/// Only I/O failures are returned as errors; everything wrong with the
/// content ends up in the report.
pub fn validate_database(path: &Path, level: ValidationLevel) -> Result<ValidationReport> {
    let buffer = std::fs::read(path)?;
    Ok(validate_bytes(buffer, level))
}

/// Validate an encoded database held in memory
pub fn validate_bytes(buffer: Vec<u8>, level: ValidationLevel) -> ValidationReport {
    let mut report = ValidationReport::default();
    report.stats.file_size = buffer.len();
    report.info(format!(
        "File size: {} bytes ({} KB)",
        buffer.len(),
        buffer.len() / 1024
    ));

    match format::read_header(&buffer) {
        Ok(header) => {
            report.stats.version = header.version.get();
            report.stats.string_pool_size = header.pool_length.get() as usize;
        }
        Err(e) => {
            report.error(e.to_string());
            return report;
        }
    }

    let db = match Database::from_bytes(buffer) {
        Ok(db) => db,
        Err(e) => {
            report.error(e.to_string());
            return report;
        }
    };

    report.stats.network_count = db.network_count();
    report.stats.node_count = db.node_count();
    report.stats.as_count = db.as_count();
    report.stats.country_count = db.country_count();
    report.stats.signed = db.is_signed();

    validate_metadata(&db, &mut report);
    validate_ases(&db, &mut report);
    validate_countries(&db, &mut report);
    validate_networks(&db, &mut report, level);
    validate_tree(&db, &mut report, level);

    if report.is_valid() {
        report.info(report.stats.summary());
    }
    report
}

fn validate_metadata(db: &Database, report: &mut ValidationReport) {
    match db.vendor() {
        Ok("") => report.warning("Vendor is empty"),
        Ok(vendor) => report.info(format!("Vendor: {}", vendor)),
        Err(e) => report.error(format!("Vendor: {}", e)),
    }
    if let Err(e) = db.description() {
        report.error(format!("Description: {}", e));
    }
    if let Err(e) = db.license() {
        report.error(format!("License: {}", e));
    }

    if db.is_expired() {
        report.warning(format!(
            "Database expired at {}",
            db.expires_at().unwrap_or_default()
        ));
    }
    if db.is_signed() {
        report.info("Signature trailer present");
    } else {
        report.info("Database is not signed");
    }
}

fn validate_ases(db: &Database, report: &mut ValidationReport) {
    let entries = match db.raw_ases() {
        Ok(entries) => entries,
        Err(e) => return report.error(e.to_string()),
    };

    let mut previous = 0u32;
    for (i, entry) in entries.iter().enumerate() {
        let number = entry.number.get();
        if number == 0 {
            report.error(format!("AS entry {} has reserved number 0", i));
        }
        if i > 0 && number <= previous {
            report.error(format!(
                "AS table not sorted: AS{} follows AS{}",
                number, previous
            ));
        }
        previous = number;

        if let Err(e) = db.string_at(entry.name.get()) {
            report.error(format!("AS{} name: {}", number, e));
        }
    }
}

fn validate_countries(db: &Database, report: &mut ValidationReport) {
    let entries = match db.raw_countries() {
        Ok(entries) => entries,
        Err(e) => return report.error(e.to_string()),
    };

    let mut previous: Option<[u8; 2]> = None;
    for (i, entry) in entries.iter().enumerate() {
        if !entry.code.iter().all(|b| b.is_ascii_uppercase()) {
            report.error(format!("Country entry {} has invalid code {:?}", i, entry.code));
            continue;
        }
        let code = String::from_utf8_lossy(&entry.code).into_owned();
        if previous.is_some_and(|p| entry.code <= p) {
            report.error(format!("Country table not sorted at {}", code));
        }
        previous = Some(entry.code);

        if entry.continent_code != [0, 0] {
            let continent = String::from_utf8_lossy(&entry.continent_code);
            if !CONTINENT_CODES.contains(&continent.as_ref()) {
                report.error(format!("{}: unknown continent code {:?}", code, continent));
            }
        }
        if let Err(e) = db.string_at(entry.name.get()) {
            report.error(format!("{} name: {}", code, e));
        }
    }
}

fn validate_networks(db: &Database, report: &mut ValidationReport, level: ValidationLevel) {
    let entries = match db.raw_networks() {
        Ok(entries) => entries,
        Err(e) => return report.error(e.to_string()),
    };

    let mut missing_ases = FxHashSet::default();
    let mut missing_countries = FxHashSet::default();

    for (i, entry) in entries.iter().enumerate() {
        if entry.prefix_len > 128 {
            report.error(format!(
                "Network {} has prefix length {}",
                i, entry.prefix_len
            ));
            continue;
        }
        let bits = u128::from_be_bytes(entry.address);
        if bits & !address::prefix_mask(entry.prefix_len) != 0 {
            report.error(format!("Network {} has host bits set", i));
        }
        let network = entry.to_network();

        if network.is_ipv4() {
            report.stats.ipv4_networks += 1;
        } else {
            report.stats.ipv6_networks += 1;
        }

        let cc = entry.country_code;
        if cc != [0, 0] && !cc.iter().all(|b| b.is_ascii_uppercase()) {
            report.error(format!("{}: invalid country code {:?}", network, cc));
        }
        if NetworkFlags::from_bits_truncate(entry.flags.get()).bits() != entry.flags.get() {
            report.warning(format!(
                "{}: unknown flag bits {:#06x}",
                network,
                entry.flags.get()
            ));
        }
        if entry.reserved1 != 0 || entry.reserved2 != [0; 6] {
            report.warning(format!("{}: reserved bytes are not zero", network));
        }

        if level == ValidationLevel::Strict {
            let asn = network.asn();
            if asn != 0 && db.as_count() > 0 && matches!(db.get_as(asn), Ok(None)) {
                missing_ases.insert(asn);
            }
            if let Some(code) = network.country_code() {
                if db.country_count() > 0 && matches!(db.get_country(code), Ok(None)) {
                    missing_countries.insert(code.to_string());
                }
            }
        }
    }

    if !missing_ases.is_empty() {
        report.warning(format!(
            "{} AS numbers referenced by networks have no AS entry",
            missing_ases.len()
        ));
    }
    if !missing_countries.is_empty() {
        let mut codes: Vec<String> = missing_countries.into_iter().collect();
        codes.sort();
        report.warning(format!(
            "Country codes without country entry: {}",
            codes.join(", ")
        ));
    }
}

/// Walk the radix tree from the root, checking every edge
fn validate_tree(db: &Database, report: &mut ValidationReport, level: ValidationLevel) {
    let nodes = match db.raw_nodes() {
        Ok(nodes) => nodes,
        Err(e) => return report.error(e.to_string()),
    };
    let networks = match db.raw_networks() {
        Ok(networks) => networks,
        Err(e) => return report.error(e.to_string()),
    };

    let mut visited = vec![false; nodes.len()];
    let mut referenced = vec![false; networks.len()];
    let mut redundant = 0usize;

    struct Step {
        index: u32,
        /// Depth and branch bit of the parent edge
        edge: Option<(u8, u8)>,
        /// Nearest ancestor record
        ancestor: Option<Network>,
    }

    let mut stack = vec![Step {
        index: 0,
        edge: None,
        ancestor: None,
    }];

    while let Some(step) = stack.pop() {
        let Some(node) = nodes.get(step.index as usize) else {
            report.error(format!("Node index {} out of range", step.index));
            continue;
        };
        if visited[step.index as usize] {
            report.error(format!("Node {} is reachable more than once", step.index));
            continue;
        }
        visited[step.index as usize] = true;

        if let Some((parent_depth, _)) = step.edge {
            if node.depth <= parent_depth {
                report.error(format!(
                    "Node {} at depth {} does not descend below depth {}",
                    step.index, node.depth, parent_depth
                ));
                continue;
            }
        }
        if node.depth > 128 {
            report.error(format!("Node {} has depth {}", step.index, node.depth));
            continue;
        }

        let mut ancestor = step.ancestor;
        let network_index = node.network.get();
        if network_index != NO_NETWORK {
            match networks.get(network_index as usize) {
                None => report.error(format!(
                    "Node {} references network {} out of range",
                    step.index, network_index
                )),
                Some(entry) => {
                    if std::mem::replace(&mut referenced[network_index as usize], true) {
                        report.error(format!(
                            "Network {} is referenced by more than one node",
                            network_index
                        ));
                    }
                    let network = entry.to_network();
                    if network.raw_prefix_len() != node.depth {
                        report.error(format!(
                            "{} stored at node depth {}",
                            network, node.depth
                        ));
                    }
                    if let Some((depth, bit)) = step.edge {
                        if depth < 128 && address::get_bit(network.raw_address(), depth) != bit {
                            report.error(format!("{} stored on the wrong branch", network));
                        }
                    }
                    if level == ValidationLevel::Strict {
                        if let Some(parent) = &ancestor {
                            if !network.is_subnet_of(parent) {
                                report.error(format!(
                                    "{} stored below unrelated network {}",
                                    network, parent
                                ));
                            } else if network.same_attributes(parent) {
                                redundant += 1;
                            }
                        }
                    }
                    ancestor = Some(network);
                }
            }
        }

        for (child, bit) in [(node.one.get(), 1u8), (node.zero.get(), 0u8)] {
            if child == 0 {
                continue;
            }
            if node.depth >= 128 {
                report.error(format!("Node {} at depth 128 has children", step.index));
                break;
            }
            stack.push(Step {
                index: child,
                edge: Some((node.depth, bit)),
                ancestor,
            });
        }
    }

    let unreachable = visited.iter().filter(|v| !**v).count();
    if unreachable > 0 {
        report.warning(format!("{} radix nodes are unreachable", unreachable));
    }
    let unreferenced = referenced.iter().filter(|r| !**r).count();
    if unreferenced > 0 {
        report.warning(format!(
            "{} network records are not referenced by the tree",
            unreferenced
        ));
    }
    if redundant > 0 {
        report.warning(format!(
            "{} networks repeat the attributes of their parent network",
            redundant
        ));
    }
}
