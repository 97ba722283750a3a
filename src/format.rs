//! On-disk binary format
//!
//! Every structure is a `#[repr(C)]` struct of unaligned little-endian
//! integers, so it can be read straight out of a memory map or an owned
//! buffer without copying and regardless of alignment.
//!
//! # Layout
//!
//! ```text
//! [FileHeader: magic "LOCDB\0\0\0", version, metadata, section table]
//! [String pool: NUL-terminated UTF-8, offset 0 = ""]
//! [AS table: AsEntry array, sorted by number]
//! [Country table: CountryEntry array, sorted by code]
//! [Network records: NetworkEntry array]
//! [Radix nodes: NodeEntry array, root at index 0]
//! [Signature: signature_length bytes (optional)]
//! ```
//!
//! All section offsets are absolute byte offsets from the start of the file.

use crate::error::{LocError, Result};
use crate::network::{Network, NetworkFlags};
use std::mem;
use zerocopy::byteorder::little_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Magic bytes identifying a location database
pub const MAGIC: &[u8; 8] = b"LOCDB\0\0\0";

/// Current format version
pub const VERSION: u32 = 1;

/// Node field value meaning "no network attached"
pub const NO_NETWORK: u32 = u32::MAX;

/// File header (96 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    /// Magic bytes: "LOCDB\0\0\0"
    pub magic: [u8; 8],
    /// Format version
    pub version: U32,
    /// Creation time, UNIX seconds
    pub created_at: U64,
    /// Expiry time, UNIX seconds, 0 = never
    pub expires_at: U64,
    /// String pool offset of the vendor name
    pub vendor: U32,
    /// String pool offset of the description
    pub description: U32,
    /// String pool offset of the license
    pub license: U32,
    /// String pool section offset
    pub pool_offset: U32,
    /// String pool section length in bytes
    pub pool_length: U32,
    /// AS table offset
    pub as_offset: U32,
    /// AS table length in bytes
    pub as_length: U32,
    /// Country table offset
    pub countries_offset: U32,
    /// Country table length in bytes
    pub countries_length: U32,
    /// Network records offset
    pub networks_offset: U32,
    /// Network records length in bytes
    pub networks_length: U32,
    /// Radix node array offset
    pub nodes_offset: U32,
    /// Radix node array length in bytes
    pub nodes_length: U32,
    /// Length of the signature trailer, 0 if unsigned
    pub signature_length: U32,
    /// Reserved, zero
    pub reserved: [u8; 12],
}

/// AS table entry (8 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct AsEntry {
    /// AS number
    pub number: U32,
    /// String pool offset of the name
    pub name: U32,
}

/// Country table entry (8 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct CountryEntry {
    /// Uppercase country code
    pub code: [u8; 2],
    /// `[0, 0]` if unset
    pub continent_code: [u8; 2],
    /// String pool offset of the name
    pub name: U32,
}

/// Network record (32 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NetworkEntry {
    /// First address, network byte order, IPv4 mapped into `::ffff:0:0/96`
    pub address: [u8; 16],
    /// Prefix length in 128-bit space
    pub prefix_len: u8,
    /// Reserved, zero
    pub reserved1: u8,
    /// `[0, 0]` if unset
    pub country_code: [u8; 2],
    /// AS number, 0 if none
    pub asn: U32,
    /// `NetworkFlags` bits
    pub flags: U16,
    /// Reserved, zero
    pub reserved2: [u8; 6],
}

impl NetworkEntry {
    /// Encode a network record
    pub fn from_network(network: &Network) -> Self {
        NetworkEntry {
            address: network.raw_address().to_be_bytes(),
            prefix_len: network.raw_prefix_len(),
            reserved1: 0,
            country_code: network.raw_country_code(),
            asn: U32::new(network.asn()),
            flags: U16::new(network.flags().bits()),
            reserved2: [0; 6],
        }
    }

    /// Decode into an owned network record
    pub fn to_network(&self) -> Network {
        let mut network = Network::from_bits(u128::from_be_bytes(self.address), self.prefix_len);
        network.set_raw_country_code(self.country_code);
        network.set_asn(self.asn.get());
        network.set_flags(NetworkFlags::from_bits_truncate(self.flags.get()));
        network
    }
}

/// Radix tree node (16 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeEntry {
    /// Child index for bit 0, 0 if none
    pub zero: U32,
    /// Child index for bit 1, 0 if none
    pub one: U32,
    /// Network record index, [`NO_NETWORK`] if none
    pub network: U32,
    /// Bit depth; children branch on bit `depth`
    pub depth: u8,
    /// Reserved, zero
    pub reserved: [u8; 3],
}

/// Size of the file header in bytes
pub const HEADER_SIZE: usize = mem::size_of::<FileHeader>();

/// Parse and check the header at the start of `data`
pub fn read_header(data: &[u8]) -> Result<&FileHeader> {
    if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
        return Err(LocError::Format("bad magic bytes".to_string()));
    }
    let (header, _) = FileHeader::ref_from_prefix(data).map_err(|_| {
        LocError::Format(format!(
            "file too small for header: {} bytes (need {})",
            data.len(),
            HEADER_SIZE
        ))
    })?;
    let version = header.version.get();
    if version != VERSION {
        return Err(LocError::Format(format!(
            "unsupported format version {} (expected {})",
            version, VERSION
        )));
    }
    Ok(header)
}

/// Bounds-checked view of a section
///
/// `limit` is the end of the payload (file length minus signature).
pub fn section<'a>(
    data: &'a [u8],
    limit: usize,
    offset: u32,
    length: u32,
    name: &str,
) -> Result<&'a [u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(length as usize)
        .filter(|&end| start >= HEADER_SIZE && end <= limit && end <= data.len())
        .ok_or_else(|| {
            LocError::Corrupt(format!(
                "{} section {}+{} outside payload of {} bytes",
                name, offset, length, limit
            ))
        })?;
    Ok(&data[start..end])
}

/// Interpret a section as an array of `T`
pub fn records<'a, T>(bytes: &'a [u8], name: &str) -> Result<&'a [T]>
where
    T: FromBytes + Immutable + KnownLayout + Unaligned,
{
    <[T]>::ref_from_bytes(bytes).map_err(|_| {
        LocError::Corrupt(format!(
            "{} section length {} is not a multiple of {}",
            name,
            bytes.len(),
            mem::size_of::<T>()
        ))
    })
}
