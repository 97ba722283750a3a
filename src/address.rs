//! Address helpers
//!
//! Every address is handled as a 128-bit integer in IPv6 space. IPv4
//! addresses live in the IPv4-mapped range `::ffff:0:0/96`, so one trie and
//! one lookup path serve both families.

use crate::error::{LocError, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Number of bits in the IPv4-mapped prefix (`::ffff:0:0/96`)
pub const V4_MAPPED_PREFIX: u8 = 96;

const V4_MAPPED_MARKER: u128 = 0xffff_u128 << 32;

/// Convert an IP address into its 128-bit representation
pub fn to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => ipv4_to_bits(v4),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Map an IPv4 address into `::ffff:0:0/96`
pub fn ipv4_to_bits(addr: Ipv4Addr) -> u128 {
    V4_MAPPED_MARKER | u32::from(addr) as u128
}

/// Convert a 128-bit value back into an address, unmapping IPv4
pub fn from_bits(bits: u128) -> IpAddr {
    if is_v4_mapped(bits) {
        IpAddr::V4(Ipv4Addr::from(bits as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(bits))
    }
}

/// True if the value lies in the IPv4-mapped range
#[inline]
pub fn is_v4_mapped(bits: u128) -> bool {
    bits >> 32 == 0xffff
}

/// Bit width of the family the value belongs to (32 or 128)
pub fn family_bit_length(bits: u128) -> u8 {
    if is_v4_mapped(bits) {
        32
    } else {
        128
    }
}

/// Parse an IPv4 or IPv6 address string
pub fn parse_address(s: &str) -> Result<u128> {
    s.trim()
        .parse::<IpAddr>()
        .map(to_bits)
        .map_err(|_| LocError::InvalidAddress(s.to_string()))
}

/// Bit `index` counted from the most significant bit (0..128)
#[inline]
pub fn get_bit(bits: u128, index: u8) -> u8 {
    debug_assert!(index < 128);
    ((bits >> (127 - index as u32)) & 1) as u8
}

/// Set or clear bit `index` counted from the most significant bit
#[inline]
pub fn set_bit(bits: u128, index: u8, value: u8) -> u128 {
    let mask = 1u128 << (127 - index as u32);
    if value == 0 {
        bits & !mask
    } else {
        bits | mask
    }
}

/// Netmask with the first `prefix_len` bits set
#[inline]
pub fn prefix_mask(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        p if p >= 128 => u128::MAX,
        p => u128::MAX << (128 - p as u32),
    }
}

/// Highest address covered by `first/prefix_len`
pub fn last_address(first: u128, prefix_len: u8) -> u128 {
    first | !prefix_mask(prefix_len)
}

/// Number of leading bits two values share
#[inline]
pub fn common_bits(a: u128, b: u128) -> u8 {
    (a ^ b).leading_zeros() as u8
}

/// Position of the last set bit within the address family, 0 for all zeroes
///
/// `1.0.0.0` has a bit length of 8, `2001::` of 16.
pub fn bit_length(bits: u128) -> u8 {
    let (value, width) = if is_v4_mapped(bits) {
        ((bits as u32) as u128, 32u32)
    } else {
        (bits, 128u32)
    };
    if value == 0 {
        return 0;
    }
    (width - value.trailing_zeros().min(width)) as u8
}
