//! Network records
//!
//! A [`Network`] is a prefix (first address + prefix length) together with
//! the attributes the database attaches to it: country code, AS number and
//! flags. The same type is used when building and when reading a database.

use crate::address::{self, V4_MAPPED_PREFIX};
use crate::error::{LocError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Country code used when the location of a network is explicitly unknown
pub const UNKNOWN_COUNTRY_CODE: &str = "XX";

/// Special attribution flags for a network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NetworkFlags(u16);

impl NetworkFlags {
    /// No flags set
    pub const NONE: NetworkFlags = NetworkFlags(0);
    /// Anonymous proxy (A1)
    pub const ANONYMOUS_PROXY: NetworkFlags = NetworkFlags(1 << 0);
    /// Satellite provider (A2)
    pub const SATELLITE_PROVIDER: NetworkFlags = NetworkFlags(1 << 1);
    /// Anycast network (A3)
    pub const ANYCAST: NetworkFlags = NetworkFlags(1 << 2);
    /// Hostile network that should be dropped (XD)
    pub const DROP: NetworkFlags = NetworkFlags(1 << 3);

    const ALL: [(NetworkFlags, &'static str); 4] = [
        (NetworkFlags::ANONYMOUS_PROXY, "A1"),
        (NetworkFlags::SATELLITE_PROVIDER, "A2"),
        (NetworkFlags::ANYCAST, "A3"),
        (NetworkFlags::DROP, "XD"),
    ];

    /// Raw bit representation
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Build from raw bits, dropping unknown ones
    pub const fn from_bits_truncate(bits: u16) -> Self {
        NetworkFlags(bits & 0x0f)
    }

    /// True if no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is also set here
    pub const fn contains(self, other: NetworkFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag in `other` is also set here
    pub const fn intersects(self, other: NetworkFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Set the flags in `other`
    pub fn insert(&mut self, other: NetworkFlags) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`
    pub fn remove(&mut self, other: NetworkFlags) {
        self.0 &= !other.0;
    }

    /// Look up a flag by its pseudo country code (`A1`, `A2`, `A3`, `XD`)
    pub fn from_code(code: &str) -> Option<NetworkFlags> {
        Self::ALL
            .iter()
            .find(|(_, c)| c.eq_ignore_ascii_case(code.trim()))
            .map(|(flag, _)| *flag)
    }

    /// Pseudo country codes of all set flags
    pub fn codes(self) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, code)| *code)
            .collect()
    }
}

impl BitOr for NetworkFlags {
    type Output = NetworkFlags;

    fn bitor(self, rhs: NetworkFlags) -> NetworkFlags {
        NetworkFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for NetworkFlags {
    fn bitor_assign(&mut self, rhs: NetworkFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for NetworkFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.codes().join("|"))
    }
}

/// Validate and normalise a two letter country code
pub(crate) fn normalize_country_code(code: &str) -> Result<[u8; 2]> {
    let bytes = code.trim().as_bytes();
    if bytes.len() != 2 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
        return Err(LocError::InvalidCountryCode(code.to_string()));
    }
    Ok([bytes[0].to_ascii_uppercase(), bytes[1].to_ascii_uppercase()])
}

/// An IP network with its location attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    /// First address, host bits cleared
    address: u128,
    /// Prefix length in 128-bit space (IPv4 networks are offset by 96)
    prefix_len: u8,
    /// `[0, 0]` when unset
    country_code: [u8; 2],
    asn: u32,
    flags: NetworkFlags,
}

impl Network {
    /// Create a network from an address and a prefix length of its family
    ///
    /// Host bits are cleared, so `10.1.2.3/8` becomes `10.0.0.0/8`.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        let (bits, max, offset) = match addr {
            IpAddr::V4(v4) => (address::ipv4_to_bits(v4), 32, V4_MAPPED_PREFIX),
            IpAddr::V6(v6) => (u128::from(v6), 128, 0),
        };
        if prefix_len > max {
            return Err(LocError::InvalidPrefix(format!(
                "{}/{}: prefix length exceeds {}",
                addr, prefix_len, max
            )));
        }
        Ok(Self::from_bits(bits, offset + prefix_len))
    }

    /// Create a network from a 128-bit address and a prefix in 128-bit space
    pub(crate) fn from_bits(bits: u128, prefix_len: u8) -> Self {
        let prefix_len = prefix_len.min(128);
        Self {
            address: bits & address::prefix_mask(prefix_len),
            prefix_len,
            country_code: [0, 0],
            asn: 0,
            flags: NetworkFlags::NONE,
        }
    }

    /// First address of the network
    pub fn first_address(&self) -> IpAddr {
        address::from_bits(self.address)
    }

    /// Last address of the network
    pub fn last_address(&self) -> IpAddr {
        address::from_bits(address::last_address(self.address, self.prefix_len))
    }

    /// Prefix length relative to the address family
    pub fn prefix_len(&self) -> u8 {
        if self.is_ipv4() {
            self.prefix_len - V4_MAPPED_PREFIX
        } else {
            self.prefix_len
        }
    }

    /// Prefix length in the 128-bit space used by the trie
    pub fn raw_prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// First address as a 128-bit value
    pub fn raw_address(&self) -> u128 {
        self.address
    }

    /// True if this is an IPv4 network
    pub fn is_ipv4(&self) -> bool {
        self.prefix_len >= V4_MAPPED_PREFIX && address::is_v4_mapped(self.address)
    }

    /// Two letter country code, if set
    pub fn country_code(&self) -> Option<&str> {
        if self.country_code == [0, 0] {
            None
        } else {
            std::str::from_utf8(&self.country_code).ok()
        }
    }

    /// Set the country code (two ASCII letters, stored uppercase)
    ///
    /// An empty string clears the code.
    pub fn set_country_code(&mut self, code: &str) -> Result<()> {
        if code.trim().is_empty() {
            self.country_code = [0, 0];
            return Ok(());
        }
        self.country_code = normalize_country_code(code)?;
        Ok(())
    }

    pub(crate) fn raw_country_code(&self) -> [u8; 2] {
        self.country_code
    }

    pub(crate) fn set_raw_country_code(&mut self, code: [u8; 2]) {
        self.country_code = code;
    }

    /// Autonomous system number, 0 if none
    pub fn asn(&self) -> u32 {
        self.asn
    }

    /// Set the autonomous system number (0 clears it)
    pub fn set_asn(&mut self, asn: u32) {
        self.asn = asn;
    }

    /// Attribution flags
    pub fn flags(&self) -> NetworkFlags {
        self.flags
    }

    /// True if all of `flag` is set
    pub fn has_flag(&self, flag: NetworkFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Set additional flags
    pub fn set_flag(&mut self, flag: NetworkFlags) {
        self.flags.insert(flag);
    }

    /// Replace all flags
    pub fn set_flags(&mut self, flags: NetworkFlags) {
        self.flags = flags;
    }

    /// True if country code, ASN and flags are equal
    pub fn same_attributes(&self, other: &Network) -> bool {
        self.country_code == other.country_code
            && self.asn == other.asn
            && self.flags == other.flags
    }

    /// True if the address falls inside this network
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.contains_bits(address::to_bits(addr))
    }

    pub(crate) fn contains_bits(&self, bits: u128) -> bool {
        bits & address::prefix_mask(self.prefix_len) == self.address
    }

    /// True if `self` lies completely inside `other`
    pub fn is_subnet_of(&self, other: &Network) -> bool {
        self.prefix_len >= other.prefix_len && other.contains_bits(self.address)
    }

    /// True if the two networks share at least one address
    pub fn overlaps(&self, other: &Network) -> bool {
        self.is_subnet_of(other) || other.is_subnet_of(self)
    }

    /// Split into the two halves one bit longer, `None` for a single address
    ///
    /// Both halves inherit the attributes.
    pub fn subnets(&self) -> Option<(Network, Network)> {
        if self.prefix_len >= 128 {
            return None;
        }
        let prefix_len = self.prefix_len + 1;
        let mut zero = *self;
        zero.prefix_len = prefix_len;
        let mut one = zero;
        one.address = address::set_bit(self.address, self.prefix_len, 1);
        Some((zero, one))
    }

    /// Everything in `self` that is not in `other`, in ascending order
    pub fn exclude(&self, other: &Network) -> Vec<Network> {
        if !self.overlaps(other) {
            return vec![*self];
        }
        if self.is_subnet_of(other) {
            return Vec::new();
        }

        let mut remaining = Vec::new();
        let mut current = *self;
        while current.prefix_len < other.prefix_len {
            let Some((zero, one)) = current.subnets() else {
                break;
            };
            if other.is_subnet_of(&zero) {
                remaining.push(one);
                current = zero;
            } else {
                remaining.push(zero);
                current = one;
            }
        }
        remaining.sort();
        remaining
    }

    /// DNS reverse pointer for the network
    ///
    /// Returns `None` if the prefix does not fall on a label boundary
    /// (octets for IPv4, nibbles for IPv6). Partial networks get a leading
    /// wildcard label.
    pub fn reverse_pointer(&self) -> Option<String> {
        let mut labels = Vec::new();
        let suffix;
        let full;

        if self.is_ipv4() {
            let prefix = self.prefix_len();
            if prefix % 8 != 0 {
                return None;
            }
            let octets = (self.address as u32).to_be_bytes();
            for octet in octets.iter().take(prefix as usize / 8).rev() {
                labels.push(octet.to_string());
            }
            suffix = "in-addr.arpa.";
            full = prefix == 32;
        } else {
            if self.prefix_len % 4 != 0 {
                return None;
            }
            let nibbles = self.prefix_len as usize / 4;
            for i in (0..nibbles).rev() {
                let nibble = (self.address >> (124 - 4 * i)) & 0xf;
                labels.push(format!("{:x}", nibble));
            }
            suffix = "ip6.arpa.";
            full = self.prefix_len == 128;
        }

        let mut out = String::new();
        if !full {
            out.push_str("*.");
        }
        for label in labels {
            out.push_str(&label);
            out.push('.');
        }
        out.push_str(suffix);
        Some(out)
    }
}

impl PartialOrd for Network {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Network {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address
            .cmp(&other.address)
            .then(self.prefix_len.cmp(&other.prefix_len))
            .then(self.country_code.cmp(&other.country_code))
            .then(self.asn.cmp(&other.asn))
            .then(self.flags.0.cmp(&other.flags.0))
    }
}

impl FromStr for Network {
    type Err = LocError;

    /// Parse `address/prefix`; a bare address is a single-host network
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (addr_str, prefix_str) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = addr_str
            .parse()
            .map_err(|_| LocError::InvalidPrefix(format!("{}: invalid address", s)))?;

        let prefix_len = match prefix_str {
            Some(p) => p
                .parse::<u8>()
                .map_err(|_| LocError::InvalidPrefix(format!("{}: invalid prefix length", s)))?,
            None if addr.is_ipv4() => 32,
            None => 128,
        };

        Network::new(addr, prefix_len)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.first_address(), self.prefix_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Network {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(net("10.0.0.0/8").to_string(), "10.0.0.0/8");
        assert_eq!(net("10.1.2.3/8").to_string(), "10.0.0.0/8");
        assert_eq!(net("2001:db8::1/32").to_string(), "2001:db8::/32");
        assert_eq!(net("2001:db8::").to_string(), "2001:db8::/128");
        assert_eq!(net("192.0.2.1").to_string(), "192.0.2.1/32");
        assert_eq!(net("0.0.0.0/0").to_string(), "0.0.0.0/0");
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(matches!(
            "xxxx:xxxx::/32".parse::<Network>(),
            Err(LocError::InvalidPrefix(_))
        ));
        assert!("10.0.0.0/33".parse::<Network>().is_err());
        assert!("2001:db8::/129".parse::<Network>().is_err());
        assert!("10.0.0.0/abc".parse::<Network>().is_err());
        assert!("".parse::<Network>().is_err());
    }

    #[test]
    fn test_ipv4_prefix_offsets() {
        let n = net("10.0.0.0/8");
        assert!(n.is_ipv4());
        assert_eq!(n.prefix_len(), 8);
        assert_eq!(n.raw_prefix_len(), 104);

        let n = net("2001:db8::/32");
        assert!(!n.is_ipv4());
        assert_eq!(n.raw_prefix_len(), 32);
    }

    #[test]
    fn test_first_and_last_address() {
        let n = net("2001:db8::1/32");
        assert_eq!(n.first_address().to_string(), "2001:db8::");
        assert_eq!(
            n.last_address().to_string(),
            "2001:db8:ffff:ffff:ffff:ffff:ffff:ffff"
        );
        assert_eq!(net("10.0.0.0/8").last_address().to_string(), "10.255.255.255");
    }

    #[test]
    fn test_contains() {
        let n = net("2001:db8::/32");
        assert!(n.contains("2001:db8::1".parse().unwrap()));
        assert!(!n.contains("2001:db9::1".parse().unwrap()));

        let n = net("10.0.0.0/8");
        assert!(n.contains("10.200.1.1".parse().unwrap()));
        assert!(!n.contains("11.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_subnet_relations() {
        let n1 = net("2001:db8::/32");
        let n2 = net("2001:db8:ffff::/48");
        assert!(n2.is_subnet_of(&n1));
        assert!(!n1.is_subnet_of(&n2));
        assert!(n1.overlaps(&n2));
        assert!(!n1.overlaps(&net("2001:db9::/32")));
        assert_eq!(n1, n1);
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_subnets() {
        let n = net("2001:db8::/32");
        let (a, b) = n.subnets().unwrap();
        assert_eq!(a.to_string(), "2001:db8::/33");
        assert_eq!(b.to_string(), "2001:db8:8000::/33");
        assert!(a.is_subnet_of(&n) && b.is_subnet_of(&n));
        assert!(net("10.0.0.1/32").subnets().is_none());
    }

    #[test]
    fn test_exclude() {
        let n = net("10.0.0.0/8");
        let excluded = n.exclude(&net("10.0.0.0/10"));
        let strings: Vec<String> = excluded.iter().map(|n| n.to_string()).collect();
        assert_eq!(strings, vec!["10.64.0.0/10", "10.128.0.0/9"]);

        assert!(net("10.0.0.0/16").exclude(&n).is_empty());
        assert_eq!(n.exclude(&net("11.0.0.0/8")), vec![n]);
    }

    #[test]
    fn test_exclude_covers_remainder() {
        let n1 = net("2001:db8::/32");
        let n2 = net("2001:db8:ffff::/48");
        let excluded = n1.exclude(&n2);
        assert_eq!(excluded.len(), 16);
        for part in &excluded {
            assert!(part.is_subnet_of(&n1));
            assert!(!part.overlaps(&n2));
        }
    }

    #[test]
    fn test_country_code() {
        let mut n = net("10.0.0.0/8");
        assert_eq!(n.country_code(), None);
        n.set_country_code("de").unwrap();
        assert_eq!(n.country_code(), Some("DE"));
        assert!(matches!(
            n.set_country_code("DEU"),
            Err(LocError::InvalidCountryCode(_))
        ));
        assert!(n.set_country_code("1A").is_err());
        n.set_country_code("").unwrap();
        assert_eq!(n.country_code(), None);
    }

    #[test]
    fn test_flags() {
        let mut n = net("10.0.0.0/8");
        n.set_flag(NetworkFlags::ANYCAST);
        n.set_flag(NetworkFlags::DROP);
        assert!(n.has_flag(NetworkFlags::ANYCAST));
        assert!(!n.has_flag(NetworkFlags::ANONYMOUS_PROXY));
        assert_eq!(n.flags().to_string(), "A3|XD");
        assert_eq!(NetworkFlags::from_code("a2"), Some(NetworkFlags::SATELLITE_PROVIDER));
        assert_eq!(NetworkFlags::from_code("ZZ"), None);
        assert_eq!(NetworkFlags::from_bits_truncate(0xff).bits(), 0x0f);
    }

    #[test]
    fn test_same_attributes() {
        let mut a = net("10.0.0.0/8");
        let mut b = net("10.0.0.0/16");
        assert!(a.same_attributes(&b));
        a.set_asn(64512);
        assert!(!a.same_attributes(&b));
        b.set_asn(64512);
        b.set_country_code("DE").unwrap();
        assert!(!a.same_attributes(&b));
    }

    #[test]
    fn test_reverse_pointers() {
        let cases = [
            ("::1/128", Some("1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.ip6.arpa.")),
            ("2001:db8::/32", Some("*.8.b.d.0.1.0.0.2.ip6.arpa.")),
            ("10.0.0.0/32", Some("0.0.0.10.in-addr.arpa.")),
            ("10.0.0.0/24", Some("*.0.0.10.in-addr.arpa.")),
            ("10.0.0.0/16", Some("*.0.10.in-addr.arpa.")),
            ("10.0.0.0/8", Some("*.10.in-addr.arpa.")),
            ("10.0.0.0/0", Some("*.in-addr.arpa.")),
            ("10.0.0.0/1", None),
        ];

        for (network, expected) in cases {
            assert_eq!(
                net(network).reverse_pointer().as_deref(),
                expected,
                "reverse pointer of {}",
                network
            );
        }
    }

    #[test]
    fn test_ordering() {
        let mut nets = vec![net("10.0.0.0/16"), net("9.0.0.0/8"), net("10.0.0.0/8")];
        nets.sort();
        let strings: Vec<String> = nets.iter().map(|n| n.to_string()).collect();
        assert_eq!(strings, vec!["9.0.0.0/8", "10.0.0.0/8", "10.0.0.0/16"]);
    }
}
