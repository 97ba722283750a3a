// Property: a database lookup agrees with a linear longest-prefix scan over
// every network handed to the writer. Deduplication may return a covering
// network instead of the elided one, but never different attributes.

use locdb::{Database, Writer};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

const COUNTRIES: [&str; 3] = ["DE", "AT", "CH"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attributes {
    country: &'static str,
    asn: u32,
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

fn brute_force(
    networks: &BTreeMap<(u32, u8), Attributes>,
    addr: u32,
) -> Option<(u8, Attributes)> {
    networks
        .iter()
        .filter(|((net, prefix), _)| addr & mask(*prefix) == *net)
        .max_by_key(|((_, prefix), _)| *prefix)
        .map(|((_, prefix), attrs)| (*prefix, *attrs))
}

fn network_strategy() -> impl Strategy<Value = (u32, u8, usize, u32)> {
    // Everything inside 10.0.0.0/8 so prefixes overlap often
    (0u32..=0x00FF_FFFF, 8u8..=28, 0usize..COUNTRIES.len(), 0u32..3)
        .prop_map(|(low, prefix, cc, asn)| (0x0A00_0000 | low, prefix, cc, 64512 + asn))
}

proptest! {
    #[test]
    fn test_lookup_matches_linear_scan(
        networks in prop::collection::vec(network_strategy(), 1..40),
        queries in prop::collection::vec(0u32..=0x00FF_FFFF, 1..50),
    ) {
        let mut writer = Writer::new();
        let mut expected = BTreeMap::new();

        for (addr, prefix, cc, asn) in networks {
            let net = addr & mask(prefix);
            let cidr = format!("{}/{}", Ipv4Addr::from(net), prefix);
            let network = writer.add_network(&cidr).unwrap();
            network.set_country_code(COUNTRIES[cc]).unwrap();
            network.set_asn(asn);
            // Re-adding a prefix replaces the earlier record
            expected.insert((net, prefix), Attributes { country: COUNTRIES[cc], asn });
        }

        let db = Database::from_bytes(writer.to_bytes().unwrap()).unwrap();
        prop_assert!(db.network_count() <= expected.len());

        for low in queries {
            let addr = 0x0A00_0000 | low;
            let ip = Ipv4Addr::from(addr);
            let found = db.lookup(&ip.to_string()).unwrap();

            match (brute_force(&expected, addr), found) {
                (None, None) => {}
                (Some((prefix, attrs)), Some(network)) => {
                    prop_assert!(network.contains(ip.into()));
                    prop_assert!(network.prefix_len() <= prefix);
                    prop_assert_eq!(network.country_code(), Some(attrs.country));
                    prop_assert_eq!(network.asn(), attrs.asn);
                }
                (expected, found) => {
                    prop_assert!(false, "{}: expected {:?}, found {:?}", ip, expected, found);
                }
            }
        }
    }

    #[test]
    fn test_enumeration_is_sorted_and_complete(
        networks in prop::collection::vec(network_strategy(), 1..40),
    ) {
        let mut writer = Writer::new();
        for (addr, prefix, cc, asn) in networks {
            let cidr = format!("{}/{}", Ipv4Addr::from(addr & mask(prefix)), prefix);
            let network = writer.add_network(&cidr).unwrap();
            network.set_country_code(COUNTRIES[cc]).unwrap();
            network.set_asn(asn);
        }

        let db = Database::from_bytes(writer.to_bytes().unwrap()).unwrap();
        let listed: Vec<_> = db.networks().collect::<Result<_, _>>().unwrap();

        prop_assert_eq!(listed.len(), db.network_count());
        prop_assert!(listed.windows(2).all(|w| w[0] < w[1]));
    }
}
