use locdb::{Database, LocError, NetworkFlags, OpenOptions, Writer};
use std::fs;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn sample_writer() -> Writer {
    let mut writer = Writer::new();
    writer.set_metadata("Example Vendor", "Integration test data", "CC0-1.0");
    writer.set_created_at(1_700_000_000);

    let network = writer.add_network("2a07:1c44:5800::/40").unwrap();
    network.set_country_code("DE").unwrap();
    network.set_asn(204867);

    let network = writer.add_network("81.3.27.0/24").unwrap();
    network.set_country_code("DE").unwrap();
    network.set_asn(24679);

    let network = writer.add_network("2001:db8::/32").unwrap();
    network.set_country_code("US").unwrap();
    network.set_flag(NetworkFlags::ANONYMOUS_PROXY);

    let network = writer.add_network("0.0.0.0/0").unwrap();
    network.set_country_code("ZZ").unwrap();

    writer
        .add_as(204867)
        .unwrap()
        .set_name("Lightning Wire Labs GmbH");
    writer
        .add_as(24679)
        .unwrap()
        .set_name("Hostway Deutschland GmbH");

    let de = writer.add_country("DE").unwrap();
    de.set_continent_code("EU").unwrap();
    de.set_name("Germany");

    writer
}

#[test]
fn test_round_trip() {
    let db = Database::from_bytes(sample_writer().to_bytes().unwrap()).unwrap();

    assert_eq!(db.vendor().unwrap(), "Example Vendor");
    assert_eq!(db.description().unwrap(), "Integration test data");
    assert_eq!(db.license().unwrap(), "CC0-1.0");
    assert_eq!(db.created_at(), 1_700_000_000);
    assert_eq!(db.expires_at(), None);
    assert!(!db.is_signed());

    assert_eq!(db.network_count(), 4);
    assert_eq!(db.as_count(), 2);
    assert_eq!(db.country_count(), 1);

    let system = db.get_as(24679).unwrap().unwrap();
    assert_eq!(system.number, 24679);
    assert_eq!(system.name, "Hostway Deutschland GmbH");

    let country = db.get_country("de").unwrap().unwrap();
    assert_eq!(country.code, "DE");
    assert_eq!(country.continent_code, "EU");
    assert_eq!(country.name, "Germany");
}

#[test]
fn test_lightning_wire_labs() {
    let db = Database::from_bytes(sample_writer().to_bytes().unwrap()).unwrap();

    let network = db.lookup("2a07:1c44:5800::1").unwrap().unwrap();
    assert_eq!(network.to_string(), "2a07:1c44:5800::/40");
    assert_eq!(network.prefix_len(), 40);
    assert_eq!(network.country_code(), Some("DE"));
    assert_eq!(network.asn(), 204867);

    let system = db.get_as(network.asn()).unwrap().unwrap();
    assert_eq!(system.to_string(), "AS204867 - Lightning Wire Labs GmbH");

    // Last address in the /40
    let last = db
        .lookup("2a07:1c44:58ff:ffff:ffff:ffff:ffff:ffff")
        .unwrap()
        .unwrap();
    assert_eq!(last.to_string(), "2a07:1c44:5800::/40");
    assert!(db.lookup("2a07:1c44:5900::").unwrap().is_none());
}

#[test]
fn test_ipv4_lookups_in_mixed_database() {
    let db = Database::from_bytes(sample_writer().to_bytes().unwrap()).unwrap();

    let network = db.lookup("81.3.27.38").unwrap().unwrap();
    assert_eq!(network.to_string(), "81.3.27.0/24");
    assert!(network.is_ipv4());
    assert_eq!(network.prefix_len(), 24);

    // The IPv4 default route catches everything else in IPv4
    let fallback = db.lookup("198.51.100.7").unwrap().unwrap();
    assert_eq!(fallback.to_string(), "0.0.0.0/0");
    assert_eq!(fallback.country_code(), Some("ZZ"));

    // but not IPv6
    assert!(db.lookup("2001:db9::1").unwrap().is_none());

    let ip: IpAddr = "2001:db8::1".parse().unwrap();
    let network = db.lookup_ip(ip).unwrap().unwrap();
    assert!(network.has_flag(NetworkFlags::ANONYMOUS_PROXY));
}

#[test]
fn test_invalid_address() {
    let db = Database::from_bytes(sample_writer().to_bytes().unwrap()).unwrap();

    for input in ["not-an-ip", "300.1.1.1", "", "10.0.0.0/8", "2001:::1"] {
        assert!(
            matches!(db.lookup(input), Err(LocError::InvalidAddress(_))),
            "{:?} should be rejected",
            input
        );
    }
}

#[test]
fn test_unknown_as() {
    let db = Database::from_bytes(sample_writer().to_bytes().unwrap()).unwrap();
    assert!(db.get_as(1).unwrap().is_none());
    assert!(db.get_as(u32::MAX).unwrap().is_none());
    assert!(db.get_country("FR").unwrap().is_none());
}

#[test]
fn test_networks_enumeration_order() {
    let db = Database::from_bytes(sample_writer().to_bytes().unwrap()).unwrap();
    let networks: Vec<String> = db.networks().map(|n| n.unwrap().to_string()).collect();

    // IPv4 lives in ::ffff:0:0/96 and sorts before global IPv6
    assert_eq!(
        networks,
        vec![
            "0.0.0.0/0",
            "81.3.27.0/24",
            "2001:db8::/32",
            "2a07:1c44:5800::/40"
        ]
    );
}

#[test]
fn test_open_file_mmap() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("location.db");

    let stats = sample_writer().write(&path).unwrap();
    assert_eq!(stats.networks_written, 4);
    assert_eq!(stats.bytes as u64, fs::metadata(&path).unwrap().len());

    let db = Database::open(&path).unwrap();
    assert!(db.is_mmap());
    assert_eq!(db.lookup("81.3.27.1").unwrap().unwrap().asn(), 24679);

    let db = OpenOptions::new().in_memory(true).open(&path).unwrap();
    assert!(!db.is_mmap());
    assert_eq!(db.lookup("81.3.27.1").unwrap().unwrap().asn(), 24679);
}

#[test]
fn test_write_replaces_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("location.db");
    fs::write(&path, b"stale").unwrap();

    sample_writer().write(&path).unwrap();
    assert!(Database::open(&path).is_ok());
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        Database::open("/nonexistent/location.db"),
        Err(LocError::Io(_))
    ));
}

#[test]
fn test_bad_magic() {
    let mut bytes = sample_writer().to_bytes().unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        Database::from_bytes(bytes),
        Err(LocError::Format(_))
    ));
}

#[test]
fn test_truncated_files() {
    let bytes = sample_writer().to_bytes().unwrap();

    // Too short for a header
    let err = Database::from_bytes(bytes[..40].to_vec()).unwrap_err();
    assert!(matches!(err, LocError::Format(_)));

    // Header intact, sections cut off
    let err = Database::from_bytes(bytes[..bytes.len() - 10].to_vec()).unwrap_err();
    assert!(err.is_corruption());

    // Empty file on disk
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("empty.db");
    fs::write(&path, b"").unwrap();
    assert!(matches!(Database::open(&path), Err(LocError::Format(_))));
}

#[test]
fn test_corrupt_bytes_never_panic() {
    let bytes = sample_writer().to_bytes().unwrap();

    // Flip every byte after the header in turn; opening and querying must
    // return errors or answers, never panic or loop.
    for i in 96..bytes.len() {
        let mut corrupt = bytes.clone();
        corrupt[i] ^= 0xFF;
        if let Ok(db) = Database::from_bytes(corrupt) {
            let _ = db.lookup("81.3.27.38");
            let _ = db.lookup("2a07:1c44:5800::1");
            let _ = db.networks().count();
            let _ = db.ases().count();
        }
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

#[test]
fn test_shared_subtree_is_corrupt() {
    let mut writer = Writer::new();
    writer.add_network("10.0.0.0/8").unwrap().set_asn(64512);
    let mut bytes = writer.to_bytes().unwrap();

    // Nodes are the last section of an unsigned file. Replace them with a
    // chain where both children of every node point at the next one.
    let nodes_offset = read_u32(&bytes, 72) as usize;
    bytes.truncate(nodes_offset);
    let count = 60u32;
    for i in 0..count {
        let next = if i + 1 < count { i + 1 } else { 0 };
        bytes.extend_from_slice(&next.to_le_bytes());
        bytes.extend_from_slice(&next.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.push(i as u8);
        bytes.extend_from_slice(&[0; 3]);
    }
    bytes[76..80].copy_from_slice(&(count * 16).to_le_bytes());

    let db = Database::from_bytes(bytes).unwrap();
    assert_eq!(db.network_count(), 1);

    let items: Vec<_> = db.networks().take(1000).collect();
    assert!(items.len() <= count as usize + 1);
    assert!(matches!(items.last(), Some(Err(LocError::Corrupt(_)))));

    let filtered: Vec<_> = db
        .networks_filtered(locdb::NetworkFilter::new())
        .take(1000)
        .collect();
    assert!(matches!(filtered.last(), Some(Err(LocError::Corrupt(_)))));
}

#[test]
fn test_concurrent_readers() {
    let db = Arc::new(Database::from_bytes(sample_writer().to_bytes().unwrap()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let hit = db.lookup("2a07:1c44:5800::1").unwrap().unwrap();
                    assert_eq!(hit.asn(), 204867);
                    let hit = db.lookup(&format!("81.3.27.{}", i)).unwrap().unwrap();
                    assert_eq!(hit.asn(), 24679);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_expiry() {
    let mut writer = sample_writer();
    writer.set_expires_at(1_800_000_000);
    let db = Database::from_bytes(writer.to_bytes().unwrap()).unwrap();

    assert_eq!(db.expires_at(), Some(1_800_000_000));
    assert!(!db.is_expired_at(1_799_999_999));
    assert!(db.is_expired_at(1_800_000_000));
}

#[test]
fn test_search_as() {
    let db = Database::from_bytes(sample_writer().to_bytes().unwrap()).unwrap();

    let found = db.search_as("gmbh").unwrap();
    assert_eq!(found.len(), 2);

    let found = db.search_as("LIGHTNING").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].number, 204867);
}
