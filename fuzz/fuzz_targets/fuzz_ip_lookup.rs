#![no_main]
use libfuzzer_sys::fuzz_target;
use locdb::Writer;
use std::net::IpAddr;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let mut writer = Writer::new();
    for (prefix, cc) in [
        ("1.2.3.4/32", "DE"),
        ("10.0.0.0/8", "AT"),
        ("2001:db8::/32", "NL"),
        ("192.168.0.0/16", "FR"),
    ] {
        if let Ok(network) = writer.add_network(prefix) {
            let _ = network.set_country_code(cc);
        }
    }

    if let Ok(bytes) = writer.to_bytes() {
        if let Ok(db) = locdb::Database::from_bytes(bytes) {
            let _ = db.lookup(s);
            if let Ok(ip) = s.parse::<IpAddr>() {
                let _ = db.lookup_ip(ip);
            }
        }
    }
});
