#![no_main]
use libfuzzer_sys::fuzz_target;
use locdb::validation::{validate_bytes, ValidationLevel};

fuzz_target!(|data: &[u8]| {
    // Garbage input must produce errors, never panics or endless walks
    if let Ok(db) = locdb::Database::from_bytes(data.to_vec()) {
        let _ = db.lookup("81.3.27.38");
        let _ = db.lookup("2a07:1c44:5800::1");
        for network in db.networks().take(10_000) {
            let _ = network;
        }
        for system in db.ases().take(1_000) {
            let _ = system;
        }
        let _ = db.search_as("gmbh");
    }

    let _ = validate_bytes(data.to_vec(), ValidationLevel::Strict);
});
