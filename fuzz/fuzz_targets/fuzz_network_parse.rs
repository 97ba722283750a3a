#![no_main]
use libfuzzer_sys::fuzz_target;
use locdb::Network;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(network) = s.parse::<Network>() {
        // Display output must parse back to the same prefix
        let again: Network = network.to_string().parse().expect("round trip");
        assert_eq!(again, network);

        let _ = network.reverse_pointer();
        if let Some((low, high)) = network.subnets() {
            assert!(low.is_subnet_of(&network));
            assert!(high.is_subnet_of(&network));
            assert_eq!(network.exclude(&low), vec![high]);
        }
    }
});
