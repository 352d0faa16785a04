#![no_main]
use communique_store::Jid;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(jid) = s.parse::<Jid>() {
        // Anything that parses must survive a display round trip.
        let again: Jid = jid.to_string().parse().unwrap();
        assert_eq!(again, jid);
        assert!(jid.bare().is_bare());
    }
});
