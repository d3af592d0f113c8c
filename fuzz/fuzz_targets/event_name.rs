#![no_main]

use callscope::name::parse_event_name;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Names that parse must reassemble to the input
        if let Some(id) = parse_event_name(input) {
            let marker = match id.direction {
                callscope::name::Direction::Entry => 'i',
                callscope::name::Direction::Exit => 'o',
            };
            let rebuilt = format!("{}:{}_{}{}", id.provider, id.package, marker, id.hash);
            assert_eq!(rebuilt, input);
        }
    }
});
