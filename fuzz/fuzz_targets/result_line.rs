#![no_main]

use libfuzzer_sys::fuzz_target;
use driftcheck::suite::parse_result_line;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Arbitrary command output must never panic the harness
        for line in input.lines() {
            let _ = parse_result_line(line);
        }
    }
});
