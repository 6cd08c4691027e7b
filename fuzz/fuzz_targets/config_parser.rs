#![no_main]

use libfuzzer_sys::fuzz_target;
use driftcheck::config::HarnessConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = HarnessConfig::from_toml_str(input);
    }
});
