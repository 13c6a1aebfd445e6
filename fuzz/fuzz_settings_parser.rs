//! Fuzz target for the daemon settings parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_settings_parser
//!
//! Feeds arbitrary text to `AppConfig::parse()` looking for panics in the
//! TOML parsing and validation pipeline.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = wifi_ap_config::AppConfig::parse(s);
    }
});
