//! Fuzz target for the `KEY=VALUE` line codec.
//!
//! Run with: cargo +nightly fuzz run fuzz_line_codec
//!
//! Decodes arbitrary lines and checks that escaping any decoded text value
//! unescapes back to the same text.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wifi_ap_config::codec;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    for line in codec::logical_lines(s) {
        let _ = codec::decode_line(&line);
    }

    assert_eq!(codec::unescape_value(&codec::escape_value(s)), s);
});
