#![no_main]

use libfuzzer_sys::fuzz_target;
use debugcat::platform::delve::expr::quote_package_path;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let quoted = quote_package_path(s);
        // quoting is applied once
        assert_eq!(quote_package_path(&quoted), quoted);
    }
});
