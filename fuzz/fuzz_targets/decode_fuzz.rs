#![no_main]

use libfuzzer_sys::fuzz_target;
use debugcat::debugger::variables::{decode, render, RenderOpts};
use debugcat::platform::delve::{api, convert};

fuzz_target!(|data: &[u8]| {
    // Variables as they arrive on the wire
    if let Ok(wire) = serde_json::from_slice::<api::Variable>(data) {
        let var = decode(&convert::raw_value(&wire));
        let _ = render(&var, &RenderOpts::default());
        let _ = var.pointee_request();
    }
});
