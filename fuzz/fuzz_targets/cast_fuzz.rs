//! Fuzz test for value casting
//!
//! Feeds arbitrary storage text through every value kind to find panics and
//! non-canonical results.
//!
//! Run with: cargo +nightly fuzz run cast_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::{cast_value, Value, ValueKind};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let kinds = [
        ValueKind::Boolean,
        ValueKind::Integer,
        ValueKind::Float,
        ValueKind::String,
        ValueKind::Enumeration(vec!["active".to_string(), "inactive".to_string()]),
    ];

    for kind in &kinds {
        let raw = Value::Text(input.to_string());

        // Lenient casting coerces instead of failing
        let lenient = cast_value("fuzz", kind, false, raw.clone(), false)
            .expect("lenient cast should never fail");

        // A strict cast that succeeds yields a canonical value
        if let Ok(strict) = cast_value("fuzz", kind, false, raw, true) {
            let again = cast_value("fuzz", kind, false, strict.clone(), true)
                .expect("canonical value should cast again");
            assert_eq!(strict, again, "strict cast should be idempotent");
        }

        if let Value::Float(f) = lenient {
            assert!(f.is_finite(), "text never casts to a non-finite float");
        }
    }
});
