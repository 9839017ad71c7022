//! Fuzz test for cache key derivation
//!
//! Checks that every derived key stays inside its entity-type namespace and
//! keeps the canonical input it was derived from.
//!
//! Run with: cargo +nightly fuzz run cache_key_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::Value;
use tessera_storage::{CacheKey, PrefetchQuery};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let parts: Vec<Value> = input.split('\0').map(|p| Value::Text(p.to_string())).collect();
    let key = CacheKey::for_entity("fuzz", &parts);
    let prefix = CacheKey::namespace_prefix("fuzz");

    assert!(key.as_str().starts_with(&prefix));
    assert_eq!(key.as_str().len(), prefix.len() + 64, "hex sha-256 suffix");
    assert!(!key.is_prefetch());
    assert_eq!(key, CacheKey::for_entity("fuzz", &parts));
    assert!(key.identifies(&parts));

    let query = PrefetchQuery::new().filter(input, parts);
    let prefetch = CacheKey::for_prefetch("fuzz", &query);
    assert!(prefetch.is_prefetch());
    assert_ne!(prefetch.input(), key.input());
});
