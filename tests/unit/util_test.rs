//! Tests for utility functions

use elastic_runtime_core::util::{init_tracing, init_tracing_with, now_ms, DEFAULT_DIRECTIVE};

#[test]
fn test_now_ms_advances() {
    let start = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > start);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    // a subscriber is in place now, later installs are refused
    assert!(!init_tracing_with(DEFAULT_DIRECTIVE));
    tracing::info!("tracing initialised twice without panicking");
}

#[test]
fn test_invalid_directive_is_rejected() {
    assert!(!init_tracing_with("elastic_runtime_core=notalevel"));
}
