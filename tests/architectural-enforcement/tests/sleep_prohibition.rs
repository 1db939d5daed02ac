//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code MUST NOT sleep. Waiting is expressed as a
//! timeout on the I/O being awaited (`tokio::time::timeout`) so the exchange
//! wakes the moment bytes or a cancel arrive.
//! **Exceptions**: test code.

use architectural_enforcement::{assert_clean, scan};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(
        |code| code.contains("::sleep(") || code.contains(".sleep("),
        &[],
    );

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!");
        eprintln!("\n✅ Use instead:");
        eprintln!("  - tokio::time::timeout around the awaited read");
        eprintln!("  - tokio::select! with the cancel channel");
    }
    assert_clean("sleep", &violations);
}

#[test]
fn test_no_os_threads_in_production_code() {
    let violations = scan(
        |code| code.contains("thread::spawn") || code.contains("std::thread"),
        &[],
    );
    assert_clean("thread", &violations);
}
