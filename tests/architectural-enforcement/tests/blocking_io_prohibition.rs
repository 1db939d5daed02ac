//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: production code MUST NOT use blocking I/O once the runtime is
//! running. Network access goes through the async `reqwest` client.
//! **Exceptions**: the config loader, which reads one small file before the
//! client is created.

use architectural_enforcement::{assert_clean, scan};

const CONFIG_LOADER: &str = "config/mod.rs";

#[test]
fn test_no_blocking_fs_outside_config_loader() {
    let violations = scan(
        |code| code.contains("std::fs") || code.contains("File::open"),
        &[CONFIG_LOADER],
    );
    assert_clean("blocking file I/O", &violations);
}

#[test]
fn test_no_blocking_network_io() {
    let violations = scan(
        |code| {
            code.contains("std::net::")
                || code.contains("use std::net")
                || code.contains("reqwest::blocking")
        },
        &[],
    );

    if !violations.is_empty() {
        eprintln!("\n❌ FORBIDDEN blocking network I/O:");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - reqwest::blocking::*");
    }
    assert_clean("blocking network I/O", &violations);
}

#[test]
fn test_no_blocking_process_io() {
    let violations = scan(|code| code.contains("std::process::Command"), &[]);
    assert_clean("blocking process I/O", &violations);
}
