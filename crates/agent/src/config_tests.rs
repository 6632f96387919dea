// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults() {
    let config = AgentConfig::new();
    assert_eq!(config.mode(), SinkMode::Dev);
    assert_eq!(config.payload(), PayloadKind::Compress);
    assert_eq!(config.app_name(), "root");
    assert_eq!(config.manager_addr(), "127.0.0.1:9999");
}

#[yare::parameterized(
    dev    = { "dev", SinkMode::Dev },
    file   = { "file", SinkMode::File },
    remote = { "REMOTE", SinkMode::Remote },
)]
fn mode_parses(input: &str, expected: SinkMode) {
    let config = AgentConfig::new();
    config.apply("mode", input);
    assert_eq!(config.mode(), expected);
}

#[test]
fn unknown_mode_coerces_to_dev() {
    let config = AgentConfig::new();
    config.set_mode(SinkMode::Remote);
    config.apply("mode", "telepathy");
    assert_eq!(config.mode(), SinkMode::Dev);
}

#[test]
fn unknown_logtype_coerces_to_compress() {
    let config = AgentConfig::new();
    config.set_payload(PayloadKind::Normal);
    config.apply("logtype", "gzip");
    assert_eq!(config.payload(), PayloadKind::Compress);
}

#[test]
fn unknown_keys_are_ignored() {
    let config = AgentConfig::new();
    config.apply("verbosity", "11");
    assert_eq!(config.mode(), SinkMode::Dev);
}

#[test]
fn manager_knobs() {
    let config = AgentConfig::new();
    config.apply("manager_ip", "10.0.0.8");
    config.apply("manager_port", "4242");
    assert_eq!(config.manager_addr(), "10.0.0.8:4242");

    // Non-numeric port is ignored.
    config.apply("manager_port", "lots");
    assert_eq!(config.manager_addr(), "10.0.0.8:4242");
}

#[test]
fn derived_paths_follow_app_name_and_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = AgentConfig::new();
    config.set_output_dir(dir.path().to_path_buf());
    config.set_app_name("orders");

    assert_eq!(config.registry_path(), dir.path().join("orders.json"));
    assert_eq!(config.log_path(), dir.path().join("orders.log"));
}
