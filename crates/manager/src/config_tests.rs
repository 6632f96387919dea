// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ManagerConfig::load(&dir.path().join("absent.json"));
    assert_eq!(config.listen_addr(), "0.0.0.0:9999");
    assert!(config.algo.enable);
    assert_eq!(config.algo.active, "zscore");
}

#[test]
fn corrupt_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server_config.json");
    std::fs::write(&path, "{{{").unwrap();
    let config = ManagerConfig::load(&path);
    assert_eq!(config.server.port, 9999);
}

#[test]
fn partial_file_overrides_only_named_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("server_config.json");
    std::fs::write(
        &path,
        r#"{
            "server": { "port": 4000 },
            "algo": { "active": "weighted_entropy",
                      "weighted_entropy": { "min_entropy": 2.0 } }
        }"#,
    )
    .unwrap();

    let config = ManagerConfig::load(&path);
    // Overridden values.
    assert_eq!(config.server.port, 4000);
    assert_eq!(config.algo.active, "weighted_entropy");
    assert_eq!(config.algo.weighted_entropy.min_entropy, 2.0);
    // Untouched values keep their defaults.
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.algo.weighted_entropy.min_samples, 20);
    assert_eq!(config.algo.zscore.threshold, 3.0);
    assert_eq!(config.storage.root_dir, PathBuf::from("./squelch_data"));
}
