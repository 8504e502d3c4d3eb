use std::{env, fs};

use gigameter_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("gigameter.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 2048

[logging]
level = "debug"

[categories]
store_path = "categories.json"
fetch_timeout_ms = 1500
refresh_interval_secs = 60
watch = true

[docs]
enabled = true
document_path = "openapi.json"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.server.body_limit_bytes, 2048);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.categories.store_path.as_deref(), Some("categories.json"));
    assert_eq!(cfg.categories.fetch_timeout_ms, 1500);
    assert_eq!(cfg.categories.refresh_interval_secs, 60);
    assert!(cfg.categories.watch);
    assert!(!cfg.categories.trust_category_header);
    assert_eq!(cfg.categories.category_header, "x-api-category");
    assert_eq!(cfg.docs.document_path.as_deref(), Some("openapi.json"));

    // 2) Env override should win over file
    unsafe {
        env::set_var("GIGAMETER__CATEGORIES__FETCH_TIMEOUT_MS", "250");
        env::set_var("GIGAMETER__CATEGORIES__TRUST_CATEGORY_HEADER", "true");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.categories.fetch_timeout_ms, 250);
    assert!(cfg_env.categories.trust_category_header);
    unsafe {
        env::remove_var("GIGAMETER__CATEGORIES__FETCH_TIMEOUT_MS");
        env::remove_var("GIGAMETER__CATEGORIES__TRUST_CATEGORY_HEADER");
    }

    // 3) A missing file yields defaults
    let defaults = load_config(dir.path().join("absent.toml").to_str()).expect("defaults");
    assert_eq!(defaults.server.port, 8080);
    assert!(defaults.categories.store_path.is_none());

    // 4) Invalid values are rejected
    let invalid_path = dir.path().join("invalid.toml");
    fs::write(
        &invalid_path,
        r#"
[categories]
fetch_timeout_ms = 0
"#,
    )
    .expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("fetch_timeout_ms must be > 0"));

    fs::write(
        &invalid_path,
        r#"
[logging]
level = "verbose"
"#,
    )
    .expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("logging.level"));

    fs::write(
        &invalid_path,
        r#"
[categories]
watch = true
"#,
    )
    .expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("requires categories.store_path"));
}
