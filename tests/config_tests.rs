use mate_feed::config::AppConfig;
use mate_feed::test_utils::env_lock;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const OVERRIDE_VARS: [&str; 6] = [
    "MATE_FEED_LOG_LEVEL",
    "MATE_FEED_DB_PATH",
    "MATE_FEED_HOST",
    "MATE_FEED_PORT",
    "MATE_FEED_DEFAULT_PAGE_SIZE",
    "MATE_FEED_MAX_PAGE_SIZE",
];

fn clear_overrides() {
    for var in OVERRIDE_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("mate-feed.config.toml");
    fs::write(
        &config_path,
        r#"
[database]
path = "/tmp/feed.duckdb"

[logging]
level = "debug"

[server]
port = 8088

[pagination]
default_page_size = 10
max_page_size = 40
"#,
    )
    .unwrap();

    let config = AppConfig::load_from_file(&config_path).unwrap();
    assert_eq!(config.database.path, PathBuf::from("/tmp/feed.duckdb"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.server.port, 8088);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.pagination.default_page_size, 10);
    assert_eq!(config.pagination.max_page_size, 40);
    assert_eq!(config.events.channel_capacity, 256);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_created_with_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("mate-feed.config.toml");

    let config = AppConfig::load_from_file(&config_path).unwrap();
    assert!(config_path.exists());
    assert_eq!(config.pagination.default_page_size, 20);
    assert_eq!(config.pagination.max_page_size, 100);

    let reloaded = AppConfig::load_from_file(&config_path).unwrap();
    assert_eq!(reloaded.server.port, config.server.port);
}

#[test]
fn test_malformed_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "[pagination\nmax_page_size = ").unwrap();

    let err = AppConfig::load_from_file(&config_path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_validation_rejects_bad_limits() {
    let mut config = AppConfig::default();
    config.pagination.default_page_size = 500;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.pagination.max_page_size = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.events.channel_capacity = 0;
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_env_overrides() {
    let _guard = env_lock().lock().unwrap();
    clear_overrides();
    env::set_var("MATE_FEED_LOG_LEVEL", "TRACE");
    env::set_var("MATE_FEED_DB_PATH", "/tmp/override.duckdb");
    env::set_var("MATE_FEED_PORT", "9191");
    env::set_var("MATE_FEED_MAX_PAGE_SIZE", "25");

    let mut config = AppConfig::default();
    config.apply_env_overrides();
    clear_overrides();

    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.database.path, PathBuf::from("/tmp/override.duckdb"));
    assert_eq!(config.server.port, 9191);
    assert_eq!(config.pagination.max_page_size, 25);
    assert_eq!(config.server.host, "127.0.0.1");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_unparseable_env_values_are_ignored() {
    let _guard = env_lock().lock().unwrap();
    clear_overrides();
    env::set_var("MATE_FEED_PORT", "not-a-port");
    env::set_var("MATE_FEED_DEFAULT_PAGE_SIZE", "-3");
    env::set_var("MATE_FEED_HOST", "   ");

    let mut config = AppConfig::default();
    config.apply_env_overrides();
    clear_overrides();

    assert_eq!(config.server.port, 4000);
    assert_eq!(config.pagination.default_page_size, 20);
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn test_summary_mentions_limits() {
    let summary = AppConfig::default().summary();
    assert!(summary.contains("default 20, max 100"));
    assert!(summary.contains("127.0.0.1:4000"));
}
