// Tests for configuration loading

use super::*;
use serial_test::serial;
use std::io::Write;

fn clear_env() {
    for key in [
        "TAPSYNC_CONFIG",
        "TAPSYNC_ROOM",
        "TAPSYNC_API_BASE",
        "TAPSYNC_BIND",
        "TAPSYNC_DATA_DIR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_defaults_match_experiment_protocol() {
    let config = AppConfig::default();
    assert_eq!(config.task.total, 10);
    assert_eq!(config.task.cols, 5);
    assert_eq!(config.task.carry_margin, 5);
    assert_eq!(config.scheduler.poll_interval_ms, 50);
    assert_eq!(config.scheduler.cue_delay_ms, 1000);
    assert_eq!(config.scheduler.clip_window_ms, 21_000);
    assert_eq!(config.relay.poll_limit, 200);
    assert_eq!(config.screen.display_ms, 4000);
}

#[test]
fn test_derived_durations() {
    let config = SchedulerConfig::default();
    assert_eq!(config.clip_start_after_cue(), Duration::from_millis(4000));
    assert_eq!(config.end_unlock_delay(), Duration::from_millis(31_000));
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"task": {{"total": 25}}, "relay": {{"roomId": "lab-a"}}}}"#).unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.task.total, 25);
    assert_eq!(config.task.cols, 5);
    assert_eq!(config.relay.room_id, "lab-a");
    assert_eq!(config.scheduler, SchedulerConfig::default());
}

#[test]
fn test_malformed_file_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();

    let err = AppConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
#[serial]
fn test_env_overrides_applied() {
    clear_env();
    std::env::set_var("TAPSYNC_ROOM", "room-7");
    std::env::set_var("TAPSYNC_API_BASE", "https://lab.example/api/");
    std::env::set_var("TAPSYNC_BIND", "0.0.0.0:9000");

    let mut config = AppConfig::default();
    config.apply_env_overrides().unwrap();
    assert_eq!(config.relay.room_id, "room-7");
    assert_eq!(config.relay.api_base, "https://lab.example/api");
    assert_eq!(config.server.bind, "0.0.0.0:9000");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_bind_override_rejected() {
    clear_env();
    std::env::set_var("TAPSYNC_BIND", "not an address");

    let mut config = AppConfig::default();
    let err = config.apply_env_overrides().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidOverride {
            key: "TAPSYNC_BIND",
            ..
        }
    ));

    clear_env();
}

#[test]
#[serial]
fn test_load_missing_file_uses_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("TAPSYNC_CONFIG", dir.path().join("absent.json"));

    let config = AppConfig::load().unwrap();
    assert_eq!(config.task, TaskConfig::default());

    clear_env();
}
