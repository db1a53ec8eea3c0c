//! Integration tests for configuration loading.
//!
//! Tests that touch process environment variables are marked `#[serial]`
//! so they never observe each other's overrides.

use pretty_assertions::assert_eq;
use serial_test::serial;
use serio::config::{Config, ConfigError, ConfigLoader, LogFormat};
use serio::port::{Parity, StopBits};
use serio::transport::ReadinessMode;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const SAMPLE: &str = r#"
[serial]
port = "/dev/ttyUSB0"
baud_rate = 115200
parity = "odd"
stop_bits = "two"
rtscts = true
timeout_ms = 500

[transport]
high_water_mark = 4096
low_water_mark = 1024
readiness = "descriptor"

[stream]
limit = 2048

[logging]
level = "serio=trace"
format = "compact"
"#;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("serio.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
#[serial]
fn test_load_from_file() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, SAMPLE);

    // Act
    let loader = ConfigLoader::load_from(&path).unwrap();
    let options = loader.config().connection_options();

    // Assert
    assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(options.port.as_deref(), Some("/dev/ttyUSB0"));
    assert_eq!(options.serial.baud_rate, 115200);
    assert_eq!(options.serial.parity, Parity::Odd);
    assert_eq!(options.serial.stop_bits, StopBits::Two);
    assert!(options.serial.rtscts);
    assert_eq!(options.serial.timeout, Some(Duration::from_millis(500)));
    assert_eq!(options.transport.high_water_mark, 4096);
    assert_eq!(options.transport.readiness, ReadinessMode::Descriptor);
    assert_eq!(options.limit, 2048);
    assert_eq!(loader.config().logging.format, LogFormat::Compact);
}

#[test]
#[serial]
fn test_config_env_var_selects_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[serial]\nurl = \"loop://\"\n");
    env::set_var("SERIO_CONFIG", &path);

    let loader = ConfigLoader::load();
    env::remove_var("SERIO_CONFIG");

    let loader = loader.unwrap();
    assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(loader.config().serial.url.as_deref(), Some("loop://"));
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, SAMPLE);
    env::set_var("SERIO_SERIAL_BAUD_RATE", "9600");
    env::set_var("SERIO_TRANSPORT_READINESS", "POLLING");
    env::set_var("SERIO_STREAM_LIMIT", "128");

    let loader = ConfigLoader::load_from(&path);
    env::remove_var("SERIO_SERIAL_BAUD_RATE");
    env::remove_var("SERIO_TRANSPORT_READINESS");
    env::remove_var("SERIO_STREAM_LIMIT");

    let config = loader.unwrap().into_config();
    assert_eq!(config.serial.baud_rate, 9600);
    assert_eq!(config.transport.readiness, ReadinessMode::Polling);
    assert_eq!(config.stream.limit, 128);
    // Untouched values still come from the file
    assert_eq!(config.serial.parity, Parity::Odd);
}

#[test]
#[serial]
fn test_invalid_env_value_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");
    env::set_var("SERIO_SERIAL_BAUD_RATE", "fast");

    let result = ConfigLoader::load_from(&path);
    env::remove_var("SERIO_SERIAL_BAUD_RATE");

    match result {
        Err(ConfigError::Env { var, .. }) => assert_eq!(var, "SERIO_SERIAL_BAUD_RATE"),
        other => panic!("expected an environment error, got {other:?}"),
    }
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let result = ConfigLoader::load_from(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[serial]\nbaud_rate = \"fast\"\n");
    assert!(matches!(
        ConfigLoader::load_from(&path),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_conflicting_flow_control_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[serial]\nxonxoff = true\nrtscts = true\n");
    assert!(matches!(
        ConfigLoader::load_from(&path),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
#[serial]
fn test_save_and_reload() {
    // Arrange
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, SAMPLE);
    let mut loader = ConfigLoader::load_from(&path).unwrap();

    // Act
    loader.config_mut().serial.baud_rate = 57600;
    loader.save().unwrap();
    loader.config_mut().serial.baud_rate = 1;
    loader.reload().unwrap();

    // Assert
    assert_eq!(loader.config().serial.baud_rate, 57600);
    assert_eq!(loader.config().transport.high_water_mark, 4096);
}

#[test]
fn test_save_to_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("serio.toml");
    let loader = ConfigLoader::with_defaults();

    loader.save_to(&path).unwrap();

    let saved: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved, *loader.config());
}

#[test]
fn test_save_without_path_fails() {
    let loader = ConfigLoader {
        config_path: None,
        config: Config::default(),
    };
    assert!(matches!(
        loader.save(),
        Err(ConfigError::NoPath)
    ));
}
