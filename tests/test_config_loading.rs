//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, overrides and
//! validation, not on the details of TOML parsing.

use radio_bridge::config::{BridgeConfig, ConfigError, ConfigOverrides};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[serial]
device = "/dev/ttyUSB0"

[mqtt]
host = "broker.local"
port = 1883
username = "bridge"
password = "secret"
topic_prefix = "lab/radio/client"

[pipeline]
queue_capacity = 64
drain_timeout_secs = 10
"#
    )
    .unwrap();

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.serial.device, PathBuf::from("/dev/ttyUSB0"));
    assert_eq!(config.mqtt.host, "broker.local");
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.username.as_deref(), Some("bridge"));
    assert_eq!(config.mqtt.password.as_deref(), Some("secret"));
    assert_eq!(config.mqtt.topic_prefix, "lab/radio/client");
    assert_eq!(config.pipeline.queue_capacity, 64);
    assert_eq!(config.pipeline.drain_timeout_secs, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn test_omitted_sections_use_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[mqtt]\nhost = \"broker.local\"").unwrap();

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.serial.device, PathBuf::from("/dev/tty99"));
    assert_eq!(config.mqtt.port, 8883);
    assert_eq!(config.mqtt.topic_prefix, "home/radio/client");
    assert_eq!(config.pipeline.queue_capacity, 32);
    assert_eq!(config.retry.publish.max_attempts, Some(5));
    assert_eq!(config.retry.serial.max_attempts, None);
}

#[test]
fn test_retry_policies_can_be_tuned() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[mqtt]
host = "broker.local"

[retry.publish]
initial_delay_ms = 100
max_delay_ms = 1000
max_attempts = 3

[retry.serial]
initial_delay_ms = 500
max_delay_ms = 10000
max_attempts = 20
"#
    )
    .unwrap();

    let config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.retry.publish.initial_delay_ms, 100);
    assert_eq!(config.retry.publish.multiplier, 2);
    assert_eq!(config.retry.publish.max_attempts, Some(3));
    assert_eq!(config.retry.serial.max_attempts, Some(20));
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_a_read_error() {
    let result = BridgeConfig::load_from_file(std::path::Path::new("/nonexistent/bridge.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_invalid_toml_is_a_parse_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "[mqtt\nhost = ").unwrap();

    let result = BridgeConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_host_is_required_after_overrides() {
    let config = BridgeConfig::default();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MissingSetting(_))
    ));
}

#[test]
fn test_overrides_fill_in_and_replace_file_values() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        "[mqtt]\nhost = \"file-broker\"\nusername = \"file-user\"\n\n[pipeline]\nqueue_capacity = 8"
    )
    .unwrap();
    let mut config = BridgeConfig::load_from_file(temp_file.path()).unwrap();

    config.apply_overrides(ConfigOverrides {
        device: Some("/dev/ttyACM1".into()),
        mqtt_host: Some("flag-broker".to_string()),
        mqtt_port: Some(1884),
        mqtt_password: Some("pw".to_string()),
        ..Default::default()
    });

    assert_eq!(config.serial.device, PathBuf::from("/dev/ttyACM1"));
    assert_eq!(config.mqtt.host, "flag-broker");
    assert_eq!(config.mqtt.port, 1884);
    assert_eq!(config.mqtt.username.as_deref(), Some("file-user"));
    assert_eq!(config.mqtt.password.as_deref(), Some("pw"));
    assert_eq!(config.pipeline.queue_capacity, 8);
    assert!(config.validate().is_ok());
}

#[test]
fn test_ca_certificate_file_enables_tls() {
    let ca_file = NamedTempFile::new().unwrap();
    let mut config = BridgeConfig::default();
    config.apply_overrides(ConfigOverrides {
        mqtt_host: Some("broker.local".to_string()),
        mqtt_ca_certs: Some(ca_file.path().to_path_buf()),
        ..Default::default()
    });

    assert!(config.mqtt.uses_tls());
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut config = BridgeConfig::default();
    config.mqtt.host = "broker.local".to_string();

    let mut zero_capacity = config.clone();
    zero_capacity.pipeline.queue_capacity = 0;
    assert!(matches!(
        zero_capacity.validate(),
        Err(ConfigError::InvalidConfig(_))
    ));

    let mut zero_port = config.clone();
    zero_port.mqtt.port = 0;
    assert!(zero_port.validate().is_err());

    let mut missing_ca = config.clone();
    missing_ca.mqtt.ca_certs = Some("/nonexistent/ca.pem".into());
    assert!(missing_ca.validate().is_err());

    let mut empty_device = config;
    empty_device.serial.device = PathBuf::new();
    assert!(matches!(
        empty_device.validate(),
        Err(ConfigError::MissingSetting(_))
    ));
}

#[test]
fn test_config_serializes_back_to_toml() {
    let mut config = BridgeConfig::default();
    config.mqtt.host = "broker.local".to_string();

    let rendered = toml::to_string_pretty(&config).unwrap();
    let parsed: BridgeConfig = toml::from_str(&rendered).unwrap();

    assert_eq!(parsed, config);
}
