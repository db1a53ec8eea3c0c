//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIO";

/// Config file name
const CONFIG_FILE_NAME: &str = "serio.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIO_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIO_CONFIG` environment variable (explicit path)
    /// 2. `./serio.toml` (current directory)
    /// 3. `serio.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override any file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;

        debug!(path = ?config_path, "configuration loaded");
        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides still apply; malformed ones are ignored.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        if let Err(e) = apply_env_overrides(&mut config) {
            debug!(error = %e, "ignoring invalid environment override");
        }

        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to its file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or(ConfigError::NoPath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            self.config = load_from_file(path)?;
            apply_env_overrides(&mut self.config)?;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the platform config directory for serio.
pub fn get_default_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "serio").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(ConfigError::io("read", path))?;

    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(ConfigError::io("create directory for", path))?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(ConfigError::io("write", path))
}

/// Check values serde cannot rule out on its own.
pub fn validate(config: &Config) -> ConfigResult<()> {
    config
        .serial
        .port_configuration()
        .validate()
        .map_err(|e| ConfigError::invalid("serial", e.to_string()))?;

    let transport = &config.transport;
    if transport.low_water_mark > transport.high_water_mark {
        return Err(ConfigError::invalid(
            "transport.low_water_mark",
            format!(
                "must not exceed high_water_mark ({})",
                transport.high_water_mark
            ),
        ));
    }
    if transport.read_chunk_size == 0 {
        return Err(ConfigError::invalid(
            "transport.read_chunk_size",
            "must be greater than zero",
        ));
    }
    if config.stream.limit == 0 {
        return Err(ConfigError::invalid(
            "stream.limit",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn env_var(key: &str) -> Option<(String, String)> {
    let var = format!("{ENV_PREFIX}_{key}");
    std::env::var(&var).ok().map(|value| (var, value))
}

fn parse_env<T: FromStr>(var: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(var, format!("Invalid {what}: '{value}'")))
}

fn parse_bool(var: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env(
            var,
            format!("Invalid boolean: '{value}'"),
        )),
    }
}

/// Parse a lowercase enum name the same way the file does.
fn parse_enum<T: serde::de::DeserializeOwned>(var: &str, value: &str) -> ConfigResult<T> {
    let name = value.trim().to_lowercase();
    T::deserialize(toml::Value::String(name))
        .map_err(|e| ConfigError::env(var, e.to_string()))
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `SERIO_<SECTION>_<KEY>`, for example:
/// - `SERIO_SERIAL_PORT=/dev/ttyUSB0`
/// - `SERIO_SERIAL_BAUD_RATE=115200`
/// - `SERIO_TRANSPORT_READINESS=polling`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let serial = &mut config.serial;
    if let Some((_, val)) = env_var("SERIAL_PORT") {
        serial.port = Some(val);
    }
    if let Some((_, val)) = env_var("SERIAL_URL") {
        serial.url = Some(val);
    }
    if let Some((var, val)) = env_var("SERIAL_BAUD_RATE") {
        serial.baud_rate = parse_env(&var, &val, "baud rate")?;
    }
    if let Some((var, val)) = env_var("SERIAL_DATA_BITS") {
        serial.data_bits = parse_enum(&var, &val)?;
    }
    if let Some((var, val)) = env_var("SERIAL_PARITY") {
        serial.parity = parse_enum(&var, &val)?;
    }
    if let Some((var, val)) = env_var("SERIAL_STOP_BITS") {
        serial.stop_bits = parse_enum(&var, &val)?;
    }
    if let Some((var, val)) = env_var("SERIAL_XONXOFF") {
        serial.xonxoff = parse_bool(&var, &val)?;
    }
    if let Some((var, val)) = env_var("SERIAL_RTSCTS") {
        serial.rtscts = parse_bool(&var, &val)?;
    }
    if let Some((var, val)) = env_var("SERIAL_DSRDTR") {
        serial.dsrdtr = parse_bool(&var, &val)?;
    }
    if let Some((var, val)) = env_var("SERIAL_TIMEOUT_MS") {
        serial.timeout_ms = Some(parse_env(&var, &val, "timeout")?);
    }
    if let Some((var, val)) = env_var("SERIAL_WRITE_TIMEOUT_MS") {
        serial.write_timeout_ms = Some(parse_env(&var, &val, "timeout")?);
    }
    if let Some((var, val)) = env_var("SERIAL_EXCLUSIVE") {
        serial.exclusive = Some(parse_bool(&var, &val)?);
    }

    let transport = &mut config.transport;
    if let Some((var, val)) = env_var("TRANSPORT_HIGH_WATER_MARK") {
        transport.high_water_mark = parse_env(&var, &val, "byte count")?;
    }
    if let Some((var, val)) = env_var("TRANSPORT_LOW_WATER_MARK") {
        transport.low_water_mark = parse_env(&var, &val, "byte count")?;
    }
    if let Some((var, val)) = env_var("TRANSPORT_READ_CHUNK_SIZE") {
        transport.read_chunk_size = parse_env(&var, &val, "byte count")?;
    }
    if let Some((var, val)) = env_var("TRANSPORT_POLL_INTERVAL_MS") {
        transport.poll_interval_ms = parse_env(&var, &val, "interval")?;
    }
    if let Some((var, val)) = env_var("TRANSPORT_READINESS") {
        transport.readiness = parse_enum(&var, &val)?;
    }

    if let Some((var, val)) = env_var("STREAM_LIMIT") {
        config.stream.limit = parse_env(&var, &val, "byte count")?;
    }

    let logging = &mut config.logging;
    if let Some((_, val)) = env_var("LOGGING_LEVEL") {
        logging.level = val;
    }
    if let Some((var, val)) = env_var("LOGGING_FORMAT") {
        logging.format = parse_enum(&var, &val)?;
    }
    if let Some((_, val)) = env_var("LOGGING_FILE") {
        logging.file = Some(PathBuf::from(val));
    }

    Ok(())
}
