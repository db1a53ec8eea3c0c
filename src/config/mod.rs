//! Settings for serio connections and the `serio-cat` tool.
//!
//! Settings live in a TOML file with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! 1. `SERIO_CONFIG` environment variable (explicit path)
//! 2. `./serio.toml` (current directory)
//! 3. `serio.toml` in the platform config directory
//!    (`~/.config/serio` on Linux, `%APPDATA%\serio\config` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `SERIO_<SECTION>_<KEY>`:
//! - `SERIO_SERIAL_PORT=/dev/ttyUSB0`
//! - `SERIO_SERIAL_BAUD_RATE=115200`
//! - `SERIO_TRANSPORT_READINESS=polling`
//!
//! # Example
//!
//! ```rust,no_run
//! use serio::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let options = loader.config().connection_options();
//! println!("baud rate: {}", options.serial.baud_rate);
//! # Ok::<(), serio::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, validate, ConfigLoader,
};
pub use schema::{
    Config, LogFormat, LoggingConfig, SerialConfig, StreamConfig, TransportConfig,
};
