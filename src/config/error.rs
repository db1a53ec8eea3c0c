//! Errors raised while loading, overriding or saving settings.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested settings file does not exist.
    #[error("Settings file not found: {0}")]
    NotFound(PathBuf),

    /// Reading, writing or creating a settings or log file failed.
    #[error("Cannot {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot encode settings: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A value parsed but makes no sense for a serial connection.
    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },

    /// A `SERIO_*` override could not be parsed.
    #[error("Bad value in environment variable '{var}': {message}")]
    Env { var: String, message: String },

    /// `save` was called on a loader that never had a file.
    #[error("No settings file to save to")]
    NoPath,
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            message: message.into(),
        }
    }

    /// Adapter for `map_err` on a file operation.
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_action_and_path() {
        let err = ConfigError::io("read", "/etc/serio.toml")(io::Error::from(
            io::ErrorKind::PermissionDenied,
        ));
        let text = err.to_string();
        assert!(text.starts_with("Cannot read '/etc/serio.toml'"), "{text}");
    }
}
