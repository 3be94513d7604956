//! CLI error type and exit codes.
//!
//! User-fixable problems exit with 1, everything else with 101.

use std::fmt;
use tagrw_host::{CacheError, ConfigError, DriverError};

use crate::script::ScriptError;

#[derive(Debug)]
pub enum CliError {
    /// Something the user can fix (exit code 1).
    User(UserError),

    /// Environment failure or bug (exit code 101).
    System(SystemError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::User(_) => 1,
            CliError::System(_) => 101,
        }
    }

    pub fn user(message: impl Into<String>) -> Self {
        CliError::User(UserError::Generic(message.into()))
    }

    pub fn system(message: impl Into<String>) -> Self {
        CliError::System(SystemError::Internal(message.into()))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::User(e) => e.fmt(f),
            CliError::System(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for CliError {}

#[derive(Debug)]
pub enum UserError {
    Generic(String),

    InvalidArgument { arg: String, reason: String },

    /// A bad line in a simulate script.
    Script(ScriptError),

    Config(ConfigError),
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserError::Generic(msg) => write!(f, "Error: {}", msg),
            UserError::InvalidArgument { arg, reason } => {
                write!(f, "Error: Invalid argument '{}'\n\n{}", arg, reason)
            }
            UserError::Script(e) => write!(f, "Error: {}", e),
            UserError::Config(e) => {
                write!(f, "Error: {}\n\nHint: fix or remove the config file", e)
            }
        }
    }
}

#[derive(Debug)]
pub enum SystemError {
    Internal(String),

    Io(std::io::Error),

    Json(serde_json::Error),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::Internal(msg) => {
                write!(f, "Internal Error: {}\n\nThis is likely a bug.", msg)
            }
            SystemError::Io(e) => write!(f, "Internal Error: I/O operation failed: {}", e),
            SystemError::Json(e) => write!(f, "Internal Error: JSON output failed: {}", e),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::System(SystemError::Io(e))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::System(SystemError::Json(e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::User(UserError::Config(e))
    }
}

impl From<ScriptError> for CliError {
    fn from(e: ScriptError) -> Self {
        CliError::User(UserError::Script(e))
    }
}

impl From<DriverError> for CliError {
    fn from(e: DriverError) -> Self {
        CliError::system(e.to_string())
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::system(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CliError {
    fn from(e: tokio::task::JoinError) -> Self {
        CliError::system(format!("Session task failed: {}", e))
    }
}
