use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown time zone identifier: {0}")]
    UnknownTimeZone(String),
    #[error("Invalid time of day '{0}', expected HH:MM or HH:MM:SS")]
    InvalidTimeOfDay(String),
    #[error("Invalid color '{0}'")]
    InvalidColor(String),
    #[error("Invalid line style '{0}'")]
    InvalidLineStyle(String),
    #[error("Invalid value for '{0}' option")]
    InvalidOptionValue(String),
    #[error("Failed to read config file: {0}")]
    Io(String),
    #[error("Failed to parse config file: {0}")]
    Parse(String),
}
