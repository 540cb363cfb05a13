
use alloc::string::String;
use core::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidValue(String),
    OutOfRange(String),
    MissingValue(String),
}

impl ConfigError {
    pub fn invalid_value(msg: &str) -> Self {
        ConfigError::InvalidValue(String::from(msg))
    }

    pub fn out_of_range(msg: &str) -> Self {
        ConfigError::OutOfRange(String::from(msg))
    }

    pub fn missing_value(key: &str) -> Self {
        ConfigError::MissingValue(String::from(key))
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
            ConfigError::OutOfRange(msg) => write!(f, "out of range: {}", msg),
            ConfigError::MissingValue(key) => write!(f, "missing value: {}", key),
        }
    }
}
