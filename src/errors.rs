//!
//! src/errors.rs  Andrew Belles  Oct 18th, 2026
//!
//! Defines enums and methods of error conversion
//! for errors the collector and presenter use
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("config error: {0}")]
    Config(String),
    #[error("auth error: {0}")]
    Auth(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("data format error: {0}")]
    DataFormat(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl EtlError {
    /// Auth and config failures abort a collector run, everything else is per item
    pub fn is_fatal(&self) -> bool {
        matches!(self, EtlError::Auth(_) | EtlError::Config(_))
    }
}

impl From<reqwest::Error> for EtlError {
    fn from(e: reqwest::Error) -> Self { EtlError::Fetch(e.to_string()) }
}

impl From<serde_json::Error> for EtlError {
    fn from(e: serde_json::Error) -> Self { EtlError::Parse(e.to_string()) }
}

impl From<toml::de::Error> for EtlError {
    fn from(e: toml::de::Error) -> Self { EtlError::Config(e.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_auth_and_config_are_fatal() {
        assert!(EtlError::Auth("rejected".into()).is_fatal());
        assert!(EtlError::Config("missing".into()).is_fatal());
        assert!(!EtlError::Fetch("page 3".into()).is_fatal());
        assert!(!EtlError::DataFormat("bad header".into()).is_fatal());
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: EtlError = io.into();
        assert!(matches!(e, EtlError::Io(_)));
        assert!(e.to_string().starts_with("io error"));
    }
}
