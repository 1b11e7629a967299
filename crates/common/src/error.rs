//! Unified error type for the peak planner.
//!
//! Every variant owns plain data so the type is `Clone`: a single failed
//! request is handed to every caller that was waiting on it.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Peak API error (status={status}): {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("JSON parse error: {0}")]
    Json(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status attached to the failure, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for failures that happened before anything left the process.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_api_errors() {
        let api = Error::Api {
            status: 404,
            message: "gone".into(),
        };
        assert_eq!(api.status(), Some(404));
        assert_eq!(Error::Http("refused".into()).status(), None);
    }

    #[test]
    fn test_json_error_converts_to_message() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
