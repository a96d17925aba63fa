//! Error handling for lookup, submission and polling operations.
//!
//! This module defines a single error type that covers the ways the pipeline
//! can fail, from authority outages to unusable input or configuration.

use crate::types::Authority;
use std::fmt;

/// Main error type for blacklist operations.
#[derive(Debug, Clone)]
pub enum BlacklistError {
    /// URL that cannot be looked up (empty, embedded whitespace)
    InvalidUrl { url: String, reason: String },

    /// Unusable input batch (no URLs at all)
    InvalidInput { message: String },

    /// The authority answered with a non-success status
    LookupError {
        authority: Authority,
        status: u16,
        body: String,
    },

    /// Transport-level failures (connection refused, timeout, etc.)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// Response bodies that could not be decoded
    ParseError {
        message: String,
        content: Option<String>,
    },

    /// A remediation step could not be completed
    SubmissionError { url: String, message: String },

    /// Configuration errors (invalid settings, missing endpoints)
    ConfigError { message: String },

    /// File I/O errors when reading URL lists or config files
    FileError { path: String, message: String },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl BlacklistError {
    /// Create a new invalid URL error.
    pub fn invalid_url<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid input error.
    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a lookup error for a non-success response.
    pub fn lookup<B: Into<String>>(authority: Authority, status: u16, body: B) -> Self {
        Self::LookupError {
            authority,
            status,
            body: body.into(),
        }
    }

    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new submission error.
    pub fn submission<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::SubmissionError {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error means "the authority gave no information".
    ///
    /// Callers treat these as a miss during the first lookup and as
    /// "not yet confirmed" while polling.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            Self::LookupError { .. } | Self::NetworkError { .. } | Self::ParseError { .. }
        )
    }

    /// Whether the user has to fix their invocation (exit code 2 in the CLI).
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::InvalidUrl { .. })
    }
}

impl fmt::Display for BlacklistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url, reason } => {
                write!(f, "Invalid URL '{}': {}", url, reason)
            }
            Self::InvalidInput { message } => write!(f, "Invalid input: {}", message),
            Self::LookupError {
                authority,
                status,
                body,
            } => write!(
                f,
                "Lookup against {} authority failed (HTTP {}): {}",
                authority, status, body
            ),
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::ParseError { message, content: _ } => write!(f, "Parse error: {}", message),
            Self::SubmissionError { url, message } => {
                write!(f, "Submission for '{}' failed: {}", url, message)
            }
            Self::ConfigError { message } => write!(f, "Configuration error: {}", message),
            Self::FileError { path, message } => write!(f, "File error at '{}': {}", path, message),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for BlacklistError {}

impl From<reqwest::Error> for BlacklistError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network_with_source("Request timed out", err.to_string())
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else if err.is_decode() {
            Self::ParseError {
                message: format!("Failed to decode response: {}", err),
                content: None,
            }
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}

impl From<serde_json::Error> for BlacklistError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: format!("JSON parsing failed: {}", err),
            content: None,
        }
    }
}

impl From<toml::de::Error> for BlacklistError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("Failed to parse TOML configuration: {}", err))
    }
}

impl From<std::io::Error> for BlacklistError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}
