//! Error types for the mTLS probe.
//!
//! Startup failures (certificate inspection, identity loading, invalid
//! settings) abort before the first poll. A failed poll is reported through
//! [`ProbeError::Request`] and ends the polling loop.

use std::fmt;
use std::io;
use std::path::Path;

/// Error type for every fallible operation of the probe.
#[derive(Debug)]
pub enum ProbeError {
    /// The server certificate could not be read or its `notAfter` field parsed
    CertificateParse {
        /// File that was inspected
        path: String,
        /// Description of what went wrong
        reason: String,
    },

    /// One of the client certificate, client key or root CA files is unusable
    Identity {
        /// File that failed to load
        path: String,
        /// Description of what went wrong
        reason: String,
    },

    /// Invalid input provided through the configuration or the command line
    InvalidInput {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },

    /// The HTTPS GET of a poll cycle failed
    Request {
        /// Target URL of the request
        url: String,
        /// The flattened error chain reported by the HTTP stack
        details: String,
    },

    /// OpenSSL error occurred
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },

    /// Generic I/O error
    IoError {
        /// The underlying I/O error
        source: io::Error,
    },

    /// A generic error with a custom message
    Other {
        /// Error message
        message: String,
    },
}

impl ProbeError {
    pub(crate) fn certificate_parse(path: &Path, reason: impl ToString) -> Self {
        Self::CertificateParse {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn identity(path: &Path, reason: impl ToString) -> Self {
        Self::Identity {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Builds a [`ProbeError::Request`] from any error, walking its source chain.
    ///
    /// `reqwest` keeps the interesting part (connection refused, handshake
    /// alert, verify failure) in nested sources, so they are joined into
    /// one line.
    pub fn request(url: &str, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut details = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !details.contains(&text) {
                details.push_str(": ");
                details.push_str(&text);
            }
            source = cause.source();
        }
        Self::Request {
            url: url.to_string(),
            details,
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CertificateParse { path, reason } => {
                write!(f, "Failed to parse certificate {}: {}", path, reason)
            }
            Self::Identity { path, reason } => {
                write!(f, "Failed to load TLS identity file {}: {}", path, reason)
            }
            Self::InvalidInput { field, reason } => {
                write!(f, "Invalid input for '{}': {}", field, reason)
            }
            Self::Request { url, details } => {
                write!(f, "Request to {} failed: {}", url, details)
            }
            Self::OpenSSLError { details } => {
                write!(f, "OpenSSL error: {}", details)
            }
            Self::IoError { source } => {
                write!(f, "I/O error: {}", source)
            }
            Self::Other { message } => {
                write!(f, "{}", message)
            }
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError { source } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(e: io::Error) -> Self {
        Self::IoError { source: e }
    }
}

impl From<&str> for ProbeError {
    fn from(s: &str) -> Self {
        Self::Other {
            message: s.to_string(),
        }
    }
}

impl From<String> for ProbeError {
    fn from(s: String) -> Self {
        Self::Other { message: s }
    }
}

impl From<openssl::error::ErrorStack> for ProbeError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}
