//! Error types for the synthapi library.
//!
//! Each concern carries its own error enum; [`SynthError`] aggregates them
//! for callers that drive a whole command.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while talking to the extraction service.
///
/// The documentation parser recovers from all of these by returning an
/// empty parameter list. They are only visible through
/// [`DocParser::try_parse`](crate::DocParser::try_parse).
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The HTTP request to the service failed.
    #[error("extraction request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("extraction service returned {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The request did not complete within the configured timeout.
    #[error("extraction service timed out after {0:?}")]
    Timeout(Duration),

    /// The service reply carried no message content.
    #[error("extraction service returned an empty reply")]
    EmptyReply,

    /// The reply content was not the JSON shape we asked for.
    #[error("malformed extraction reply: {0}")]
    MalformedReply(#[from] serde_json::Error),

    /// Any other failure reported by a service implementation.
    #[error("{0}")]
    Service(String),
}

/// A caller-supplied parameter set that does not satisfy its schema.
///
/// The `Display` output is the human-readable message shown to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required parameter: {name}")]
    MissingRequired { name: String },

    #[error("Unknown parameter: {name}")]
    Unknown { name: String },

    #[error("Invalid {expected} value for {name}: {value}")]
    InvalidType {
        name: String,
        expected: String,
        value: String,
    },

    #[error("{name} must be >= {min}")]
    BelowMinimum { name: String, min: f64 },

    #[error("{name} must be <= {max}")]
    AboveMaximum { name: String, max: f64 },

    #[error("Invalid value for {name}. Must be one of: {}", .allowed.join(", "))]
    NotInEnum { name: String, allowed: Vec<String> },
}

impl ValidationError {
    /// The name of the parameter that failed validation.
    pub fn parameter(&self) -> &str {
        match self {
            Self::MissingRequired { name }
            | Self::Unknown { name }
            | Self::InvalidType { name, .. }
            | Self::BelowMinimum { name, .. }
            | Self::AboveMaximum { name, .. }
            | Self::NotInEnum { name, .. } => name,
        }
    }
}

/// Errors that can occur when working with the API registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to read or write the registry file.
    #[error("registry I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the registry.
    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Failed to acquire a file lock.
    #[error("failed to acquire registry lock")]
    Lock,

    /// API names must be non-empty and contain no whitespace.
    #[error("invalid API name '{0}': names must be non-empty and contain no whitespace")]
    InvalidName(String),
}

/// Errors from outbound calls to the upload, init and mock endpoints.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection-level failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote side answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A URL could not be built from the configured base.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The request body could not be encoded.
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from the local documentation-capture server.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The listener could not be bound or served.
    #[error("capture server failed: {0}")]
    Io(#[from] std::io::Error),

    /// No specification was saved before the timeout elapsed.
    #[error("no specification was saved within {0:?}")]
    Timeout(Duration),

    /// The server shut down without delivering a specification.
    #[error("capture server closed before a specification was saved")]
    Closed,
}

/// Configuration problems detected while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    /// An environment variable holds an unusable value.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    /// No home directory could be found for the default data location.
    #[error("could not determine home directory; set SYNTHAPI_HOME")]
    NoHome,
}

/// Top-level error for synthapi operations.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Reading or writing a generated specification file failed.
    #[error("failed to access {path}: {source}")]
    Workspace {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A generated specification file is not valid JSON.
    #[error("invalid specification file {path}: {source}")]
    InvalidSpec {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The API name is not in the registry.
    #[error("API '{name}' is not registered. Available APIs: {}", list_or_none(.available))]
    UnknownApi { name: String, available: Vec<String> },

    /// The API has already been initialized.
    #[error("API '{name}' is already initialized. Available APIs: {}", list_or_none(.available))]
    AlreadyInitialized { name: String, available: Vec<String> },

    /// The API has not been initialized yet.
    #[error("API '{name}' has not been initialized. Run `synthapi init --api {name}` first")]
    NotInitialized { name: String },

    /// No generated specification file exists for the API.
    #[error("no specification found for API '{name}'. Run `synthapi generate --api {name}` first")]
    MissingSpec { name: String },

    /// The specification has no operation for the requested endpoint.
    #[error("no {method} method found for endpoint '{path}'")]
    UnknownEndpoint { method: String, path: String },
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}
