//! Error types and handling infrastructure for floatterm.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! custom error types. The binary layers `anyhow` on top for startup context.
//!
//! ## Design Principles
//!
//! - **Session isolation**: per-connection errors are reported to that connection only
//! - **User-friendly messages**: the `Display` text is what a remote viewer reads
//! - **Consistency**: Standardized Result type across all modules

use thiserror::Error;

/// The main error type for floatterm operations.
#[derive(Error, Debug)]
pub enum FloatError {
    /// The connection never negotiated a pseudo-terminal (no window size).
    #[error("connection has not negotiated a pseudo-terminal")]
    TransportNotReady,

    /// `start` was called on a terminal adapter that is already running
    #[error("terminal session has already been started")]
    AlreadyStarted,

    /// `stop` was called on a terminal adapter that is not running
    #[error("terminal session hasn't been started")]
    NotStarted,

    /// The rendering backend could not be brought up for one connection
    #[error("Failed to initialize terminal: {message}")]
    RenderInitFailure { message: String },

    /// A gradient definition in the static configuration is malformed
    #[error("Invalid gradient '{name}': {message}")]
    InvalidGradientSpec { name: String, message: String },

    /// The SSH exchange never got as far as an open shell
    #[error("SSH handshake failed: {message}")]
    Handshake { message: String },

    /// Server configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Socket and terminal write failures
    #[error("I/O operation failed: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Standard Result type for floatterm operations.
pub type Result<T> = std::result::Result<T, FloatError>;

impl FloatError {
    /// Create a RenderInitFailure with a descriptive message
    pub fn render_init(message: impl Into<String>) -> Self {
        Self::RenderInitFailure {
            message: message.into(),
        }
    }

    /// Create an InvalidGradientSpec for the named gradient
    pub fn invalid_gradient(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidGradientSpec {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a Handshake error with a descriptive message
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Create a ConfigError with a descriptive message
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create an Io error from an io::Error with additional context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }
}

impl From<std::io::Error> for FloatError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => Self::Io {
                message: "Connection closed".to_string(),
                source: err,
            },
            _ => Self::Io {
                message: "I/O operation failed".to_string(),
                source: err,
            },
        }
    }
}
