use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// Result type for jmmc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the jmmc compiler
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The unit had syntax or semantic errors; code generation was skipped.
    #[error("{file}: compilation failed with {} error(s)", .diagnostics.len())]
    Compilation {
        file: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal compiler error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an internal compiler error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Diagnostics carried by a failed compilation, empty for other errors
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Error::Compilation { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}
