//! Centralized error handling for sysmend
//!
//! Probe-local and fix-local failures never surface as `SysmendError`; they
//! are folded into issues and fix results. This type covers the failures the
//! caller has to see: bad configuration, engine misuse and I/O around it.

use std::fmt;
use thiserror::Error;

/// Main error type for sysmend operations
#[derive(Debug, Clone, Error)]
pub enum SysmendError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        source: Option<Box<SysmendError>>,
    },

    #[error("Probe '{probe}' error: {message}")]
    Probe {
        probe: String,
        message: String,
        source: Option<Box<SysmendError>>,
    },

    #[error("Fixer '{fixer}' error: {message}")]
    Fixer {
        fixer: String,
        message: String,
        source: Option<Box<SysmendError>>,
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: Option<Box<SysmendError>>,
    },

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        source: Option<Box<SysmendError>>,
    },

    #[error("Invalid engine state: {message}")]
    State {
        message: String,
        source: Option<Box<SysmendError>>,
    },
}

/// Result type for sysmend operations
pub type SysmendResult<T> = Result<T, SysmendError>;

impl SysmendError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new configuration error with source
    pub fn config_with_source<S: Into<String>>(message: S, source: SysmendError) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new probe error
    pub fn probe<S1: Into<String>, S2: Into<String>>(probe: S1, message: S2) -> Self {
        Self::Probe {
            probe: probe.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn probe_with_source<S1: Into<String>, S2: Into<String>>(
        probe: S1,
        message: S2,
        source: SysmendError,
    ) -> Self {
        Self::Probe {
            probe: probe.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new fixer error
    pub fn fixer<S1: Into<String>, S2: Into<String>>(fixer: S1, message: S2) -> Self {
        Self::Fixer {
            fixer: fixer.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn fixer_with_source<S1: Into<String>, S2: Into<String>>(
        fixer: S1,
        message: S2,
        source: SysmendError,
    ) -> Self {
        Self::Fixer {
            fixer: fixer.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error for an operation attempted in the wrong engine state
    pub fn state<S: Into<String>>(message: S) -> Self {
        Self::State {
            message: message.into(),
            source: None,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            SysmendError::Config { .. } => ErrorCategory::Configuration,
            SysmendError::Probe { .. } => ErrorCategory::Probe,
            SysmendError::Fixer { .. } => ErrorCategory::Fixer,
            SysmendError::Io { .. } => ErrorCategory::IO,
            SysmendError::Parse { .. } => ErrorCategory::Parse,
            SysmendError::State { .. } => ErrorCategory::State,
        }
    }

    /// Message followed by every nested source, `: `-separated
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut current = std::error::Error::source(self);
        while let Some(source) = current {
            message.push_str(": ");
            message.push_str(&source.to_string());
            current = std::error::Error::source(source);
        }
        message
    }

    /// Fatal errors stop the engine before a scan begins
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SysmendError::Config { .. } | SysmendError::Parse { .. }
        )
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Probe,
    Fixer,
    IO,
    Parse,
    State,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "Configuration"),
            ErrorCategory::Probe => write!(f, "Probe"),
            ErrorCategory::Fixer => write!(f, "Fixer"),
            ErrorCategory::IO => write!(f, "I/O"),
            ErrorCategory::Parse => write!(f, "Parse"),
            ErrorCategory::State => write!(f, "State"),
        }
    }
}

impl From<std::io::Error> for SysmendError {
    fn from(err: std::io::Error) -> Self {
        SysmendError::io(format!("I/O operation failed: {}", err))
    }
}

impl From<serde_yaml::Error> for SysmendError {
    fn from(err: serde_yaml::Error) -> Self {
        SysmendError::parse(format!("YAML parsing failed: {}", err))
    }
}

impl From<serde_json::Error> for SysmendError {
    fn from(err: serde_json::Error) -> Self {
        SysmendError::parse(format!("JSON parsing failed: {}", err))
    }
}

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    fn with_probe_context<F>(self, probe: &str, f: F) -> SysmendResult<T>
    where
        F: FnOnce() -> String;

    fn with_fixer_context<F>(self, fixer: &str, f: F) -> SysmendResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Into<SysmendError>,
{
    fn with_probe_context<F>(self, probe: &str, f: F) -> SysmendResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SysmendError::probe_with_source(probe, f(), e.into()))
    }

    fn with_fixer_context<F>(self, fixer: &str, f: F) -> SysmendResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SysmendError::fixer_with_source(fixer, f(), e.into()))
    }
}

/// Log an error at a level matching how bad it is
pub fn log_error(err: &SysmendError) {
    if err.is_fatal() {
        tracing::error!(category = %err.category(), error = %err, "Fatal error occurred");
    } else {
        tracing::warn!(category = %err.category(), error = %err, "Error occurred");
    }
}
