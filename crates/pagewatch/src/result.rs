//! Result and error types for pagewatch.

use thiserror::Error;

/// Result type for pagewatch operations
pub type WatchResult<T> = Result<T, WatchError>;

/// Result type for host (DOM) operations
pub type DomResult<T> = Result<T, WatchError>;

/// Errors that can occur in pagewatch
#[derive(Debug, Error)]
pub enum WatchError {
    /// The host document rejected an operation
    #[error("DOM operation failed: {message}")]
    Dom {
        /// Error message
        message: String,
    },

    /// Logging could not be installed
    #[error("Logging setup failed: {message}")]
    Logging {
        /// Error message
        message: String,
    },

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// A shortcut string could not be parsed
    #[error("Shortcut error: {0}")]
    Shortcut(#[from] ShortcutError),
}

impl WatchError {
    /// Create a DOM error
    #[must_use]
    pub fn dom(message: impl Into<String>) -> Self {
        Self::Dom {
            message: message.into(),
        }
    }

    /// Create a logging error
    #[must_use]
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}

/// Errors raised while parsing key combinations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortcutError {
    /// A modifier token is not one of alt, ctrl, shift, meta (or an alias)
    #[error("unknown modifier `{token}` in shortcut `{combo}`")]
    UnknownModifier {
        /// Offending token
        token: String,
        /// Full combination string
        combo: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_error_display() {
        let err = WatchError::dom("no body");
        assert_eq!(err.to_string(), "DOM operation failed: no body");
    }

    #[test]
    fn test_logging_error_display() {
        let err = WatchError::logging("already set");
        assert!(err.to_string().contains("already set"));
    }

    #[test]
    fn test_config_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: WatchError = json_err.into();
        assert!(matches!(err, WatchError::Config(_)));
    }

    #[test]
    fn test_shortcut_error_from() {
        let err: WatchError = ShortcutError::UnknownModifier {
            token: "hyper".to_string(),
            combo: "hyper k".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Shortcut error: unknown modifier `hyper` in shortcut `hyper k`"
        );
    }
}
