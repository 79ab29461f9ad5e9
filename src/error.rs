//! Error handling for Audition
//!
//! Every failure is caught where it happens, turned into a readable
//! message for the error banner, and returned to the caller as a typed error.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::{EngineError, NodeKind};

/// Result type alias for Audition operations
pub type Result<T> = std::result::Result<T, AuditionError>;

/// Main error type for Audition operations
#[derive(Error, Debug)]
pub enum AuditionError {
    // Chain Construction Errors
    #[error("Failed to load audio source '{source_url}': {source}")]
    Load {
        source_url: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to initialize {node} node: {source}")]
    Init {
        node: NodeKind,
        #[source]
        source: EngineError,
    },

    // Transport Errors
    #[error("Audio engine refused to start: {source}")]
    EngineUnlock {
        #[source]
        source: EngineError,
    },

    #[error("Playback error: {source}")]
    Playback {
        #[source]
        source: EngineError,
    },

    #[error("Session is not ready")]
    NotReady,

    // Parameter Errors
    #[error("Failed to regenerate reverb with {decay_secs}s decay: {source}")]
    Regeneration {
        decay_secs: f32,
        #[source]
        source: EngineError,
    },

    #[error("Invalid parameter '{param}': {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    #[error("Failed to apply '{param}' to the effect chain: {source}")]
    ParameterApply {
        param: String,
        #[source]
        source: EngineError,
    },

    #[error("Operation superseded by a newer request or teardown")]
    Cancelled,

    // Configuration Errors
    #[error("Invalid configuration in {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuditionError {
    /// Build an `InvalidParameter` error for a value outside its range
    pub fn out_of_range(param: &str, value: impl ToString, expected: impl ToString) -> Self {
        AuditionError::InvalidParameter {
            param: param.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AuditionError::Load { .. } => "LOAD_ERROR",
            AuditionError::Init { .. } => "INIT_ERROR",
            AuditionError::EngineUnlock { .. } => "ENGINE_UNLOCK_ERROR",
            AuditionError::Playback { .. } => "PLAYBACK_ERROR",
            AuditionError::NotReady => "NOT_READY",
            AuditionError::Regeneration { .. } => "REGENERATION_ERROR",
            AuditionError::InvalidParameter { .. } => "INVALID_PARAMETER",
            AuditionError::ParameterApply { .. } => "PARAMETER_APPLY_ERROR",
            AuditionError::Cancelled => "CANCELLED",
            AuditionError::Config { .. } => "CONFIG_ERROR",
            AuditionError::Io(_) => "IO_ERROR",
            AuditionError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the user can retry after this error without reloading
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            AuditionError::Config { .. } | AuditionError::Io(_) | AuditionError::Serialization(_)
        )
    }

    /// Whether this error belongs in the error banner
    ///
    /// Cancellation is the normal outcome of a superseded request.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, AuditionError::Cancelled)
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            AuditionError::Load { source, .. } => {
                format!("Audio loading error: {}", source)
            }
            AuditionError::Init { source, .. } => {
                format!("Initialization error: {}", source)
            }
            AuditionError::EngineUnlock { .. } => {
                "Audio is blocked until you interact with the page. Press play again.".to_string()
            }
            AuditionError::Playback { source } => {
                format!("Audio playback error: {}", source)
            }
            AuditionError::NotReady => "The audio is still loading. Try again in a moment.".to_string(),
            AuditionError::Regeneration { source, .. } => {
                format!("Reverb update error: {}", source)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AuditionError::Load {
            source_url: "demo.mp3".to_string(),
            source: EngineError::new("404"),
        };
        assert_eq!(err.error_code(), "LOAD_ERROR");
        assert_eq!(AuditionError::NotReady.error_code(), "NOT_READY");
    }

    #[test]
    fn test_friendly_message_includes_engine_reason() {
        let err = AuditionError::Regeneration {
            decay_secs: 2.0,
            source: EngineError::new("impulse render failed"),
        };
        assert!(err.friendly_message().contains("impulse render failed"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_cancelled_is_not_reportable() {
        assert!(!AuditionError::Cancelled.is_reportable());
        assert!(AuditionError::NotReady.is_reportable());
    }

    #[test]
    fn test_out_of_range_message() {
        let err = AuditionError::out_of_range("pitch_semitones", 13, "-12 to 12");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'pitch_semitones': 13 (expected -12 to 12)"
        );
    }
}
