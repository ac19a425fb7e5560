//! Error types for Duet Core

use crate::types::SessionRole;
use thiserror::Error;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coordinator error types
#[derive(Error, Debug)]
pub enum Error {
    // Source resolution errors
    #[error("Unsupported content type for {locator} (hint: {hint:?})")]
    UnsupportedContentType { locator: String, hint: Option<String> },

    #[error("Secure surface unavailable on this platform")]
    SecureSurfaceUnavailable,

    // DRM errors
    #[error("DRM not supported: {scheme}")]
    DrmUnsupported { scheme: String },

    #[error("License acquisition failed: {0}")]
    LicenseAcquisitionFailed(String),

    // Playback errors
    #[error("{role} pipeline stalled: {detail}")]
    PipelineStall { role: SessionRole, detail: String },

    #[error("{role} pipeline retries exhausted after {attempts} attempts")]
    RetriesExhausted { role: SessionRole, attempts: u32 },

    #[error("Operation on released {role} session: {operation}")]
    ReleasedSessionAccess {
        role: SessionRole,
        operation: &'static str,
    },

    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a license acquisition error
    pub fn license(msg: impl Into<String>) -> Self {
        Error::LicenseAcquisitionFailed(msg.into())
    }

    /// Returns true if this error is absorbed by a local retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PipelineStall { .. } | Error::SecureSurfaceUnavailable | Error::Network(_)
        )
    }

    /// Returns true if this error aborts session creation
    pub fn is_creation_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedContentType { .. }
                | Error::DrmUnsupported { .. }
                | Error::LicenseAcquisitionFailed(_)
                | Error::PipelineCreation(_)
        )
    }

    /// Returns the error code for log correlation
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::UnsupportedContentType { .. } => "UNSUPPORTED_CONTENT_TYPE",
            Error::SecureSurfaceUnavailable => "SECURE_SURFACE_UNAVAILABLE",
            Error::DrmUnsupported { .. } => "DRM_UNSUPPORTED",
            Error::LicenseAcquisitionFailed(_) => "LICENSE_ACQUIRE",
            Error::PipelineStall { .. } => "PIPELINE_STALL",
            Error::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            Error::ReleasedSessionAccess { .. } => "RELEASED_SESSION",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::PipelineCreation(_) => "PIPELINE_CREATE",
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}
