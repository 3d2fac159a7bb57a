//! Error types for the privacy diagnostic engine
//!
//! The taxonomy follows the failure classes every probe can hit:
//! - Unsupported browser API (a finding, but sometimes also an error source)
//! - Timeout on a bounded wait (ICE gathering, fetch)
//! - Transport failure against the backend analysis service
//! - Malformed backend response (treated like a transport failure)
//!
//! Probe internals catch and convert everything into these variants; a
//! rejected promise never escapes to the orchestration layer uncaught.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasm_bindgen::JsValue;

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Capability errors (1xx)
    FeatureUnsupported = 100,
    NoWindow = 101,
    NoDocument = 102,

    // Timeout errors (2xx)
    GatheringTimeout = 200,
    FetchTimeout = 201,

    // Transport errors (3xx)
    FetchFailed = 300,
    HttpStatus = 301,
    EnvelopeRejected = 302,

    // Decoding errors (4xx)
    MalformedResponse = 400,

    // Probe-internal errors (5xx)
    CanvasError = 500,
    WebGlError = 501,
    AudioError = 502,
    WebRtcError = 503,

    // Internal errors (9xx)
    InternalError = 900,
    Cancelled = 901,
}

/// Main error type for the diagnostic engine
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    // ===== Capability Errors =====
    #[error("Browser feature unavailable: {0}")]
    Unsupported(String),

    #[error("No window object in this context")]
    NoWindow,

    #[error("No document object in this context")]
    NoDocument,

    // ===== Timeout Errors =====
    #[error("ICE gathering timed out after {0} ms")]
    GatheringTimeout(u32),

    #[error("Request to analysis service timed out after {0} ms")]
    FetchTimeout(u32),

    // ===== Transport Errors =====
    #[error("Request to analysis service failed: {0}")]
    FetchFailed(String),

    #[error("Analysis service returned HTTP {status} for {endpoint}")]
    HttpStatus { status: u16, endpoint: String },

    #[error("Analysis service rejected the request: {0}")]
    EnvelopeRejected(String),

    // ===== Decoding Errors =====
    #[error("Malformed response from analysis service: {0}")]
    MalformedResponse(String),

    // ===== Probe-Internal Errors =====
    #[error("Canvas probe failed: {0}")]
    Canvas(String),

    #[error("WebGL probe failed: {0}")]
    WebGl(String),

    #[error("Audio probe failed: {0}")]
    Audio(String),

    #[error("WebRTC probe failed: {0}")]
    WebRtc(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Scan was cancelled")]
    Cancelled,
}

impl ProbeError {
    /// Get the error code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            ProbeError::Unsupported(_) => ErrorCode::FeatureUnsupported,
            ProbeError::NoWindow => ErrorCode::NoWindow,
            ProbeError::NoDocument => ErrorCode::NoDocument,

            ProbeError::GatheringTimeout(_) => ErrorCode::GatheringTimeout,
            ProbeError::FetchTimeout(_) => ErrorCode::FetchTimeout,

            ProbeError::FetchFailed(_) => ErrorCode::FetchFailed,
            ProbeError::HttpStatus { .. } => ErrorCode::HttpStatus,
            ProbeError::EnvelopeRejected(_) => ErrorCode::EnvelopeRejected,

            ProbeError::MalformedResponse(_) => ErrorCode::MalformedResponse,

            ProbeError::Canvas(_) => ErrorCode::CanvasError,
            ProbeError::WebGl(_) => ErrorCode::WebGlError,
            ProbeError::Audio(_) => ErrorCode::AudioError,
            ProbeError::WebRtc(_) => ErrorCode::WebRtcError,

            ProbeError::Internal(_) => ErrorCode::InternalError,
            ProbeError::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// Whether this error means a browser API is simply absent.
    ///
    /// Unsupported features are findings, not failures: the owning probe
    /// reports `supported: false` and the scorer grants the category full
    /// credit.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            ProbeError::Unsupported(_) | ProbeError::NoWindow | ProbeError::NoDocument
        )
    }

    /// Whether this error is a bounded wait that expired.
    ///
    /// Timeouts resolve to inconclusive results; the probe terminates
    /// normally instead of hanging.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProbeError::GatheringTimeout(_) | ProbeError::FetchTimeout(_)
        )
    }

    /// Whether this error came from the backend analysis service.
    ///
    /// Malformed responses are classified as transport failures: either way
    /// the collaborator's answer is unusable and the probe result is `None`.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProbeError::FetchFailed(_)
                | ProbeError::HttpStatus { .. }
                | ProbeError::EnvelopeRejected(_)
                | ProbeError::MalformedResponse(_)
                | ProbeError::FetchTimeout(_)
        )
    }

    /// Get a user-friendly message for display
    pub fn user_message(&self) -> String {
        match self {
            ProbeError::Unsupported(feature) => {
                format!("Your browser does not expose {}.", feature)
            }
            ProbeError::NoWindow | ProbeError::NoDocument => {
                "This scan must run inside a browser page.".into()
            }

            ProbeError::GatheringTimeout(_) => {
                "Network address discovery did not finish in time. \
                 Results for this check are inconclusive."
                    .into()
            }
            ProbeError::FetchTimeout(_) => {
                "The analysis service took too long to respond.".into()
            }

            ProbeError::FetchFailed(_) => {
                "Could not reach the analysis service. Please check your connection.".into()
            }
            ProbeError::HttpStatus { .. } => {
                "The analysis service returned an error. Please try again later.".into()
            }
            ProbeError::EnvelopeRejected(_) => {
                "The analysis service rejected this request.".into()
            }

            ProbeError::MalformedResponse(_) => {
                "Received an unreadable response from the analysis service.".into()
            }

            ProbeError::Canvas(_) => "The canvas rendering check failed.".into(),
            ProbeError::WebGl(_) => "The graphics stack check failed.".into(),
            ProbeError::Audio(_) => "The audio stack check failed.".into(),
            ProbeError::WebRtc(_) => "The WebRTC leak check failed.".into(),

            ProbeError::Internal(_) => "An internal error occurred. Please report this bug.".into(),
            ProbeError::Cancelled => "The scan was cancelled.".into(),
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> String {
        match self {
            err if err.is_unsupported() => {
                "No action needed — a missing feature cannot leak and is scored in your favor."
                    .into()
            }
            err if err.is_timeout() => {
                "This is usually temporary. Re-run the scan in a moment.".into()
            }
            err if err.is_transport() => {
                "Check your connection, then retry the affected probe.".into()
            }
            ProbeError::Cancelled => "Start a new scan to get fresh results.".into(),
            _ => "Please try again. If the problem persists, report a bug.".into(),
        }
    }
}

impl From<ProbeError> for JsValue {
    fn from(err: ProbeError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Error information for JavaScript consumption
#[derive(Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: u32,
    pub message: String,
    pub user_message: String,
    pub recovery_suggestion: String,
    pub is_timeout: bool,
    pub is_transport: bool,
    pub is_unsupported: bool,
}

impl From<&ProbeError> for ErrorInfo {
    fn from(err: &ProbeError) -> Self {
        ErrorInfo {
            code: err.code() as u32,
            message: err.to_string(),
            user_message: err.user_message(),
            recovery_suggestion: err.recovery_suggestion(),
            is_timeout: err.is_timeout(),
            is_transport: err.is_transport(),
            is_unsupported: err.is_unsupported(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_classification() {
        assert!(ProbeError::Unsupported("WebGL".into()).is_unsupported());
        assert!(ProbeError::NoWindow.is_unsupported());

        assert!(!ProbeError::FetchFailed("down".into()).is_unsupported());
        assert!(!ProbeError::GatheringTimeout(5000).is_unsupported());
    }

    #[test]
    fn test_timeout_classification() {
        assert!(ProbeError::GatheringTimeout(5000).is_timeout());
        assert!(ProbeError::FetchTimeout(8000).is_timeout());

        assert!(!ProbeError::Canvas("boom".into()).is_timeout());
    }

    #[test]
    fn test_malformed_counts_as_transport() {
        // Shape mismatches are handled exactly like an unreachable backend.
        assert!(ProbeError::MalformedResponse("bad json".into()).is_transport());
        assert!(ProbeError::FetchFailed("offline".into()).is_transport());
        assert!(ProbeError::HttpStatus {
            status: 502,
            endpoint: "/api/ip".into()
        }
        .is_transport());

        assert!(!ProbeError::Unsupported("AudioContext".into()).is_transport());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ProbeError::Unsupported("x".into()).code(),
            ErrorCode::FeatureUnsupported
        );
        assert_eq!(
            ProbeError::FetchTimeout(1000).code(),
            ErrorCode::FetchTimeout
        );
        assert_eq!(ProbeError::Cancelled.code(), ErrorCode::Cancelled);
    }

    #[test]
    fn test_error_info_round_trip() {
        let err = ProbeError::HttpStatus {
            status: 503,
            endpoint: "/api/dns-leak".into(),
        };
        let info = ErrorInfo::from(&err);
        assert_eq!(info.code, ErrorCode::HttpStatus as u32);
        assert!(info.is_transport);
        assert!(!info.is_timeout);
        assert!(info.message.contains("503"));
    }
}
