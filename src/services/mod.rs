//! External service adapters
//!
//! Pure request/response boundaries: given an input artifact and a timeout,
//! return the parsed artifact or a classified error. Retry lives in the
//! pipeline, never here; the adapter's job is telling transient failures
//! (retry-worthy) apart from permanent ones (retrying cannot succeed).

mod analyze;
mod transcribe;

pub use analyze::{estimate_analysis_cost_cents, Analyzer, HttpAnalyzer};
pub use transcribe::{estimate_transcription_cost_cents, HttpTranscriber, Transcriber};

use crate::error::ServiceError;

/// Map a reqwest transport error onto the retry taxonomy.
pub(crate) fn classify_transport(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ServiceError::Transient(err.to_string())
    } else {
        ServiceError::Permanent(err.to_string())
    }
}

/// Map an HTTP status onto the retry taxonomy: 429 and 5xx are worth
/// retrying, any other non-success is not.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> ServiceError {
    if status.as_u16() == 429 || status.is_server_error() {
        ServiceError::Transient(format!("{}: {}", status, body))
    } else {
        ServiceError::Permanent(format!("{}: {}", status, body))
    }
}
