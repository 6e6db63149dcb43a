//! Coaching protocol: backend clients and response correlation.
//!
//! A request carries a fresh correlation id; its response is actionable only
//! when the echoed id matches a still-outstanding request.

pub mod client;
pub mod correlation;

pub use client::{build_request, CoachingClient, HttpCoachingClient, OfflineCoach, RequestContext};
pub use correlation::{OutstandingRequests, RequestOrigin};

/// Coaching transport failures. Reported once per call, never retried.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}
