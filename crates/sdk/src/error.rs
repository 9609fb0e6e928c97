//! Error taxonomy for the authentication engine
//!
//! Every failure surfaces as a tagged [`AuthError`] kind so callers can
//! pattern-match instead of probing message strings. All variants carry a
//! human-readable message suitable for direct display.

use thiserror::Error;

/// Error type for all authentication operations.
///
/// The enum is `Clone` because a single refresh operation may be awaited by
/// many concurrent callers; the coordinator hands each waiter the same
/// failure value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing or invalid setup. Never retried, always fatal to the calling
    /// operation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The `state` returned in the callback does not match the stored value.
    /// Treated as a potential CSRF attack; the flow is aborted.
    #[error("state parameter mismatch on callback (possible CSRF)")]
    CsrfValidation,

    /// The callback arrived without a stored code verifier, i.e. an invalid
    /// or replayed flow.
    #[error("invalid login flow: {0}")]
    PkceFlow(String),

    /// Transport-level failure reaching the authorization server. Surfaced,
    /// not retried by this layer.
    #[error("network error: {0}")]
    Network(String),

    /// Non-success HTTP status with a server-supplied message, surfaced
    /// verbatim where possible.
    #[error("{message}")]
    ServerRejection {
        /// HTTP status code, when the rejection came from an HTTP response
        /// (callback `error` query parameters carry no status).
        status: Option<u16>,
        /// Server-supplied message.
        message: String,
    },

    /// Malformed or incomplete success-shaped response. Prevents partial or
    /// garbage session state from being stored.
    #[error("invalid response from authorization server: {0}")]
    InvalidResponse(String),

    /// Refresh exhausted or absent. The local session has been cleared.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Distinguished local-login outcome: the account exists but its email
    /// is unverified. Carries the continuation handle the caller needs to
    /// route to OTP verification.
    #[error("email not verified: {message}")]
    EmailNotVerified {
        /// Email the login was attempted with.
        email: String,
        /// Server-issued handle correlating this attempt with a subsequent
        /// OTP submission.
        sdk_request: Option<String>,
        /// Server-supplied message.
        message: String,
    },
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
