//! Core session types
//!
//! Domain types owned by the session engine: the token triple, the identity
//! projection, the provider enumeration, and the transient verification
//! context used by the local-credential flow.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Safety buffer applied to expiry checks: a token within this many
/// milliseconds of its expiry is already treated as expired, so a request
/// never departs with a credential that dies in flight.
pub const TOKEN_EXPIRY_BUFFER_MS: i64 = 5_000;

/// Fallback token lifetime when the server omits `expiresAt`.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Access/refresh token pair with its absolute expiry instant.
///
/// The three fields co-vary: a successful refresh replaces all of them
/// atomically. Owned exclusively by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    /// Opaque short-lived bearer credential.
    pub access_token: String,

    /// Opaque longer-lived credential, rotated on every use. Some flows do
    /// not issue one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiration instant (UTC). Wire format is epoch milliseconds.
    pub expires_at: DateTime<Utc>,
}

impl AuthTokens {
    /// Build a token set from wire values.
    ///
    /// `expires_at_ms` is the server-supplied epoch-millisecond instant;
    /// when absent (or unrepresentable) the default 24-hour lifetime
    /// applies.
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at_ms: Option<i64>,
    ) -> Self {
        let expires_at = expires_at_ms
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(default_expiry);

        Self { access_token, refresh_token, expires_at }
    }

    /// Whether the access token is expired by wall clock, applying the
    /// [`TOKEN_EXPIRY_BUFFER_MS`] safety buffer.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::milliseconds(TOKEN_EXPIRY_BUFFER_MS) >= self.expires_at
    }

    /// Expiry instant as epoch milliseconds (wire/storage format).
    #[must_use]
    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

/// Default expiry instant: now plus [`DEFAULT_TOKEN_TTL_HOURS`].
#[must_use]
pub fn default_expiry() -> DateTime<Utc> {
    Utc::now() + Duration::hours(DEFAULT_TOKEN_TTL_HOURS)
}

/// Supported identity sources.
///
/// `Local` is the pseudo-provider for password-based accounts; the rest are
/// external providers reached through the browser redirect flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google OAuth.
    Google,
    /// GitHub OAuth.
    Github,
    /// Microsoft OAuth.
    Microsoft,
    /// Password-based account managed by the authorization server.
    Local,
}

impl Provider {
    /// Wire identifier used in query parameters and stored profiles.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Microsoft => "microsoft",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable projection of the identity provider's claims.
///
/// Stored independently of tokens so the embedding application can render
/// identity even while a refresh is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable subject identifier.
    pub id: String,
    /// Primary email address.
    pub email: String,
    /// Display username.
    pub username: String,
    /// Avatar URL, when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Identity source this profile came from.
    pub provider: Provider,
}

/// Transient context linking an unverified local-credential attempt to a
/// subsequent OTP submission.
///
/// Exists only between a login/registration attempt that required
/// verification and the OTP submission that resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingVerification {
    /// Email the attempt was made with.
    pub email: String,
    /// Server-issued correlation handle.
    pub sdk_request: String,
}

#[cfg(test)]
mod tests {
    //! Unit tests for core session types.
    use super::*;

    #[test]
    fn tokens_default_to_24h_expiry_when_server_omits_it() {
        let tokens = AuthTokens::new("access".to_string(), Some("refresh".to_string()), None);

        let ttl = tokens.expires_at - Utc::now();
        assert!(ttl > Duration::hours(23));
        assert!(ttl <= Duration::hours(24));
    }

    #[test]
    fn tokens_use_server_supplied_expiry() {
        let at = Utc::now().timestamp_millis() + 60_000;
        let tokens = AuthTokens::new("access".to_string(), None, Some(at));

        assert_eq!(tokens.expires_at_ms(), at);
    }

    #[test]
    fn expiry_buffer_treats_near_expiry_as_expired() {
        // 3 seconds out: inside the 5-second buffer, already expired.
        let soon = Utc::now().timestamp_millis() + 3_000;
        let tokens = AuthTokens::new("access".to_string(), None, Some(soon));
        assert!(tokens.is_expired());

        // 10 seconds out: beyond the buffer, still valid.
        let later = Utc::now().timestamp_millis() + 10_000;
        let tokens = AuthTokens::new("access".to_string(), None, Some(later));
        assert!(!tokens.is_expired());
    }

    #[test]
    fn provider_wire_identifiers() {
        assert_eq!(Provider::Google.as_str(), "google");
        assert_eq!(Provider::Github.as_str(), "github");
        assert_eq!(Provider::Microsoft.as_str(), "microsoft");
        assert_eq!(Provider::Local.as_str(), "local");
    }

    #[test]
    fn user_round_trips_through_json() {
        let user = AuthUser {
            id: "usr_1".to_string(),
            email: "user@example.com".to_string(),
            username: "user".to_string(),
            picture: None,
            provider: Provider::Github,
        };

        let json = serde_json::to_string(&user).expect("serialize user");
        let back: AuthUser = serde_json::from_str(&json).expect("deserialize user");
        assert_eq!(user, back);
    }
}
