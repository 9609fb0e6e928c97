//! Typed session layer
//!
//! [`SessionManager`] maps the engine's domain types onto the raw
//! [`SessionStore`] key/value scopes and owns the token-validity rules:
//! the 5-second expiry buffer, the "token without unexpired expiry is not
//! authenticated" invariant, and the single-use consumption of flow
//! artifacts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::storage::{SessionStore, StorageScope};
use crate::types::{AuthTokens, AuthUser, PendingVerification};

// Ephemeral (tab-scoped) keys: the credential triple.
const KEY_ACCESS_TOKEN: &str = "auric_access_token";
const KEY_REFRESH_TOKEN: &str = "auric_refresh_token";
const KEY_EXPIRES_AT: &str = "auric_expires_at";

// Durable (cross-tab) keys: profile and transient flow artifacts. The
// redirect may return in a different tab than it departed from, so these
// must outlive a single tab.
const KEY_USER: &str = "auric_user";
const KEY_CODE_VERIFIER: &str = "auric_code_verifier";
const KEY_STATE: &str = "auric_state";
const KEY_PENDING_VERIFICATION: &str = "auric_pending_verification";

/// Typed read/write layer over a [`SessionStore`].
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    // ------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------

    /// Replace the credential triple atomically (all three keys co-vary).
    pub fn store_tokens(&self, tokens: &AuthTokens) {
        self.store.set(StorageScope::Ephemeral, KEY_ACCESS_TOKEN, &tokens.access_token);
        match &tokens.refresh_token {
            Some(refresh) => self.store.set(StorageScope::Ephemeral, KEY_REFRESH_TOKEN, refresh),
            None => self.store.remove(StorageScope::Ephemeral, KEY_REFRESH_TOKEN),
        }
        self.store.set(
            StorageScope::Ephemeral,
            KEY_EXPIRES_AT,
            &tokens.expires_at_ms().to_string(),
        );
        debug!("stored token triple");
    }

    /// Current credential triple, if an access token and a parseable expiry
    /// are both present.
    #[must_use]
    pub fn tokens(&self) -> Option<AuthTokens> {
        let access_token = self.access_token()?;
        let expires_at = self.expires_at()?;
        Some(AuthTokens { access_token, refresh_token: self.refresh_token(), expires_at })
    }

    /// Raw access token. May be expired; callers needing validity must
    /// check separately.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.store.get(StorageScope::Ephemeral, KEY_ACCESS_TOKEN)
    }

    /// Raw refresh token, if one was issued.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(StorageScope::Ephemeral, KEY_REFRESH_TOKEN)
    }

    /// Stored expiry instant, if present and parseable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get(StorageScope::Ephemeral, KEY_EXPIRES_AT)?;
        let ms = raw.parse::<i64>().ok()?;
        DateTime::<Utc>::from_timestamp_millis(ms)
    }

    /// Whether the stored token must be treated as expired.
    ///
    /// A missing or unparseable expiry counts as expired: a token without a
    /// matching, non-expired expiry is never treated as authenticated.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        match self.tokens() {
            Some(tokens) => tokens.is_expired(),
            None => true,
        }
    }

    /// Token present AND not expired (with the safety buffer).
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.is_token_expired()
    }

    // ------------------------------------------------------------------
    // User profile
    // ------------------------------------------------------------------

    /// Persist the identity projection.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidResponse`] if the profile cannot be
    /// encoded.
    pub fn store_user(&self, user: &AuthUser) -> Result<(), AuthError> {
        let json = serde_json::to_string(user)
            .map_err(|e| AuthError::InvalidResponse(format!("failed to encode user profile: {e}")))?;
        self.store.set(StorageScope::Durable, KEY_USER, &json);
        Ok(())
    }

    /// Stored identity projection, if any.
    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        let json = self.store.get(StorageScope::Durable, KEY_USER)?;
        match serde_json::from_str(&json) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(error = %err, "dropping unreadable stored user profile");
                None
            }
        }
    }

    /// Store the token triple and profile together after a successful
    /// exchange.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidResponse`] if the profile cannot be
    /// encoded; tokens are not written in that case.
    pub fn store_session(&self, tokens: &AuthTokens, user: &AuthUser) -> Result<(), AuthError> {
        self.store_user(user)?;
        self.store_tokens(tokens);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Flow artifacts (single use)
    // ------------------------------------------------------------------

    /// Persist the verifier and state for an authorization attempt about to
    /// leave the page.
    pub fn put_flow_artifacts(&self, code_verifier: &str, state: &str) {
        self.store.set(StorageScope::Durable, KEY_CODE_VERIFIER, code_verifier);
        self.store.set(StorageScope::Durable, KEY_STATE, state);
    }

    /// Read and clear the stored state. Single use: cleared regardless of
    /// whether the subsequent comparison succeeds.
    #[must_use]
    pub fn take_state(&self) -> Option<String> {
        let state = self.store.get(StorageScope::Durable, KEY_STATE);
        self.store.remove(StorageScope::Durable, KEY_STATE);
        state
    }

    /// Read and clear the stored code verifier. Single use.
    #[must_use]
    pub fn take_code_verifier(&self) -> Option<String> {
        let verifier = self.store.get(StorageScope::Durable, KEY_CODE_VERIFIER);
        self.store.remove(StorageScope::Durable, KEY_CODE_VERIFIER);
        verifier
    }

    // ------------------------------------------------------------------
    // Pending verification
    // ------------------------------------------------------------------

    /// Remember an unverified local-credential attempt so the OTP step can
    /// correlate without re-initiating authorization.
    pub fn store_pending_verification(&self, pending: &PendingVerification) {
        if let Ok(json) = serde_json::to_string(pending) {
            self.store.set(StorageScope::Durable, KEY_PENDING_VERIFICATION, &json);
        }
    }

    /// Stored verification context, if any.
    #[must_use]
    pub fn pending_verification(&self) -> Option<PendingVerification> {
        let json = self.store.get(StorageScope::Durable, KEY_PENDING_VERIFICATION)?;
        serde_json::from_str(&json).ok()
    }

    /// Drop the verification context once resolved.
    pub fn clear_pending_verification(&self) {
        self.store.remove(StorageScope::Durable, KEY_PENDING_VERIFICATION);
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Clear everything: tokens, profile, and flow artifacts.
    pub fn clear_all(&self) {
        self.store.remove(StorageScope::Ephemeral, KEY_ACCESS_TOKEN);
        self.store.remove(StorageScope::Ephemeral, KEY_REFRESH_TOKEN);
        self.store.remove(StorageScope::Ephemeral, KEY_EXPIRES_AT);
        self.store.remove(StorageScope::Durable, KEY_USER);
        self.store.remove(StorageScope::Durable, KEY_CODE_VERIFIER);
        self.store.remove(StorageScope::Durable, KEY_STATE);
        self.store.remove(StorageScope::Durable, KEY_PENDING_VERIFICATION);
        debug!("cleared session state");
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the typed session layer.
    use chrono::Utc;

    use super::*;
    use crate::storage::MemorySessionStore;
    use crate::types::Provider;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(MemorySessionStore::new()))
    }

    fn tokens(expires_in_ms: i64) -> AuthTokens {
        AuthTokens::new(
            "access_123".to_string(),
            Some("refresh_456".to_string()),
            Some(Utc::now().timestamp_millis() + expires_in_ms),
        )
    }

    fn user() -> AuthUser {
        AuthUser {
            id: "usr_1".to_string(),
            email: "user@example.com".to_string(),
            username: "user".to_string(),
            picture: Some("https://cdn.example.com/a.png".to_string()),
            provider: Provider::Google,
        }
    }

    #[test]
    fn token_round_trip_is_byte_identical() {
        let session = manager();
        let stored = tokens(3_600_000);

        session.store_tokens(&stored);
        let read = session.tokens().expect("tokens present");

        assert_eq!(read.access_token, stored.access_token);
        assert_eq!(read.refresh_token, stored.refresh_token);
        assert_eq!(read.expires_at_ms(), stored.expires_at_ms());
    }

    #[test]
    fn fresh_token_is_authenticated() {
        let session = manager();
        session.store_tokens(&tokens(3_600_000));
        assert!(session.is_authenticated());
        assert!(!session.is_token_expired());
    }

    #[test]
    fn token_inside_expiry_buffer_is_not_authenticated() {
        let session = manager();
        session.store_tokens(&tokens(3_000));
        assert!(session.is_token_expired());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn token_without_expiry_is_not_authenticated() {
        let store = Arc::new(MemorySessionStore::new());
        store.set(StorageScope::Ephemeral, "auric_access_token", "orphan");

        let session = SessionManager::new(store);
        assert!(session.access_token().is_some());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn flow_artifacts_are_single_use() {
        let session = manager();
        session.put_flow_artifacts("verifier_abc", "state_xyz");

        assert_eq!(session.take_state().as_deref(), Some("state_xyz"));
        assert_eq!(session.take_state(), None);

        assert_eq!(session.take_code_verifier().as_deref(), Some("verifier_abc"));
        assert_eq!(session.take_code_verifier(), None);
    }

    #[test]
    fn user_profile_round_trips() {
        let session = manager();
        session.store_user(&user()).expect("store user");
        assert_eq!(session.user(), Some(user()));
    }

    #[test]
    fn pending_verification_round_trips_and_clears() {
        let session = manager();
        let pending =
            PendingVerification { email: "user@example.com".to_string(), sdk_request: "req_1".to_string() };

        session.store_pending_verification(&pending);
        assert_eq!(session.pending_verification(), Some(pending));

        session.clear_pending_verification();
        assert_eq!(session.pending_verification(), None);
    }

    #[test]
    fn clear_all_leaves_nothing_observable() {
        let session = manager();
        session.store_session(&tokens(3_600_000), &user()).expect("store session");
        session.put_flow_artifacts("verifier", "state");

        session.clear_all();

        assert_eq!(session.access_token(), None);
        assert_eq!(session.refresh_token(), None);
        assert_eq!(session.user(), None);
        assert_eq!(session.take_state(), None);
        assert_eq!(session.take_code_verifier(), None);
        assert!(!session.is_authenticated());
    }
}
