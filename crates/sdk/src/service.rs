//! High-level authentication service
//!
//! [`AuthService`] orchestrates the whole engine: the browser redirect,
//! the callback state machine, the local-credential flow, the
//! authenticated fetch wrapper, and the read-only session accessors. It
//! owns one wire client, one typed session layer, and one refresh
//! coordinator, all built over dependencies the embedder supplies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::client::{build_authorize_url, AuthApiClient, VerifyOtpOutcome};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::navigator::Navigator;
use crate::pkce::PkceChallenge;
use crate::refresh::RefreshCoordinator;
use crate::session::SessionManager;
use crate::storage::SessionStore;
use crate::types::{AuthTokens, AuthUser, PendingVerification, Provider};

/// Token and profile payload produced by a completed login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    /// Stored credential triple.
    pub tokens: AuthTokens,
    /// Stored identity projection.
    pub user: AuthUser,
}

/// Client-side authentication session engine.
pub struct AuthService {
    config: Arc<AuthConfig>,
    client: Arc<AuthApiClient>,
    session: SessionManager,
    refresh: RefreshCoordinator,
    navigator: Arc<dyn Navigator>,
}

impl AuthService {
    /// Build a service over the embedder's storage and navigation hosts.
    ///
    /// Configuration is validated here, eagerly: no operation can run
    /// against an incomplete setup.
    ///
    /// # Errors
    /// [`AuthError::Config`] for an invalid configuration or an HTTP client
    /// that cannot be built.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let config = Arc::new(config);
        let client = Arc::new(AuthApiClient::new(Arc::clone(&config))?);
        let session = SessionManager::new(store);
        let refresh =
            RefreshCoordinator::new(Arc::clone(&client), session.clone(), Arc::clone(&config));

        Ok(Self { config, client, session, refresh, navigator })
    }

    // ------------------------------------------------------------------
    // Redirect flow
    // ------------------------------------------------------------------

    /// Begin a browser-redirect login with the given provider.
    ///
    /// Generates a fresh proof-key artifact, persists the verifier and
    /// state for the return trip, and hands the authorization URL to the
    /// host's navigator. In a browser host the navigation leaves the page;
    /// control does not come back to application code.
    ///
    /// # Errors
    /// [`AuthError::Config`] before any storage or navigation effect when
    /// the configuration is incomplete.
    pub fn redirect_to_login(&self, provider: Provider) -> Result<(), AuthError> {
        self.config.validate()?;

        let challenge = PkceChallenge::generate();
        self.session.put_flow_artifacts(&challenge.code_verifier, &challenge.state);

        let url = build_authorize_url(&self.config, provider.as_str(), &challenge, false)?;
        info!(%provider, "redirecting to authorization server");
        self.navigator.navigate(url.as_str());
        Ok(())
    }

    /// Handle the return trip from the authorization server.
    ///
    /// Returns `Ok(None)` when the URL is not a callback at all (no `code`
    /// and no `error` parameter); that case is a no-op with no storage side
    /// effects.
    /// On success the tokens and profile are stored and the visible URL is
    /// stripped of its query parameters via history replacement.
    ///
    /// # Errors
    /// - provider-side failure (`error` parameter): [`AuthError::ServerRejection`]
    ///   combining the error code and description, with stored flow
    ///   artifacts left untouched;
    /// - state mismatch or absence: [`AuthError::CsrfValidation`] (stored
    ///   state is consumed either way);
    /// - missing verifier: [`AuthError::PkceFlow`];
    /// - exchange failures as surfaced by the wire client.
    pub async fn handle_callback(
        &self,
        current_url: &str,
    ) -> Result<Option<CallbackOutcome>, AuthError> {
        let url = Url::parse(current_url)
            .map_err(|e| AuthError::Config(format!("invalid callback URL: {e}")))?;
        let params: HashMap<String, String> =
            url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

        if let Some(error) = params.get("error") {
            let message = match params.get("error_description") {
                Some(description) => format!("{error}: {description}"),
                None => error.clone(),
            };
            return Err(AuthError::ServerRejection { status: None, message });
        }

        let Some(code) = params.get("code") else {
            return Ok(None);
        };

        // CSRF binding first. The stored state is consumed whether or not
        // it matches; a failed attempt cannot be replayed.
        let stored_state = self.session.take_state();
        match (stored_state, params.get("state")) {
            (Some(expected), Some(received)) if expected == *received => {}
            _ => return Err(AuthError::CsrfValidation),
        }

        // Proof key next, also single use.
        let code_verifier = self.session.take_code_verifier().ok_or_else(|| {
            AuthError::PkceFlow("no code verifier stored for this login attempt".to_string())
        })?;

        self.config.validate()?;

        let grant = self.client.exchange_code(code, &code_verifier).await?;
        let (tokens, user) = grant.into_parts();
        self.session.store_session(&tokens, &user)?;

        // Strip query parameters from the visible URL without a reload,
        // leaving the path intact.
        let mut stripped = url;
        stripped.set_query(None);
        stripped.set_fragment(None);
        self.navigator.replace_url(stripped.as_str());

        info!(provider = %user.provider, "authorization callback completed");
        Ok(Some(CallbackOutcome { tokens, user }))
    }

    // ------------------------------------------------------------------
    // Local-credential flow
    // ------------------------------------------------------------------

    /// Register a local-credential account.
    ///
    /// Does not authenticate the user; registration is followed by email
    /// verification.
    ///
    /// # Errors
    /// Server rejections carry the server-supplied message.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<(), AuthError> {
        self.client.register(email, password, username).await
    }

    /// Log in with email and password.
    ///
    /// Two-phase: phase one obtains a request handle from the
    /// authorization endpoint with a fresh throwaway proof key (no external
    /// redirect occurs; the code is consumed server-side within the same
    /// request cycle); phase two submits the credentials under
    /// that handle, converging on the same token-issuance path as the
    /// redirect flow.
    ///
    /// # Errors
    /// [`AuthError::EmailNotVerified`] is a distinguished outcome carrying
    /// the server's `sdk_request` continuation handle and the attempted
    /// email; the context is also remembered so a subsequent
    /// [`Self::verify_otp`] call can correlate without re-initiating
    /// authorization.
    pub async fn login_local(
        &self,
        email: &str,
        password: &str,
    ) -> Result<CallbackOutcome, AuthError> {
        let challenge = PkceChallenge::generate();
        let request_id = self.client.authorize_local(&challenge).await?;
        debug!("obtained local-login request handle");

        match self.client.login_local(email, password, &request_id).await {
            Ok(grant) => {
                let (tokens, user) = grant.into_parts();
                self.session.store_session(&tokens, &user)?;
                info!("local login completed");
                Ok(CallbackOutcome { tokens, user })
            }
            Err(err) => {
                if let AuthError::EmailNotVerified { email, sdk_request: Some(handle), .. } = &err {
                    self.session.store_pending_verification(&PendingVerification {
                        email: email.clone(),
                        sdk_request: handle.clone(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Submit a one-time verification code.
    ///
    /// When `sdk_request` is omitted, the context remembered from an
    /// earlier unverified login attempt for the same email is used. If the
    /// server answers with a redirect (HTTP or `{redirect}` JSON), the
    /// host's navigator continues there.
    ///
    /// # Errors
    /// Any non-success, non-redirect response fails with the server
    /// message.
    pub async fn verify_otp(
        &self,
        email: &str,
        otp: &str,
        sdk_request: Option<&str>,
    ) -> Result<(), AuthError> {
        let remembered = self.session.pending_verification();
        let resolved = sdk_request.map(ToString::to_string).or_else(|| {
            remembered.as_ref().filter(|p| p.email == email).map(|p| p.sdk_request.clone())
        });

        let outcome = self.client.verify_otp(email, otp, resolved.as_deref()).await?;
        self.session.clear_pending_verification();

        if let VerifyOtpOutcome::Redirect(target) = outcome {
            info!("verification complete, continuing at server-provided URL");
            self.navigator.navigate(&target);
        }
        Ok(())
    }

    /// Ask the server to re-send the verification email.
    ///
    /// # Errors
    /// Server rejections carry the server-supplied message.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        self.client.resend_verification(email).await
    }

    // ------------------------------------------------------------------
    // Refresh & authenticated fetch
    // ------------------------------------------------------------------

    /// Rotate the token pair, joining any refresh already in flight.
    ///
    /// # Errors
    /// See [`RefreshCoordinator::refresh`].
    pub async fn refresh_tokens(&self) -> Result<AuthTokens, AuthError> {
        self.refresh.refresh().await
    }

    /// Execute a request with bearer authentication and at most one
    /// automatic recovery cycle.
    ///
    /// An already-expired token (5-second safety buffer) is refreshed
    /// before the first attempt. A 401 response triggers exactly one
    /// refresh-and-retry; a second 401 or a refresh failure surfaces as a
    /// terminal [`AuthError::SessionExpired`]. At most two underlying
    /// requests are issued per call. The request body must be cloneable
    /// (buffered) for the retry to be possible.
    ///
    /// # Errors
    /// [`AuthError::SessionExpired`] when unauthenticated or recovery is
    /// exhausted; [`AuthError::Network`] for transport failures, which are
    /// never retried here.
    pub async fn fetch_with_auth(&self, request: RequestBuilder) -> Result<Response, AuthError> {
        if self.session.access_token().is_some() && self.session.is_token_expired() {
            debug!("access token expired before request, refreshing proactively");
            self.refresh.refresh().await?;
        }

        let token = self
            .session
            .access_token()
            .ok_or_else(|| AuthError::SessionExpired("not authenticated".to_string()))?;

        let retry = request.try_clone();
        let response = request
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("request failed: {e}")))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(retry) = retry else {
            return Err(AuthError::Config(
                "request body cannot be cloned; buffer the body to enable the 401 retry".to_string(),
            ));
        };

        debug!("received 401, attempting one refresh-and-retry cycle");
        if self.refresh.refresh().await.is_err() {
            return Err(AuthError::SessionExpired("session expired, please log in again".to_string()));
        }

        let token = self.session.access_token().ok_or_else(|| {
            AuthError::SessionExpired("session expired, please log in again".to_string())
        })?;

        let response = retry
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("request failed: {e}")))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::SessionExpired("session expired, please log in again".to_string()));
        }

        Ok(response)
    }

    // ------------------------------------------------------------------
    // Session accessors
    // ------------------------------------------------------------------

    /// Stored identity projection, independent of token validity.
    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.session.user()
    }

    /// Raw access token. May be expired; use [`Self::valid_token`] or
    /// [`Self::fetch_with_auth`] when validity matters.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.session.access_token()
    }

    /// Token present AND not expired.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    /// Ensure a valid session, refreshing at most once.
    ///
    /// Returns `true` if already valid or the single refresh succeeded;
    /// `false` otherwise (the session is cleared on a failed refresh).
    pub async fn ensure_authenticated(&self) -> bool {
        if self.session.is_authenticated() {
            return true;
        }
        if self.session.refresh_token().is_none() {
            return false;
        }
        self.refresh.refresh().await.is_ok()
    }

    /// A currently-valid access token, refreshing at most once.
    pub async fn valid_token(&self) -> Option<String> {
        if self.ensure_authenticated().await {
            self.session.access_token()
        } else {
            None
        }
    }

    /// Log out: clear all local state unconditionally, then notify the
    /// server best-effort. Network errors are swallowed; local state is
    /// already gone by then.
    pub async fn logout(&self) {
        self.session.clear_all();
        info!("logged out locally");

        if let Err(err) = self.client.logout().await {
            debug!(error = %err, "server logout notification failed (ignored)");
        }
    }

    /// Typed session layer, for advanced hosts and tests.
    #[must_use]
    pub fn session(&self) -> SessionManager {
        self.session.clone()
    }
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the orchestrator paths that never touch the network.
    //! Wire-level flows live in the integration suite.
    use super::*;
    use crate::navigator::RecordingNavigator;
    use crate::storage::MemorySessionStore;

    fn service() -> (AuthService, Arc<MemorySessionStore>, Arc<RecordingNavigator>) {
        let store = Arc::new(MemorySessionStore::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let config = AuthConfig::new(
            "pk_test_123".to_string(),
            "proj_1".to_string(),
            "https://app.example.com/callback".to_string(),
        );
        let service = AuthService::new(
            config,
            Arc::<MemorySessionStore>::clone(&store),
            Arc::<RecordingNavigator>::clone(&navigator),
        )
        .expect("service");
        (service, store, navigator)
    }

    #[test]
    fn construction_rejects_incomplete_config() {
        let config = AuthConfig::new(String::new(), "proj".to_string(), "https://cb".to_string());
        let result = AuthService::new(
            config,
            Arc::new(MemorySessionStore::new()),
            Arc::new(RecordingNavigator::new()),
        );
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn redirect_stores_artifacts_and_navigates() {
        let (service, store, navigator) = service();

        service.redirect_to_login(Provider::Google).expect("redirect");

        let target = navigator.last_navigation().expect("navigation recorded");
        assert!(target.contains("/sdk/authorize?"));
        assert!(target.contains("provider=google"));
        assert!(target.contains("response_type=code"));
        assert!(target.contains("code_challenge_method=S256"));

        let session = SessionManager::new(store);
        let state = session.take_state().expect("state stored");
        assert!(target.contains(&format!("state={state}")));
        assert!(session.take_code_verifier().is_some());
    }

    #[tokio::test]
    async fn non_callback_url_is_a_noop() {
        let (service, store, navigator) = service();

        let outcome = service.handle_callback("https://app.example.com/dashboard").await;
        assert!(matches!(outcome, Ok(None)));

        // No storage side effects, no navigation.
        let session = SessionManager::new(store);
        assert_eq!(session.take_state(), None);
        assert_eq!(session.access_token(), None);
        assert!(navigator.replacements().is_empty());
    }

    #[tokio::test]
    async fn provider_error_combines_code_and_description() {
        let (service, store, _) = service();

        // Seed artifacts to prove they are left untouched.
        let session = SessionManager::new(store);
        session.put_flow_artifacts("verifier", "state");

        let result = service
            .handle_callback(
                "https://app.example.com/callback?error=access_denied&error_description=user%20cancelled",
            )
            .await;

        match result {
            Err(AuthError::ServerRejection { status: None, message }) => {
                assert!(message.contains("access_denied"));
                assert!(message.contains("user cancelled"));
            }
            other => panic!("expected server rejection, got {other:?}"),
        }

        assert_eq!(session.take_state().as_deref(), Some("state"));
        assert_eq!(session.take_code_verifier().as_deref(), Some("verifier"));
    }

    #[tokio::test]
    async fn state_mismatch_is_a_csrf_violation() {
        let (service, store, _) = service();
        service.redirect_to_login(Provider::Github).expect("redirect");

        let result = service
            .handle_callback("https://app.example.com/callback?code=abc&state=forged")
            .await;
        assert!(matches!(result, Err(AuthError::CsrfValidation)));

        // State is consumed; the verifier survives this first check.
        let session = SessionManager::new(store);
        assert_eq!(session.take_state(), None);
        assert!(session.take_code_verifier().is_some());
    }

    #[tokio::test]
    async fn callback_without_stored_state_is_a_csrf_violation() {
        let (service, _, _) = service();
        let result = service
            .handle_callback("https://app.example.com/callback?code=abc&state=anything")
            .await;
        assert!(matches!(result, Err(AuthError::CsrfValidation)));
    }

    #[tokio::test]
    async fn missing_verifier_is_a_flow_error() {
        let (service, store, _) = service();

        // State present but no verifier: invalid or replayed flow.
        let session = SessionManager::new(store);
        session.put_flow_artifacts("v", "expected");
        let _ = session.take_code_verifier();

        let result = service
            .handle_callback("https://app.example.com/callback?code=abc&state=expected")
            .await;
        assert!(matches!(result, Err(AuthError::PkceFlow(_))));
    }

    #[test]
    fn accessors_report_empty_session() {
        let (service, _, _) = service();
        assert_eq!(service.user(), None);
        assert_eq!(service.token(), None);
        assert!(!service.is_authenticated());
    }
}
