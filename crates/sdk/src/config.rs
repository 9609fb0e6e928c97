//! Service configuration
//!
//! An explicitly constructed, immutable configuration value that is handed
//! to [`crate::service::AuthService`] at construction. There is no global
//! singleton: every component receives the configuration it depends on,
//! which keeps initialization order visible and components testable in
//! isolation.

use std::fmt;
use std::sync::Arc;

use crate::error::AuthError;
use crate::types::AuthTokens;

/// Default authorization-server origin used when the embedder does not
/// supply one.
pub const DEFAULT_BASE_URL: &str = "https://api.auric.dev";

/// Hook invoked with the new token triple after every successful refresh.
pub type TokenRefreshHook = Arc<dyn Fn(&AuthTokens) + Send + Sync>;

/// Hook invoked when a refresh fails and the session is cleared.
pub type AuthErrorHook = Arc<dyn Fn(&AuthError) + Send + Sync>;

/// Authentication configuration for one embedding application.
///
/// Created once, validated by [`crate::service::AuthService::new`], and
/// read-only thereafter.
#[derive(Clone)]
pub struct AuthConfig {
    /// Project identifier issued by the authorization server.
    pub public_key: String,

    /// Project identifier within the embedding platform.
    pub project_id: String,

    /// Redirect URI; must exactly match a value registered server-side.
    pub redirect_uri: String,

    /// Authorization-server origin, without a trailing slash.
    pub base_url: String,

    pub(crate) on_token_refresh: Option<TokenRefreshHook>,
    pub(crate) on_auth_error: Option<AuthErrorHook>,
}

impl AuthConfig {
    /// Create a configuration with the default base URL and no hooks.
    #[must_use]
    pub fn new(public_key: String, project_id: String, redirect_uri: String) -> Self {
        Self {
            public_key,
            project_id,
            redirect_uri,
            base_url: DEFAULT_BASE_URL.to_string(),
            on_token_refresh: None,
            on_auth_error: None,
        }
    }

    /// Override the authorization-server origin. A trailing slash is
    /// stripped so endpoint paths join cleanly.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Install a hook invoked after every successful token refresh.
    #[must_use]
    pub fn with_token_refresh_hook(
        mut self,
        hook: impl Fn(&AuthTokens) + Send + Sync + 'static,
    ) -> Self {
        self.on_token_refresh = Some(Arc::new(hook));
        self
    }

    /// Install a hook invoked when a refresh fails and the session is
    /// cleared.
    #[must_use]
    pub fn with_auth_error_hook(
        mut self,
        hook: impl Fn(&AuthError) + Send + Sync + 'static,
    ) -> Self {
        self.on_auth_error = Some(Arc::new(hook));
        self
    }

    /// Check the fields every operation depends on.
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] when `public_key` or `redirect_uri` is
    /// empty.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.public_key.is_empty() {
            return Err(AuthError::Config("public_key must not be empty".to_string()));
        }
        if self.redirect_uri.is_empty() {
            return Err(AuthError::Config("redirect_uri must not be empty".to_string()));
        }
        Ok(())
    }

    /// Absolute URL of an `/sdk/*` endpoint on the authorization server.
    #[must_use]
    pub fn sdk_url(&self, leaf: &str) -> String {
        format!("{}/sdk/{leaf}", self.base_url)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("public_key", &self.public_key)
            .field("project_id", &self.project_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("base_url", &self.base_url)
            .field("on_token_refresh", &self.on_token_refresh.is_some())
            .field("on_auth_error", &self.on_auth_error.is_some())
            .finish()
    }
}
