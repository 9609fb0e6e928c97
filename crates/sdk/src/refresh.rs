//! Single-flight refresh coordinator
//!
//! Multiple call sites can discover an expired token in the same instant;
//! each of them must end up awaiting one underlying rotation rather than
//! issuing duplicate network requests. The coordinator keeps the current
//! operation in a slot as a shared future: late callers clone and await it.
//! The operation clears its own slot as its final step, so the reset does
//! not depend on any particular caller surviving to completion and a
//! subsequent invocation always starts a fresh attempt.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::AuthApiClient;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::session::SessionManager;
use crate::types::AuthTokens;

type InflightRefresh = Shared<BoxFuture<'static, Result<AuthTokens, AuthError>>>;

/// Deduplicates concurrent refresh attempts into a single in-flight
/// operation and rotates the token pair.
pub struct RefreshCoordinator {
    client: Arc<AuthApiClient>,
    session: SessionManager,
    config: Arc<AuthConfig>,
    inflight: Arc<Mutex<Option<InflightRefresh>>>,
}

impl RefreshCoordinator {
    /// Create a coordinator over the shared client, session, and config.
    #[must_use]
    pub fn new(client: Arc<AuthApiClient>, session: SessionManager, config: Arc<AuthConfig>) -> Self {
        Self { client, session, config, inflight: Arc::new(Mutex::new(None)) }
    }

    /// Rotate the access/refresh pair, joining any refresh already underway.
    ///
    /// On success the new triple is stored atomically and the
    /// `on_token_refresh` hook fires. On any failure the entire session is
    /// cleared (an invalid refresh token means the whole credential chain
    /// is no longer trustworthy), the `on_auth_error` hook fires, and every
    /// waiter receives the same error.
    ///
    /// Callers may be cancelled at any await point; the slot reset is part
    /// of the shared operation itself, so a dropped caller never strands a
    /// completed operation in the slot.
    ///
    /// # Errors
    /// [`AuthError::SessionExpired`] when no refresh token is stored (no
    /// network call is made), otherwise whatever the wire call produced.
    pub async fn refresh(&self) -> Result<AuthTokens, AuthError> {
        let operation = {
            let mut slot = self.inflight.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let client = Arc::clone(&self.client);
                    let session = self.session.clone();
                    let config = Arc::clone(&self.config);
                    let slot_handle = Arc::clone(&self.inflight);
                    let operation = async move {
                        let result = Self::run(client, session, config).await;
                        // Reset before any waiter observes completion. The
                        // slot still holds this operation (a new one can
                        // only be installed into an empty slot), so this
                        // never clobbers a successor.
                        *slot_handle.lock().await = None;
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(operation.clone());
                    operation
                }
            }
        };

        operation.await
    }

    async fn run(
        client: Arc<AuthApiClient>,
        session: SessionManager,
        config: Arc<AuthConfig>,
    ) -> Result<AuthTokens, AuthError> {
        let result = Self::rotate(&client, &session).await;

        match &result {
            Ok(tokens) => {
                info!("rotated access token");
                if let Some(hook) = &config.on_token_refresh {
                    hook(tokens);
                }
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed, clearing session");
                session.clear_all();
                if let Some(hook) = &config.on_auth_error {
                    hook(err);
                }
            }
        }

        result
    }

    async fn rotate(
        client: &AuthApiClient,
        session: &SessionManager,
    ) -> Result<AuthTokens, AuthError> {
        let refresh_token = session
            .refresh_token()
            .ok_or_else(|| AuthError::SessionExpired("no refresh token available".to_string()))?;

        let tokens = client.refresh(&refresh_token).await?;
        session.store_tokens(&tokens);
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the refresh coordinator. Wire-level single-flight
    //! properties live in the integration suite.
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::storage::MemorySessionStore;

    fn coordinator_with_hooks(
        error_count: Arc<AtomicUsize>,
    ) -> (RefreshCoordinator, SessionManager) {
        let config = Arc::new(
            AuthConfig::new(
                "pk_test".to_string(),
                "proj".to_string(),
                "https://app.example.com/callback".to_string(),
            )
            .with_auth_error_hook(move |_| {
                error_count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let session = SessionManager::new(Arc::new(MemorySessionStore::new()));
        let client = Arc::new(AuthApiClient::new(Arc::clone(&config)).expect("client"));
        (RefreshCoordinator::new(client, session.clone(), config), session)
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails_without_network() {
        let errors = Arc::new(AtomicUsize::new(0));
        let (coordinator, session) = coordinator_with_hooks(Arc::clone(&errors));

        // No tokens stored at all; the config's base URL points at the
        // default origin, so any network attempt would not return this
        // quickly or deterministically.
        let result = coordinator.refresh().await;

        assert!(matches!(result, Err(AuthError::SessionExpired(_))));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn failed_refresh_clears_stored_user() {
        let errors = Arc::new(AtomicUsize::new(0));
        let (coordinator, session) = coordinator_with_hooks(Arc::clone(&errors));

        let user = crate::types::AuthUser {
            id: "usr_1".to_string(),
            email: "user@example.com".to_string(),
            username: "user".to_string(),
            picture: None,
            provider: crate::types::Provider::Local,
        };
        session.store_user(&user).expect("store user");

        let _ = coordinator.refresh().await;

        assert_eq!(session.user(), None);
    }
}
