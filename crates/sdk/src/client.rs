//! Wire client for the authorization server
//!
//! One method per `/sdk/*` endpoint. This layer owns request/response
//! shapes and error-body parsing; flow sequencing (what to do with a
//! response) lives in [`crate::service::AuthService`].
//!
//! The underlying HTTP client never follows redirects: `/sdk/verify-otp`
//! may legitimately answer with a 3xx that the engine must observe and
//! hand to the host's navigator itself.

use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::pkce::PkceChallenge;
use crate::types::{AuthTokens, AuthUser};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Error code the server uses to flag an unverified local account.
const EMAIL_NOT_VERIFIED_CODE: &str = "EMAIL_NOT_VERIFIED";

/// Successful token issuance payload (`/sdk/token`, `/sdk/login-local`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// Bearer credential for API calls.
    pub access_token: String,
    /// Rotating long-lived credential; not every flow issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Identity projection for the authenticated account.
    pub user: AuthUser,
    /// Absolute expiry as epoch milliseconds; defaulted when omitted.
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl TokenGrant {
    /// Split the grant into the stored token triple and profile.
    #[must_use]
    pub fn into_parts(self) -> (AuthTokens, AuthUser) {
        let tokens = AuthTokens::new(self.access_token, self.refresh_token, self.expires_at);
        (tokens, self.user)
    }
}

/// `/sdk/refresh` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// JSON-mode `/sdk/authorize` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    request_id: String,
}

/// Error body shape shared by all endpoints. Every field is optional; the
/// server is not consistent about which ones it fills in.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sdk_request: Option<String>,
}

impl ApiErrorBody {
    fn message_for(&self, status: StatusCode) -> String {
        self.message
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| format!("request failed with status {status}"))
    }
}

/// `/sdk/verify-otp` can answer in three shapes; two of them require the
/// host to navigate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOtpOutcome {
    /// Plain success; the session is unchanged.
    Verified,
    /// The server wants the browser to continue at this URL (either an HTTP
    /// redirect or a `{redirect}` JSON body).
    Redirect(String),
}

/// Success body for `/sdk/verify-otp` when no HTTP redirect is issued.
#[derive(Debug, Default, Deserialize)]
struct VerifyOtpBody {
    #[serde(default)]
    redirect: Option<String>,
}

/// Build the `/sdk/authorize` URL with the standard parameter set.
///
/// Used both for the browser redirect (where the resulting URL is
/// navigated to) and for the local-login phase one (where `json_mode`
/// requests a JSON `{requestId}` response instead of a redirect).
pub(crate) fn build_authorize_url(
    config: &AuthConfig,
    provider: &str,
    challenge: &PkceChallenge,
    json_mode: bool,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(&config.sdk_url("authorize"))
        .map_err(|e| AuthError::Config(format!("invalid base_url: {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("public_key", &config.public_key)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("provider", provider)
            .append_pair("response_type", "code")
            .append_pair("code_challenge", &challenge.code_challenge)
            .append_pair("code_challenge_method", challenge.challenge_method())
            .append_pair("state", &challenge.state);
        if json_mode {
            query.append_pair("json", "true");
        }
    }

    Ok(url)
}

/// HTTP client for the authorization server's SDK endpoints.
pub struct AuthApiClient {
    config: Arc<AuthConfig>,
    http: Client,
}

impl AuthApiClient {
    /// Create a client for the configured authorization server.
    ///
    /// # Errors
    /// Returns [`AuthError::Config`] if the HTTP client cannot be built.
    pub fn new(config: Arc<AuthConfig>) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .redirect(Policy::none())
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    /// Convert a non-success response into [`AuthError::ServerRejection`],
    /// tolerating non-JSON bodies.
    async fn rejection(response: Response) -> AuthError {
        let status = response.status();
        let body: ApiErrorBody = match response.text().await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => ApiErrorBody::default(),
        };
        AuthError::ServerRejection { status: Some(status.as_u16()), message: body.message_for(status) }
    }

    /// Local-login phase one: obtain a `requestId` correlating the eventual
    /// credential POST with a pending authorization context.
    ///
    /// # Errors
    /// Network failures, server rejections, or a body without `requestId`.
    pub async fn authorize_local(&self, challenge: &PkceChallenge) -> Result<String, AuthError> {
        let url = build_authorize_url(&self.config, "local", challenge, true)?;
        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body: AuthorizeResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("authorize response: {e}")))?;

        Ok(body.request_id)
    }

    /// Exchange an authorization code (plus its proof key) for tokens.
    ///
    /// # Errors
    /// Server rejections carry the server-supplied message; a success body
    /// missing `accessToken` or `user` is [`AuthError::InvalidResponse`].
    pub async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .http
            .post(self.config.sdk_url("token"))
            .json(&json!({
                "code": code,
                "public_key": self.config.public_key,
                "redirect_uri": self.config.redirect_uri,
                "code_verifier": code_verifier,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("token response: {e}")))
    }

    /// Rotate the token pair.
    ///
    /// # Errors
    /// Server rejections carry the server-supplied message; a success body
    /// without `success: true` and both new tokens is
    /// [`AuthError::InvalidResponse`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let response = self
            .http
            .post(self.config.sdk_url("refresh"))
            .json(&json!({
                "refreshToken": refresh_token,
                "publicKey": self.config.public_key,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("refresh response: {e}")))?;

        match (body.success, body.access_token, body.refresh_token) {
            (true, Some(access), Some(refresh)) => {
                Ok(AuthTokens::new(access, Some(refresh), body.expires_at))
            }
            _ => Err(AuthError::InvalidResponse(
                "refresh response missing success flag or rotated tokens".to_string(),
            )),
        }
    }

    /// Register a local-credential account. Does not authenticate; a
    /// verification step follows.
    ///
    /// # Errors
    /// Network failures or server rejections.
    pub async fn register(&self, email: &str, password: &str, username: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.config.sdk_url("register"))
            .json(&json!({
                "email": email,
                "password": password,
                "username": username,
                "public_key": self.config.public_key,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        Ok(())
    }

    /// Local-login phase two: submit credentials under a pending
    /// authorization context.
    ///
    /// # Errors
    /// A 403 with `error_code: EMAIL_NOT_VERIFIED` becomes
    /// [`AuthError::EmailNotVerified`] carrying the server's `sdk_request`
    /// handle and the attempted email; other rejections surface as
    /// [`AuthError::ServerRejection`].
    pub async fn login_local(
        &self,
        email: &str,
        password: &str,
        request_id: &str,
    ) -> Result<TokenGrant, AuthError> {
        let response = self
            .http
            .post(self.config.sdk_url("login-local"))
            .json(&json!({
                "email": email,
                "password": password,
                "public_key": self.config.public_key,
                "sdk_request": request_id,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::FORBIDDEN {
                let body: ApiErrorBody = match response.text().await {
                    Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
                    Err(_) => ApiErrorBody::default(),
                };
                if body.error_code.as_deref() == Some(EMAIL_NOT_VERIFIED_CODE) {
                    return Err(AuthError::EmailNotVerified {
                        email: email.to_string(),
                        sdk_request: body.sdk_request.clone(),
                        message: body.message_for(status),
                    });
                }
                return Err(AuthError::ServerRejection {
                    status: Some(status.as_u16()),
                    message: body.message_for(status),
                });
            }
            return Err(Self::rejection(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("login response: {e}")))
    }

    /// Submit a one-time verification code.
    ///
    /// # Errors
    /// Any non-success, non-redirect response fails with the server
    /// message; a 3xx without a `Location` header is
    /// [`AuthError::InvalidResponse`].
    pub async fn verify_otp(
        &self,
        email: &str,
        otp: &str,
        sdk_request: Option<&str>,
    ) -> Result<VerifyOtpOutcome, AuthError> {
        let mut body = json!({
            "email": email,
            "otp": otp,
            "public_key": self.config.public_key,
        });
        if let (Some(handle), Some(map)) = (sdk_request, body.as_object_mut()) {
            map.insert("sdk_request".to_string(), json!(handle));
        }

        let response = self.http.post(self.config.sdk_url("verify-otp")).json(&body).send().await?;

        let status = response.status();
        if status.is_redirection() {
            let target = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string)
                .ok_or_else(|| {
                    AuthError::InvalidResponse("redirect response without Location header".to_string())
                })?;
            return Ok(VerifyOtpOutcome::Redirect(target));
        }

        if !status.is_success() {
            return Err(Self::rejection(response).await);
        }

        // Tolerate empty or non-JSON success bodies.
        let body: VerifyOtpBody = match response.text().await {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => VerifyOtpBody::default(),
        };

        match body.redirect {
            Some(target) => Ok(VerifyOtpOutcome::Redirect(target)),
            None => Ok(VerifyOtpOutcome::Verified),
        }
    }

    /// Ask the server to re-send the verification email.
    ///
    /// # Errors
    /// Network failures or server rejections.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.config.sdk_url("resend-verification"))
            .json(&json!({
                "email": email,
                "public_key": self.config.public_key,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        Ok(())
    }

    /// Server-side logout notification. The caller treats this as
    /// best-effort; local state is already cleared by the time it runs.
    ///
    /// # Errors
    /// Network failures or server rejections (the caller swallows them).
    pub async fn logout(&self) -> Result<(), AuthError> {
        let response = self.http.post(self.config.sdk_url("logout")).send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        debug!("server acknowledged logout");
        Ok(())
    }
}
