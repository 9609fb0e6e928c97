//! Client-side authentication session engine for the Auric platform
//!
//! Drives an OAuth 2.1 / PKCE authorization-code flow from a browser-hosted
//! application, exchanges codes for tokens, persists and refreshes
//! credentials, and transparently authenticates outbound HTTP calls. A
//! parallel local-credential path (register / login / one-time-code
//! verification) converges on the same token substrate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │   AuthService    │  High-level orchestrator
//! └────────┬─────────┘
//!          │
//!          ├──► AuthApiClient       (wire calls to /sdk/* endpoints)
//!          ├──► RefreshCoordinator  (single-flight token rotation)
//!          ├──► SessionManager      (typed layer over SessionStore)
//!          │         │
//!          │         └──► SessionStore   (two-scope key/value host storage)
//!          ├──► Navigator           (browser navigation seam)
//!          └──► PKCE utilities      (verifier / challenge / state)
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use auric_sdk::{
//!     AuthConfig, AuthService, MemorySessionStore, Provider, RecordingNavigator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::new(
//!         "pk_live_abc123".to_string(),
//!         "proj_42".to_string(),
//!         "https://app.example.com/auth/callback".to_string(),
//!     );
//!
//!     // A browser host supplies storage/navigation bound to the page;
//!     // tests and server-rendered hosts use the in-memory substitutes.
//!     let service = AuthService::new(
//!         config,
//!         Arc::new(MemorySessionStore::new()),
//!         Arc::new(RecordingNavigator::new()),
//!     )?;
//!
//!     // Leave for the authorization server...
//!     service.redirect_to_login(Provider::Google)?;
//!
//!     // ...and on the return trip:
//!     if let Some(outcome) = service.handle_callback("https://app.example.com/auth/callback?code=..&state=..").await? {
//!         println!("signed in as {}", outcome.user.username);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Security properties
//!
//! - **PKCE (S256)**: authorization codes are bound to this client's proof
//!   key; interception alone cannot redeem them.
//! - **CSRF state**: callbacks must present the single-use state stored
//!   before departure.
//! - **Single-flight refresh**: concurrent expiry discoveries share one
//!   rotation request.
//! - **Bounded retry**: the authenticated fetch wrapper issues at most two
//!   underlying requests and never loops on 401s.
//! - **Fail-closed session**: a failed refresh clears every credential so
//!   stale partial state is never observable as valid.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod client;
pub mod config;
pub mod error;
pub mod navigator;
pub mod pkce;
pub mod refresh;
pub mod service;
pub mod session;
pub mod storage;
pub mod types;

// Re-export the surface most embedders need.
pub use client::{AuthApiClient, TokenGrant, VerifyOtpOutcome};
pub use config::{AuthConfig, AuthErrorHook, TokenRefreshHook, DEFAULT_BASE_URL};
pub use error::AuthError;
pub use navigator::{Navigator, RecordingNavigator};
pub use pkce::{generate_code_challenge, generate_code_verifier, generate_state, PkceChallenge};
pub use refresh::RefreshCoordinator;
pub use service::{AuthService, CallbackOutcome};
pub use session::SessionManager;
pub use storage::{MemorySessionStore, SessionStore, StorageScope};
pub use types::{
    AuthTokens, AuthUser, PendingVerification, Provider, DEFAULT_TOKEN_TTL_HOURS,
    TOKEN_EXPIRY_BUFFER_MS,
};
