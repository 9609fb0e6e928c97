//! Session storage abstraction
//!
//! A small key/value interface split across two named lifetimes, so the
//! engine can run against browser storage in a real host and against an
//! in-memory fake in tests and server-rendered contexts.
//!
//! The lifetime split is deliberate (see the session design notes): tokens
//! and expiry live in the ephemeral scope to bound the blast radius of a
//! leaked long-lived credential, while the user profile and the transient
//! flow artifacts live in the durable scope because a redirect may return
//! in a different tab than it departed from.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Storage lifetime for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Tab-scoped: cleared when the tab closes, not shared across tabs.
    /// Holds tokens and expiry.
    Ephemeral,

    /// Cross-tab and durable. Holds the user profile and transient flow
    /// artifacts (verifier, state, pending verification).
    Durable,
}

/// Key/value persistence used by the session engine.
///
/// Implementations back the two scopes with whatever the host provides
/// (browser session/local storage, an in-memory map, ...). All mutations
/// are synchronous; the engine never holds a mutation across an await
/// point.
pub trait SessionStore: Send + Sync {
    /// Read a value.
    fn get(&self, scope: StorageScope, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    fn set(&self, scope: StorageScope, key: &str, value: &str);

    /// Delete a value. Removing an absent key is a no-op.
    fn remove(&self, scope: StorageScope, key: &str);
}

/// In-memory [`SessionStore`] for tests and non-browser hosts.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    ephemeral: Mutex<HashMap<String, String>>,
    durable: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, scope: StorageScope) -> &Mutex<HashMap<String, String>> {
        match scope {
            StorageScope::Ephemeral => &self.ephemeral,
            StorageScope::Durable => &self.durable,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, scope: StorageScope, key: &str) -> Option<String> {
        self.map(scope).lock().get(key).cloned()
    }

    fn set(&self, scope: StorageScope, key: &str, value: &str) {
        self.map(scope).lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, scope: StorageScope, key: &str) {
        self.map(scope).lock().remove(key);
    }
}
