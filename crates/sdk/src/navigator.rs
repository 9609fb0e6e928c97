//! Browser-navigation seam
//!
//! The redirect flow hands control to the browser twice: a full-page
//! navigation to the authorization server, and a history replacement that
//! strips callback query parameters. Both go through [`Navigator`] so the
//! engine can run headless in tests and server-rendered hosts.

use parking_lot::Mutex;

/// Host navigation operations used by the engine.
pub trait Navigator: Send + Sync {
    /// Perform a full-page navigation. In a browser host this leaves the
    /// page; control does not return to application code.
    fn navigate(&self, url: &str);

    /// Replace the visible URL without triggering a reload (history
    /// replacement).
    fn replace_url(&self, url: &str);
}

/// [`Navigator`] that records calls instead of navigating.
///
/// The substitutable implementation for tests and non-browser hosts.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    navigations: Mutex<Vec<String>>,
    replacements: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    /// Create a navigator with empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All full-page navigations requested so far, oldest first.
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }

    /// All history replacements requested so far, oldest first.
    #[must_use]
    pub fn replacements(&self) -> Vec<String> {
        self.replacements.lock().clone()
    }

    /// The most recent full-page navigation, if any.
    #[must_use]
    pub fn last_navigation(&self) -> Option<String> {
        self.navigations.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        self.navigations.lock().push(url.to_string());
    }

    fn replace_url(&self, url: &str) {
        self.replacements.lock().push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the navigation seam.
    use super::*;

    #[test]
    fn records_navigations_in_order() {
        let navigator = RecordingNavigator::new();
        navigator.navigate("https://a.example");
        navigator.navigate("https://b.example");

        assert_eq!(navigator.navigations(), vec!["https://a.example", "https://b.example"]);
        assert_eq!(navigator.last_navigation().as_deref(), Some("https://b.example"));
    }

    #[test]
    fn tracks_replacements_separately() {
        let navigator = RecordingNavigator::new();
        navigator.replace_url("https://app.example/dashboard");

        assert!(navigator.navigations().is_empty());
        assert_eq!(navigator.replacements(), vec!["https://app.example/dashboard"]);
    }
}
