//! The browser automation seam.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CrawlError;

/// Capability set the orchestrator needs from a rendered-page driver.
///
/// Implementations own navigation, rendering, and element extraction; the
/// orchestrator only ever sees raw item text. All methods are best-effort;
/// failures surface as [`CrawlError`] and are handled per the orchestrator's
/// partial-failure policy.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to the feed and select the named tab.
    async fn open_tab(&self, tab: &str) -> Result<(), CrawlError>;

    /// Text content of the post elements currently visible on the page.
    async fn visible_items(&self) -> Result<Vec<String>, CrawlError>;

    /// Advance the feed (scroll) so new items become visible.
    async fn scroll(&self) -> Result<(), CrawlError>;

    /// Close login prompts or other overlays if present. Failures here are
    /// ignorable; drivers should not error on a missing overlay.
    async fn dismiss_overlays(&self) -> Result<(), CrawlError>;
}

/// Driver fed from pre-scripted item batches, one batch per pass.
///
/// Used by tests and by the CLI's offline mode: each call to
/// [`BrowserDriver::visible_items`] returns the next scripted batch, and an
/// exhausted script keeps returning the final batch (mimicking a feed that
/// stopped loading new content).
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    passes: Mutex<Vec<Vec<String>>>,
    cursor: Mutex<usize>,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new(passes: Vec<Vec<String>>) -> Self {
        Self {
            passes: Mutex::new(passes),
            cursor: Mutex::new(0),
        }
    }

    /// Single-pass driver that always shows the same items.
    #[must_use]
    pub fn repeating(items: Vec<String>) -> Self {
        Self::new(vec![items])
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn open_tab(&self, _tab: &str) -> Result<(), CrawlError> {
        *self.cursor.lock().expect("cursor lock poisoned") = 0;
        Ok(())
    }

    async fn visible_items(&self) -> Result<Vec<String>, CrawlError> {
        let passes = self.passes.lock().expect("passes lock poisoned");
        let cursor = *self.cursor.lock().expect("cursor lock poisoned");
        if passes.is_empty() {
            return Ok(Vec::new());
        }
        let idx = cursor.min(passes.len() - 1);
        Ok(passes[idx].clone())
    }

    async fn scroll(&self) -> Result<(), CrawlError> {
        let mut cursor = self.cursor.lock().expect("cursor lock poisoned");
        *cursor += 1;
        Ok(())
    }

    async fn dismiss_overlays(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}
