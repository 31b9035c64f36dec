//! Crawl orchestration for marketpulse.
//!
//! Drives a [`BrowserDriver`] per tab, deduplicates extracted items against a
//! session-scoped index, validates posts, and bounds concurrency across tabs.
//! The browser automation itself lives behind the driver trait; this crate
//! ships a browserless-service implementation and a scripted stub for tests.

pub mod browserless;
pub mod driver;
pub mod error;
pub mod orchestrator;

pub use browserless::BrowserlessDriver;
pub use driver::{BrowserDriver, ScriptedDriver};
pub use error::CrawlError;
pub use orchestrator::{CrawlOrchestrator, PostBatch};
