//! LLM enrichment for crawled posts.
//!
//! Wraps an OpenAI-compatible chat completions API with client-side rate
//! limiting, retry with back-off, and a keyword-analysis fallback so every
//! post ends up with a summary even when the API is down or unconfigured.

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod summarizer;

mod retry;

pub use client::{ChatMessage, Completion, LlmClient};
pub use error::EnrichError;
pub use rate_limit::RateLimiter;
pub use summarizer::{EnrichStats, Summarizer};
