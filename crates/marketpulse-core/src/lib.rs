//! Shared data model, configuration, and text analysis for marketpulse.
//!
//! Everything downstream (the crawler, the enrichment service, the store,
//! and the report generator) speaks the types defined here.

pub mod config;
pub mod dedup;
pub mod models;
pub mod text;

mod app_config;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env, ConfigError};
pub use dedup::DeduplicationIndex;
pub use models::{
    CrawlReport, Post, PostSummary, SentimentCounts, SentimentLabel, StockMention, TabStatistics,
    ThemeAnalysis, TopDiscussion,
};
