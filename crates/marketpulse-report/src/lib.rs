//! Report aggregation and markdown rendering.

pub mod aggregate;
pub mod markdown;

pub use aggregate::{
    aggregate_stock_mentions, aggregate_themes, build_report, overall_sentiment, top_discussions,
};
pub use markdown::render;
