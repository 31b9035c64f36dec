//! Core data model: posts, summaries, and report aggregates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::generate_content_hash;

/// Sentiment classification attached to a post summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
    #[default]
    Unknown,
}

impl SentimentLabel {
    /// Parse a label from an LLM response, falling back to `Neutral` for
    /// anything unrecognized.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            "unknown" => Self::Unknown,
            _ => Self::Neutral,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One collected discussion item.
///
/// Immutable once constructed by the orchestrator. The assigned `id` carries
/// no uniqueness guarantee of its own; deduplication goes through
/// [`Post::content_hash`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub html: String,
    pub timestamp: DateTime<Utc>,
    pub tab: String,

    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_verified: bool,

    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub view_count: u64,

    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub post_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Post {
    /// Content hash over `(text, author, tab)`.
    ///
    /// Two posts with identical text, author, and tab hash identically
    /// regardless of their assigned ids.
    #[must_use]
    pub fn content_hash(&self) -> String {
        generate_content_hash(&[&self.text, self.author.as_deref().unwrap_or(""), &self.tab])
    }

    /// A post is valid iff it has an id, non-empty trimmed text, and a tab.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.text.trim().is_empty() && !self.tab.is_empty()
    }

    /// Engagement score used for top-discussion ranking:
    /// `likes + comments×2 + retweets×3`.
    #[must_use]
    pub fn engagement_score(&self) -> u64 {
        self.like_count
            .saturating_add(self.comment_count.saturating_mul(2))
            .saturating_add(self.retweet_count.saturating_mul(3))
    }
}

/// Structured enrichment of one post, produced by the LLM or by the local
/// heuristic fallback. Merged into storage by `post_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    pub post_id: String,
    /// Snapshot of the post's content hash at enrichment time.
    pub post_hash: String,
    pub tab: String,

    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,

    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub sectors: Vec<String>,

    #[serde(default)]
    pub sentiment: SentimentLabel,
    /// In `[-1.0, 1.0]`.
    #[serde(default)]
    pub sentiment_score: f64,
    #[serde(default)]
    pub sentiment_reasoning: Option<String>,

    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub processing_time_ms: u64,

    /// Original post text capped at 200 chars.
    #[serde(default)]
    pub original_text_preview: String,
}

/// Simple positive/neutral/negative tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl SentimentCounts {
    pub fn record(&mut self, label: SentimentLabel) {
        match label {
            SentimentLabel::Positive => self.positive += 1,
            SentimentLabel::Negative => self.negative += 1,
            SentimentLabel::Neutral | SentimentLabel::Unknown => self.neutral += 1,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }
}

/// Per-tab crawl counters. Mutated only by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabStatistics {
    pub tab_name: String,
    pub total_posts: u64,
    pub valid_posts: u64,
    pub duplicate_posts: u64,

    #[serde(default)]
    pub sentiment: SentimentCounts,
    #[serde(default)]
    pub top_stocks: Vec<String>,
    #[serde(default)]
    pub top_themes: Vec<String>,

    #[serde(default)]
    pub earliest_post: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latest_post: Option<DateTime<Utc>>,

    pub crawl_duration_seconds: f64,
    pub errors_count: u64,
}

impl TabStatistics {
    #[must_use]
    pub fn new(tab_name: &str) -> Self {
        Self {
            tab_name: tab_name.to_owned(),
            ..Self::default()
        }
    }
}

/// Per-symbol mention aggregate, derived by the report generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMention {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub mention_count: u64,

    pub positive_mentions: u64,
    pub neutral_mentions: u64,
    pub negative_mentions: u64,

    /// Up to 5 post ids in which the symbol appeared.
    #[serde(default)]
    pub sample_post_ids: Vec<String>,
}

impl StockMention {
    /// Positive if positive mentions exceed negative by more than ×1.5,
    /// negative for the inverse, otherwise neutral.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overall_sentiment(&self) -> SentimentLabel {
        if self.positive_mentions as f64 > self.negative_mentions as f64 * 1.5 {
            SentimentLabel::Positive
        } else if self.negative_mentions as f64 > self.positive_mentions as f64 * 1.5 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }

    /// `positive / (positive + negative)`, defaulting to 0.5 when neither
    /// side has any mentions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sentiment_ratio(&self) -> f64 {
        let total = self.positive_mentions + self.negative_mentions;
        if total == 0 {
            0.5
        } else {
            self.positive_mentions as f64 / total as f64
        }
    }
}

/// Per-theme aggregate, derived by the report generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeAnalysis {
    pub theme: String,
    pub mention_count: u64,
    #[serde(default)]
    pub related_stocks: Vec<String>,
    pub sentiment: SentimentCounts,
    /// Up to 3 representative text previews.
    #[serde(default)]
    pub representative_quotes: Vec<String>,
    /// `"up"`, `"down"`, or `"stable"` from the same ×1.5 threshold rule as
    /// stock sentiment.
    pub trend_direction: String,
}

/// One entry in the top-discussions ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopDiscussion {
    pub id: String,
    pub tab: String,
    pub text: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    pub likes: u64,
    pub comments: u64,
    pub retweets: u64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sentiment: Option<SentimentLabel>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// The final aggregate for one job. Built once per run; immutable once
/// rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub job_name: String,
    pub job_start: DateTime<Utc>,
    #[serde(default)]
    pub job_end: Option<DateTime<Utc>>,

    pub total_posts_collected: u64,
    pub total_unique_posts: u64,
    pub total_posts_summarized: u64,

    pub tab_statistics: BTreeMap<String, TabStatistics>,

    pub stock_mentions: Vec<StockMention>,
    pub theme_analysis: Vec<ThemeAnalysis>,
    pub overall_sentiment: SentimentCounts,
    pub top_discussions: Vec<TopDiscussion>,

    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
