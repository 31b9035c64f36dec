//! Post summarization: LLM analysis with a keyword fallback.
//!
//! Every post gets a [`PostSummary`] no matter what the API does. The happy
//! path is a rate-limited, retried JSON-mode completion; malformed output,
//! exhausted retries, or a missing API key all land on the keyword-based
//! fallback so the pipeline never stalls on enrichment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Deserialize;

use marketpulse_core::text::{classify_sentiment_basic, identify_sectors, truncate_text};
use marketpulse_core::{AppConfig, Post, PostSummary, SentimentLabel};

use crate::client::{ChatMessage, LlmClient};
use crate::error::EnrichError;
use crate::rate_limit::RateLimiter;
use crate::retry::retry_with_backoff;

const SUMMARIZATION_PROMPT: &str = r#"You are an expert financial analyst specializing in Chinese stock markets.
Analyze the following investor discussion post from a Chinese social investing platform.

Your task is to extract insights and output them STRICTLY IN ENGLISH.

Tasks:
1. Provide a concise summary (1-2 sentences) IN ENGLISH.
2. Extract key discussion points IN ENGLISH.
3. Identify mentioned stock tickers (format: SH/SZ/HK + code).
4. Identify company names (Translate Chinese names to English, e.g., "贵州茅台" -> "Kweichow Moutai").
5. Identify investment themes and sectors (Use standard English terms like "Technology", "Finance").
6. Analyze sentiment (positive/neutral/negative) and provide reasoning IN ENGLISH.

Respond in JSON format with the following structure:
{
    "summary": "Brief summary of the post in English",
    "key_points": ["Point 1 in English", "Point 2 in English"],
    "tickers": ["SH600519", "SZ000001"],
    "companies": ["Kweichow Moutai", "Ping An Bank"],
    "themes": ["Value Investing", "White Liquor"],
    "sectors": ["Consumption", "Finance"],
    "sentiment": "positive",
    "sentiment_score": 0.8,
    "sentiment_reasoning": "The author expresses optimism about... (in English)"
}

Important Constraints:
- OUTPUT LANGUAGE: ALL text fields (summary, key_points, companies, themes, reasoning) MUST BE IN ENGLISH.
- Translate any Chinese text found in the post into English for the summary and reasoning.
- If no stocks are mentioned, return empty arrays.
- Sentiment score should be between -1.0 (very negative) and 1.0 (very positive).
- Do not hallucinate or add information not present in the original post."#;

/// Model output schema. Every field defaults so a sparse but well-formed
/// object still parses.
#[derive(Debug, Deserialize)]
struct LlmAnalysis {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    tickers: Vec<String>,
    #[serde(default)]
    companies: Vec<String>,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    sectors: Vec<String>,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    sentiment_score: f64,
    #[serde(default)]
    sentiment_reasoning: Option<String>,
}

/// Request counters, snapshotted via [`Summarizer::statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_tokens: AtomicU64,
}

pub struct Summarizer {
    client: Option<LlmClient>,
    rate_limiter: RateLimiter,
    retry_attempts: u32,
    backoff_base_ms: u64,
    max_concurrent: usize,
    counters: Counters,
}

impl Summarizer {
    /// Build from config. Without an API key the summarizer runs in
    /// fallback-only mode.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, EnrichError> {
        let client = match &config.llm_api_key {
            Some(key) => Some(LlmClient::new(
                key,
                &config.llm_api_base_url,
                &config.llm_model_name,
                config.llm_max_tokens,
                config.llm_temperature,
                config.llm_request_timeout_secs,
            )?),
            None => {
                tracing::warn!("no LLM API key configured, using keyword fallback for all posts");
                None
            }
        };
        Ok(Self {
            client,
            rate_limiter: RateLimiter::per_minute(config.llm_requests_per_minute),
            retry_attempts: config.llm_retry_attempts,
            backoff_base_ms: config.llm_retry_backoff_base_ms,
            max_concurrent: config.llm_max_concurrent_requests.max(1),
            counters: Counters::default(),
        })
    }

    /// A summarizer that never calls an API.
    #[must_use]
    pub fn fallback_only() -> Self {
        Self {
            client: None,
            rate_limiter: RateLimiter::per_minute(0),
            retry_attempts: 0,
            backoff_base_ms: 0,
            max_concurrent: 1,
            counters: Counters::default(),
        }
    }

    /// Summarize one post. Infallible: API trouble degrades to the keyword
    /// fallback.
    pub async fn summarize_post(&self, post: &Post) -> PostSummary {
        let start = Instant::now();
        let Some(client) = &self.client else {
            return fallback_summary(post, start);
        };

        let messages = [
            ChatMessage {
                role: "system",
                content: SUMMARIZATION_PROMPT.to_owned(),
            },
            ChatMessage {
                role: "user",
                content: format!("Post content:\n\n{}", post.text),
            },
        ];

        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
        let result = retry_with_backoff(self.retry_attempts, self.backoff_base_ms, || async {
            self.rate_limiter.wait().await;
            client.complete(&messages).await
        })
        .await;

        match result {
            Ok(completion) => {
                self.counters
                    .successful_requests
                    .fetch_add(1, Ordering::Relaxed);
                self.counters
                    .total_tokens
                    .fetch_add(completion.total_tokens, Ordering::Relaxed);
                match serde_json::from_str::<LlmAnalysis>(&completion.content) {
                    Ok(analysis) => build_summary(post, analysis, client.model(), start),
                    Err(e) => {
                        tracing::warn!(post_id = %post.id, error = %e, "unparseable model output, falling back");
                        fallback_summary(post, start)
                    }
                }
            }
            Err(e) => {
                self.counters.failed_requests.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(post_id = %post.id, error = %e, "LLM call failed, falling back");
                fallback_summary(post, start)
            }
        }
    }

    /// Summarize a batch with bounded concurrency. One summary per post,
    /// in input order.
    pub async fn summarize_posts(&self, posts: &[Post]) -> Vec<PostSummary> {
        let total = posts.len();
        tracing::info!(
            total,
            max_concurrent = self.max_concurrent,
            "starting summarization"
        );

        let done = Arc::new(AtomicU64::new(0));
        let summaries: Vec<PostSummary> = stream::iter(posts)
            .map(|post| {
                let done = Arc::clone(&done);
                async move {
                    let summary = self.summarize_post(post).await;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % 10 == 0 || n as usize == total {
                        tracing::info!(done = n, total, "summarization progress");
                    }
                    summary
                }
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        tracing::info!(total = summaries.len(), "summarization complete");
        summaries
    }

    #[must_use]
    pub fn statistics(&self) -> EnrichStats {
        EnrichStats {
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            successful_requests: self.counters.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.counters.failed_requests.load(Ordering::Relaxed),
            total_tokens: self.counters.total_tokens.load(Ordering::Relaxed),
        }
    }
}

fn build_summary(post: &Post, analysis: LlmAnalysis, model: &str, start: Instant) -> PostSummary {
    // Regex-extracted symbols complement whatever the model found.
    let mut tickers = analysis.tickers;
    for symbol in &post.symbols {
        if !tickers.contains(symbol) {
            tickers.push(symbol.clone());
        }
    }

    PostSummary {
        post_id: post.id.clone(),
        post_hash: post.content_hash(),
        tab: post.tab.clone(),
        summary: analysis.summary,
        key_points: analysis.key_points,
        tickers,
        companies: analysis.companies,
        themes: analysis.themes,
        sectors: analysis.sectors,
        sentiment: SentimentLabel::parse_lenient(&analysis.sentiment),
        sentiment_score: analysis.sentiment_score.clamp(-1.0, 1.0),
        sentiment_reasoning: analysis.sentiment_reasoning,
        processed_at: Utc::now(),
        model_used: model.to_owned(),
        #[allow(clippy::cast_possible_truncation)]
        processing_time_ms: start.elapsed().as_millis() as u64,
        original_text_preview: truncate_text(&post.text, 200),
    }
}

/// Keyword-based summary for posts the LLM could not analyze.
fn fallback_summary(post: &Post, start: Instant) -> PostSummary {
    let (sentiment, confidence) = classify_sentiment_basic(&post.text);
    let sentiment_score = match sentiment {
        SentimentLabel::Positive => confidence,
        SentimentLabel::Negative => -confidence,
        _ => 0.0,
    };

    PostSummary {
        post_id: post.id.clone(),
        post_hash: post.content_hash(),
        tab: post.tab.clone(),
        summary: format!("{} (Auto-generated)", truncate_text(&post.text, 100)),
        key_points: Vec::new(),
        tickers: post.symbols.clone(),
        companies: Vec::new(),
        themes: Vec::new(),
        sectors: identify_sectors(&post.text),
        sentiment,
        sentiment_score,
        sentiment_reasoning: Some("Basic keyword-based analysis".to_owned()),
        processed_at: Utc::now(),
        model_used: "fallback".to_owned(),
        #[allow(clippy::cast_possible_truncation)]
        processing_time_ms: start.elapsed().as_millis() as u64,
        original_text_preview: truncate_text(&post.text, 200),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn post(text: &str) -> Post {
        Post {
            id: "abc123".to_owned(),
            text: text.to_owned(),
            html: String::new(),
            timestamp: Utc::now(),
            tab: "热门".to_owned(),
            author: Some("tester".to_owned()),
            author_id: None,
            author_verified: false,
            like_count: 0,
            comment_count: 0,
            retweet_count: 0,
            view_count: 0,
            symbols: vec!["SH600519".to_owned()],
            urls: vec![],
            images: vec![],
            post_url: None,
            created_at: None,
            source: None,
        }
    }

    fn config_for(server_uri: &str, retries: u32) -> AppConfig {
        AppConfig {
            job_name: "test".to_owned(),
            log_level: "info".to_owned(),
            crawler_max_posts_per_tab: 10,
            crawler_max_concurrent_tabs: 1,
            browser_base_url: "http://localhost:3000".to_owned(),
            browser_token: None,
            browser_feed_url: "https://example.com/".to_owned(),
            llm_api_key: Some("test-key".to_owned()),
            llm_api_base_url: server_uri.to_owned(),
            llm_model_name: "test-model".to_owned(),
            llm_max_tokens: 512,
            llm_temperature: 0.2,
            llm_requests_per_minute: 0,
            llm_max_concurrent_requests: 1,
            llm_retry_attempts: retries,
            llm_retry_backoff_base_ms: 0,
            llm_request_timeout_secs: 10,
            storage_base_dir: std::path::PathBuf::from("storage"),
            storage_save_interval_secs: 30,
        }
    }

    #[tokio::test]
    async fn fallback_classifies_positive_keyword_text() {
        let summarizer = Summarizer::fallback_only();
        let summary = summarizer.summarize_post(&post("白酒板块大涨，强烈看好后市")).await;

        assert_eq!(summary.model_used, "fallback");
        assert_eq!(summary.sentiment, SentimentLabel::Positive);
        assert!(summary.sentiment_score > 0.0);
        assert_eq!(summary.tickers, vec!["SH600519"]);
        assert!(summary.summary.ends_with("(Auto-generated)"));
    }

    #[tokio::test]
    async fn fallback_negates_score_for_negative_text() {
        let summarizer = Summarizer::fallback_only();
        let summary = summarizer.summarize_post(&post("利空消息不断，风险很大，建议清仓")).await;

        assert_eq!(summary.sentiment, SentimentLabel::Negative);
        assert!(summary.sentiment_score < 0.0);
    }

    #[tokio::test]
    async fn model_analysis_is_merged_with_extracted_symbols() {
        let server = MockServer::start().await;
        let analysis = serde_json::json!({
            "summary": "Bullish take on Moutai.",
            "key_points": ["Strong earnings"],
            "tickers": ["SZ000001"],
            "companies": ["Kweichow Moutai"],
            "themes": ["White Liquor"],
            "sectors": ["Consumption"],
            "sentiment": "positive",
            "sentiment_score": 0.8,
            "sentiment_reasoning": "Optimistic language."
        });
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": analysis.to_string()}}],
                "usage": {"total_tokens": 200}
            })))
            .mount(&server)
            .await;

        let summarizer = Summarizer::from_config(&config_for(&server.uri(), 0)).unwrap();
        let summary = summarizer.summarize_post(&post("看好茅台")).await;

        assert_eq!(summary.model_used, "test-model");
        assert_eq!(summary.summary, "Bullish take on Moutai.");
        assert_eq!(summary.sentiment, SentimentLabel::Positive);
        assert_eq!(summary.tickers, vec!["SZ000001", "SH600519"]);
        assert_eq!(summary.companies, vec!["Kweichow Moutai"]);

        let stats = summarizer.statistics();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 0);
        assert_eq!(stats.total_tokens, 200);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"summary\": \"Recovered.\", \"sentiment\": \"neutral\"}"}}],
                "usage": {"total_tokens": 50}
            })))
            .mount(&server)
            .await;

        let summarizer = Summarizer::from_config(&config_for(&server.uri(), 5)).unwrap();
        let summary = summarizer.summarize_post(&post("随便聊聊市场")).await;

        assert_eq!(summary.model_used, "test-model");
        assert_eq!(summary.summary, "Recovered.");
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3, "two failures plus the success");
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let summarizer = Summarizer::from_config(&config_for(&server.uri(), 1)).unwrap();
        let summary = summarizer.summarize_post(&post("市场风险较大，注意回调")).await;

        assert_eq!(summary.model_used, "fallback");
        let stats = summarizer.statistics();
        assert_eq!(stats.failed_requests, 1);
    }

    #[tokio::test]
    async fn unparseable_model_output_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "not json at all"}}]
            })))
            .mount(&server)
            .await;

        let summarizer = Summarizer::from_config(&config_for(&server.uri(), 0)).unwrap();
        let summary = summarizer.summarize_post(&post("看好白酒板块大涨")).await;

        assert_eq!(summary.model_used, "fallback");
        // The request itself succeeded; only parsing failed.
        assert_eq!(summarizer.statistics().successful_requests, 1);
    }

    #[tokio::test]
    async fn batch_returns_one_summary_per_post_in_order() {
        let summarizer = Summarizer::fallback_only();
        let posts: Vec<Post> = (0..5).map(|i| {
            let mut p = post("中性的讨论内容");
            p.id = format!("post-{i}");
            p
        })
        .collect();

        let summaries = summarizer.summarize_posts(&posts).await;
        assert_eq!(summaries.len(), 5);
        for (i, summary) in summaries.iter().enumerate() {
            assert_eq!(summary.post_id, format!("post-{i}"));
        }
    }
}
