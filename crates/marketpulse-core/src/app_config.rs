use std::path::PathBuf;

/// Runtime configuration for one crawl job, assembled from environment
/// variables by [`crate::config::load_app_config`].
#[derive(Clone)]
pub struct AppConfig {
    /// Job identifier; also the per-job storage directory name.
    pub job_name: String,
    pub log_level: String,

    // Crawler
    pub crawler_max_posts_per_tab: usize,
    pub crawler_max_concurrent_tabs: usize,
    /// Base URL of the browserless rendering service.
    pub browser_base_url: String,
    pub browser_token: Option<String>,
    /// Feed page rendered for every tab.
    pub browser_feed_url: String,

    // LLM enrichment
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f64,
    pub llm_requests_per_minute: u32,
    pub llm_max_concurrent_requests: usize,
    pub llm_retry_attempts: u32,
    pub llm_retry_backoff_base_ms: u64,
    pub llm_request_timeout_secs: u64,

    // Storage
    pub storage_base_dir: PathBuf,
    pub storage_save_interval_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("job_name", &self.job_name)
            .field("log_level", &self.log_level)
            .field("crawler_max_posts_per_tab", &self.crawler_max_posts_per_tab)
            .field(
                "crawler_max_concurrent_tabs",
                &self.crawler_max_concurrent_tabs,
            )
            .field("browser_base_url", &self.browser_base_url)
            .field("browser_token", &self.browser_token.as_ref().map(|_| "[redacted]"))
            .field("browser_feed_url", &self.browser_feed_url)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "[redacted]"))
            .field("llm_api_base_url", &self.llm_api_base_url)
            .field("llm_model_name", &self.llm_model_name)
            .field("llm_max_tokens", &self.llm_max_tokens)
            .field("llm_temperature", &self.llm_temperature)
            .field("llm_requests_per_minute", &self.llm_requests_per_minute)
            .field(
                "llm_max_concurrent_requests",
                &self.llm_max_concurrent_requests,
            )
            .field("llm_retry_attempts", &self.llm_retry_attempts)
            .field("llm_retry_backoff_base_ms", &self.llm_retry_backoff_base_ms)
            .field("llm_request_timeout_secs", &self.llm_request_timeout_secs)
            .field("storage_base_dir", &self.storage_base_dir)
            .field("storage_save_interval_secs", &self.storage_save_interval_secs)
            .finish()
    }
}

impl AppConfig {
    /// Per-job storage root: `<base_dir>/<job_name>`.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.storage_base_dir.join(&self.job_name)
    }
}
