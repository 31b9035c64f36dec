//! Multi-tab crawl orchestration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use marketpulse_core::text::{clean_text, extract_stock_symbols, extract_urls, short_content_hash};
use marketpulse_core::{DeduplicationIndex, Post, TabStatistics};

use crate::driver::BrowserDriver;
use crate::error::CrawlError;

/// One tab's worth of freshly collected posts, handed to the saver.
pub type PostBatch = (String, Vec<Post>);

/// Items shorter than this (after cleaning) are not posts.
const MIN_ITEM_LEN: usize = 5;

/// Consecutive no-progress passes tolerated before giving up on a tab.
const MAX_STALE_PASSES: u32 = 5;

/// Crawls tabs through a [`BrowserDriver`], deduplicating against a
/// session-scoped index and bounding cross-tab concurrency.
///
/// Per-item failures are skipped; a tab-level failure is recorded in that
/// tab's [`TabStatistics`] and the tab yields whatever was collected. The
/// whole-run crawl never aborts because one tab failed.
pub struct CrawlOrchestrator {
    driver: Arc<dyn BrowserDriver>,
    session_index: Arc<DeduplicationIndex>,
    max_concurrent_tabs: usize,
    stats: Mutex<HashMap<String, TabStatistics>>,
    batch_tx: Option<mpsc::Sender<PostBatch>>,
}

impl CrawlOrchestrator {
    #[must_use]
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        session_index: Arc<DeduplicationIndex>,
        max_concurrent_tabs: usize,
    ) -> Self {
        Self {
            driver,
            session_index,
            max_concurrent_tabs: max_concurrent_tabs.max(1),
            stats: Mutex::new(HashMap::new()),
            batch_tx: None,
        }
    }

    /// Stream each tab's collected batch into `tx` as the tab completes.
    #[must_use]
    pub fn with_batch_sender(mut self, tx: mpsc::Sender<PostBatch>) -> Self {
        self.batch_tx = Some(tx);
        self
    }

    /// Crawl a single tab, collecting up to `max_posts` valid unique posts.
    ///
    /// Always returns the posts collected so far; tab-level driver failures
    /// are recorded in statistics rather than propagated.
    pub async fn crawl_tab(&self, tab: &str, max_posts: usize) -> Vec<Post> {
        tracing::info!(tab, max_posts, "starting tab crawl");
        let start = Instant::now();
        self.stats
            .lock()
            .expect("stats lock poisoned")
            .insert(tab.to_owned(), TabStatistics::new(tab));

        let mut posts = Vec::new();
        let mut duplicates: u64 = 0;
        if let Err(e) = self
            .collect_tab(tab, max_posts, &mut posts, &mut duplicates)
            .await
        {
            tracing::error!(tab, error = %e, "tab crawl failed, keeping partial result");
            if let Some(stats) = self.stats.lock().expect("stats lock poisoned").get_mut(tab) {
                stats.errors_count += 1;
            }
        }

        if let Some(tx) = &self.batch_tx {
            if !posts.is_empty() && tx.send((tab.to_owned(), posts.clone())).await.is_err() {
                tracing::warn!(tab, "batch receiver dropped, incremental hand-off skipped");
            }
        }

        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            if let Some(entry) = stats.get_mut(tab) {
                entry.total_posts = posts.len() as u64 + duplicates;
                entry.valid_posts = posts.len() as u64;
                entry.duplicate_posts = duplicates;
                entry.crawl_duration_seconds = start.elapsed().as_secs_f64();
                entry.earliest_post = posts.iter().map(|p| p.timestamp).min();
                entry.latest_post = posts.iter().map(|p| p.timestamp).max();
            }
        }

        tracing::info!(
            tab,
            collected = posts.len(),
            duplicates,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "tab crawl complete"
        );
        posts
    }

    /// The scroll/extract loop for one tab.
    ///
    /// Terminates when `max_posts` is reached, the pass cap
    /// (`max_posts/5 + 10`) is hit, or more than [`MAX_STALE_PASSES`]
    /// consecutive passes yield no new valid post.
    async fn collect_tab(
        &self,
        tab: &str,
        max_posts: usize,
        posts: &mut Vec<Post>,
        duplicates: &mut u64,
    ) -> Result<(), CrawlError> {
        self.driver.open_tab(tab).await?;

        let max_passes = max_posts / 5 + 10;
        let mut pass = 0usize;
        let mut stale_passes: u32 = 0;

        while posts.len() < max_posts && pass < max_passes {
            if let Err(e) = self.driver.dismiss_overlays().await {
                tracing::debug!(tab, error = %e, "overlay dismissal failed");
            }

            let items = self.driver.visible_items().await?;
            if items.is_empty() {
                tracing::warn!(tab, pass, "no items visible");
            }

            let before = posts.len();
            for raw in items {
                if posts.len() >= max_posts {
                    break;
                }
                if let Some(post) = self.build_post(tab, &raw, duplicates) {
                    posts.push(post);
                }
            }

            self.driver.scroll().await?;

            if posts.len() == before {
                stale_passes += 1;
                tracing::debug!(tab, stale_passes, "no new posts this pass");
                if stale_passes > MAX_STALE_PASSES {
                    tracing::info!(tab, "end of feed or blocked, stopping tab");
                    break;
                }
            } else {
                stale_passes = 0;
            }

            pass += 1;
            tracing::debug!(tab, pass, collected = posts.len(), "pass complete");
        }
        Ok(())
    }

    /// Turn one raw extracted item into a validated [`Post`].
    ///
    /// Returns `None` for items that are too short, already seen this
    /// session, or invalid after construction.
    fn build_post(&self, tab: &str, raw: &str, duplicates: &mut u64) -> Option<Post> {
        let text = clean_text(raw);
        if text.chars().count() < MIN_ITEM_LEN {
            return None;
        }

        // Session dedup key: short hash of the cleaned item text. The store
        // separately dedups on the full (text, author, tab) content hash.
        let key = short_content_hash(&[&text]);
        if !self.session_index.check_and_mark(&key) {
            *duplicates += 1;
            return None;
        }

        let post = Post {
            id: key,
            symbols: extract_stock_symbols(&text),
            urls: extract_urls(&text),
            text,
            html: String::new(),
            timestamp: Utc::now(),
            tab: tab.to_owned(),
            author: None,
            author_id: None,
            author_verified: false,
            like_count: 0,
            comment_count: 0,
            retweet_count: 0,
            view_count: 0,
            images: vec![],
            post_url: None,
            created_at: None,
            source: None,
        };
        post.is_valid().then_some(post)
    }

    /// Crawl all tabs with at most `max_concurrent_tabs` in flight.
    ///
    /// The result map carries every requested tab; failed tabs map to their
    /// partial (possibly empty) collections. Completion order is not
    /// input order.
    pub async fn crawl_tabs(
        &self,
        tabs: &[String],
        max_posts_per_tab: usize,
    ) -> HashMap<String, Vec<Post>> {
        tracing::info!(tab_count = tabs.len(), "starting concurrent crawl");

        let results: Vec<(String, Vec<Post>)> = stream::iter(tabs)
            .map(|tab| async move { (tab.clone(), self.crawl_tab(tab, max_posts_per_tab).await) })
            .buffer_unordered(self.max_concurrent_tabs)
            .collect()
            .await;

        let by_tab: HashMap<String, Vec<Post>> = results.into_iter().collect();
        let total: usize = by_tab.values().map(Vec::len).sum();
        tracing::info!(
            total_posts = total,
            tab_count = by_tab.len(),
            "concurrent crawl complete"
        );
        by_tab
    }

    /// Snapshot of per-tab statistics collected so far.
    ///
    /// # Panics
    ///
    /// Panics if the statistics lock is poisoned.
    #[must_use]
    pub fn statistics(&self) -> HashMap<String, TabStatistics> {
        self.stats.lock().expect("stats lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ScriptedDriver;
    use async_trait::async_trait;

    fn orchestrator(driver: Arc<dyn BrowserDriver>) -> CrawlOrchestrator {
        CrawlOrchestrator::new(driver, Arc::new(DeduplicationIndex::new()), 2)
    }

    fn items(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| (*t).to_string()).collect()
    }

    #[tokio::test]
    async fn stub_feed_yields_valid_unique_posts() {
        let driver = Arc::new(ScriptedDriver::repeating(items(&[
            "贵州茅台大涨，看好白酒板块",
            "半导体芯片风险加大，建议观望",
            "$AAPL$ is going up!",
            "新能源车销量增长超预期",
            "银行股横盘震荡，等待方向",
        ])));
        let orch = orchestrator(driver);
        let posts = orch.crawl_tab("热门", 5).await;

        assert_eq!(posts.len(), 5);
        assert!(posts.iter().all(|p| p.is_valid()));
        assert!(posts.iter().all(|p| p.tab == "热门"));

        let mut hashes: Vec<String> = posts.iter().map(Post::content_hash).collect();
        hashes.sort();
        hashes.dedup();
        assert_eq!(hashes.len(), 5, "content hashes must be unique");
    }

    #[tokio::test]
    async fn repeated_items_within_one_crawl_are_deduplicated() {
        let driver = Arc::new(ScriptedDriver::new(vec![
            items(&["第一条讨论内容", "第二条讨论内容"]),
            items(&["第一条讨论内容", "第二条讨论内容", "第三条讨论内容"]),
            Vec::new(),
        ]));
        let orch = orchestrator(driver);
        let posts = orch.crawl_tab("7x24", 10).await;

        assert_eq!(posts.len(), 3);
        let stats = orch.statistics();
        let tab_stats = stats.get("7x24").expect("stats recorded");
        assert_eq!(tab_stats.valid_posts, 3);
        assert_eq!(tab_stats.duplicate_posts, 2);
    }

    #[tokio::test]
    async fn symbols_extracted_into_posts() {
        let driver = Arc::new(ScriptedDriver::repeating(items(&["$AAPL$ is going up!"])));
        let orch = orchestrator(driver);
        let posts = orch.crawl_tab("热门", 1).await;
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].symbols, vec!["AAPL"]);
    }

    #[tokio::test]
    async fn stale_feed_terminates_early() {
        // One pass of content, then nothing new forever.
        let driver = Arc::new(ScriptedDriver::repeating(items(&[
            "只有这一条有效的讨论内容",
        ])));
        let orch = orchestrator(driver);
        let posts = orch.crawl_tab("热门", 100).await;
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn pass_cap_bounds_sparse_feeds() {
        // A feed that trickles one new item per pass never goes stale, so
        // the pass cap (max_posts/5 + 10) is what stops it.
        let passes: Vec<Vec<String>> = (0..60)
            .map(|i| vec![format!("第{i}条独立的讨论内容，足够长")])
            .collect();
        let driver = Arc::new(ScriptedDriver::new(passes));
        let orch = orchestrator(driver);
        let posts = orch.crawl_tab("热门", 100).await;
        assert_eq!(posts.len(), 100 / 5 + 10);
    }

    #[tokio::test]
    async fn short_items_are_skipped() {
        let driver = Arc::new(ScriptedDriver::repeating(items(&[
            "ok",
            "这条内容足够长可以入选",
        ])));
        let orch = orchestrator(driver);
        let posts = orch.crawl_tab("热门", 10).await;
        assert_eq!(posts.len(), 1);
    }

    struct FailingDriver {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl BrowserDriver for FailingDriver {
        async fn open_tab(&self, _tab: &str) -> Result<(), CrawlError> {
            Ok(())
        }

        async fn visible_items(&self) -> Result<Vec<String>, CrawlError> {
            let mut calls = self.calls.lock().expect("calls lock poisoned");
            *calls += 1;
            if *calls == 1 {
                Ok(vec!["崩盘前抢救出来的唯一一条".to_owned()])
            } else {
                Err(CrawlError::Driver("browser session died".to_owned()))
            }
        }

        async fn scroll(&self) -> Result<(), CrawlError> {
            Ok(())
        }

        async fn dismiss_overlays(&self) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn driver_failure_keeps_partial_result_and_records_error() {
        let driver = Arc::new(FailingDriver {
            calls: Mutex::new(0),
        });
        let orch = orchestrator(driver);
        let posts = orch.crawl_tab("热门", 10).await;

        assert_eq!(posts.len(), 1, "partial result must survive the failure");
        let stats = orch.statistics();
        assert_eq!(stats.get("热门").expect("stats recorded").errors_count, 1);
    }

    #[tokio::test]
    async fn completed_batches_are_sent_to_the_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let driver = Arc::new(ScriptedDriver::repeating(items(&[
            "第一条足够长的讨论内容",
            "第二条足够长的讨论内容",
        ])));
        let orch = CrawlOrchestrator::new(driver, Arc::new(DeduplicationIndex::new()), 1)
            .with_batch_sender(tx);

        let posts = orch.crawl_tab("基金", 10).await;
        assert_eq!(posts.len(), 2);

        let (tab, batch) = rx.recv().await.expect("batch delivered");
        assert_eq!(tab, "基金");
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn crawl_tabs_returns_every_requested_tab() {
        let driver = Arc::new(ScriptedDriver::repeating(items(&[
            "各个分栏共享的讨论内容一",
            "各个分栏共享的讨论内容二",
        ])));
        let orch = orchestrator(driver);
        let tabs = vec!["热门".to_owned(), "7x24".to_owned(), "基金".to_owned()];
        let by_tab = orch.crawl_tabs(&tabs, 10).await;

        assert_eq!(by_tab.len(), 3);
        for tab in &tabs {
            assert!(by_tab.contains_key(tab), "missing tab {tab}");
        }
        // The session index spans tabs: the same text appearing in a second
        // tab is a duplicate.
        let total: usize = by_tab.values().map(Vec::len).sum();
        assert_eq!(total, 2);
    }
}
