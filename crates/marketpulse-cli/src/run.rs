//! The end-to-end pipeline: crawl, enrich, persist, report.
//!
//! Crawled batches stream through an mpsc channel into the incremental saver
//! while tabs are still being crawled, so a crash mid-run leaves the
//! already-collected posts on disk. Per-tab failures never abort the run;
//! they surface in the report's error list instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use marketpulse_core::{AppConfig, DeduplicationIndex, PostSummary, TabStatistics};
use marketpulse_crawler::{BrowserlessDriver, CrawlOrchestrator};
use marketpulse_enrich::Summarizer;
use marketpulse_report::{build_report, render};
use marketpulse_store::{FileStore, IncrementalSaver};

const BROWSER_REQUEST_TIMEOUT_SECS: u64 = 60;
const BATCH_CHANNEL_CAPACITY: usize = 32;

pub(crate) async fn run_pipeline(
    config: AppConfig,
    tabs: Vec<String>,
    no_llm: bool,
) -> anyhow::Result<()> {
    let job_start = Utc::now();
    tracing::info!(
        job_name = %config.job_name,
        tabs = tabs.len(),
        max_posts = config.crawler_max_posts_per_tab,
        "starting crawl job"
    );

    let store = Arc::new(FileStore::open(&config.storage_base_dir, &config.job_name)?);
    let saver = IncrementalSaver::new(Arc::clone(&store));
    let saver_handle = saver.start(Duration::from_secs(config.storage_save_interval_secs));

    let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
    let drain = saver.drain_batches(batch_rx);

    let driver = Arc::new(BrowserlessDriver::new(
        &config.browser_base_url,
        config.browser_token.as_deref(),
        &config.browser_feed_url,
        BROWSER_REQUEST_TIMEOUT_SECS,
    )?);
    let orchestrator = CrawlOrchestrator::new(
        driver,
        Arc::new(DeduplicationIndex::new()),
        config.crawler_max_concurrent_tabs,
    )
    .with_batch_sender(batch_tx);

    let posts_by_tab = orchestrator
        .crawl_tabs(&tabs, config.crawler_max_posts_per_tab)
        .await;
    let crawl_stats = orchestrator.statistics();
    drop(orchestrator);
    drain.await?;

    let total_posts: usize = posts_by_tab.values().map(Vec::len).sum();
    println!(
        "Collected {total_posts} posts from {} tabs",
        posts_by_tab.len()
    );

    let summarizer = if no_llm {
        tracing::info!("LLM summarization disabled, using keyword analysis");
        Summarizer::fallback_only()
    } else {
        Summarizer::from_config(&config)?
    };

    let mut summaries_by_tab: HashMap<String, Vec<PostSummary>> = HashMap::new();
    let mut sorted_tabs: Vec<&String> = posts_by_tab.keys().collect();
    sorted_tabs.sort();
    for tab in sorted_tabs {
        let posts = &posts_by_tab[tab];
        if posts.is_empty() {
            continue;
        }
        tracing::info!(tab = %tab, posts = posts.len(), "summarizing tab");
        let summaries = summarizer.summarize_posts(posts).await;
        saver.add_summaries(tab, summaries.clone()).await;
        summaries_by_tab.insert(tab.clone(), summaries);
    }

    let enrich_stats = summarizer.statistics();
    tracing::info!(
        total_requests = enrich_stats.total_requests,
        successful = enrich_stats.successful_requests,
        failed = enrich_stats.failed_requests,
        total_tokens = enrich_stats.total_tokens,
        "enrichment finished"
    );

    saver_handle.stop().await;

    let mut tab_statistics: BTreeMap<_, _> = crawl_stats.into_iter().collect();
    for (tab, stats) in &mut tab_statistics {
        if let Some(summaries) = summaries_by_tab.get(tab) {
            finalize_tab_stats(stats, summaries);
        }
    }
    let mut report = build_report(
        &config.job_name,
        job_start,
        &posts_by_tab,
        &summaries_by_tab,
        tab_statistics,
    );
    for stats in report.tab_statistics.values() {
        if stats.errors_count > 0 {
            report.errors.push(format!(
                "tab '{}' hit {} error(s) during crawling",
                stats.tab_name, stats.errors_count
            ));
        }
    }

    let markdown = render(&report);
    let report_path = store.save_report(&markdown).await?;
    store.save_report_snapshot(&report).await?;

    println!(
        "Report written to {} ({} unique posts, {} summarized)",
        report_path.display(),
        report.total_unique_posts,
        report.total_posts_summarized
    );
    Ok(())
}

const TOP_PER_TAB: usize = 5;

/// Fill the sentiment tally and top stocks/themes a tab's statistics carry
/// into the report snapshot.
fn finalize_tab_stats(stats: &mut TabStatistics, summaries: &[PostSummary]) {
    let mut stocks: Vec<(String, u64)> = Vec::new();
    let mut themes: Vec<(String, u64)> = Vec::new();
    for summary in summaries {
        stats.sentiment.record(summary.sentiment);
        for ticker in &summary.tickers {
            bump(&mut stocks, ticker);
        }
        for theme in summary.themes.iter().chain(&summary.sectors) {
            bump(&mut themes, theme);
        }
    }
    stocks.sort_by(|a, b| b.1.cmp(&a.1));
    themes.sort_by(|a, b| b.1.cmp(&a.1));
    stats.top_stocks = stocks.into_iter().take(TOP_PER_TAB).map(|(s, _)| s).collect();
    stats.top_themes = themes.into_iter().take(TOP_PER_TAB).map(|(t, _)| t).collect();
}

fn bump(counts: &mut Vec<(String, u64)>, key: &str) {
    if let Some(entry) = counts.iter_mut().find(|(k, _)| k == key) {
        entry.1 += 1;
    } else {
        counts.push((key.to_owned(), 1));
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use marketpulse_core::SentimentLabel;

    use super::*;

    fn summary(post_id: &str, sentiment: SentimentLabel, tickers: &[&str]) -> PostSummary {
        PostSummary {
            post_id: post_id.to_owned(),
            post_hash: String::new(),
            tab: "热门".to_owned(),
            summary: String::new(),
            key_points: vec![],
            tickers: tickers.iter().map(|t| (*t).to_owned()).collect(),
            companies: vec![],
            themes: vec!["AI".to_owned()],
            sectors: vec![],
            sentiment,
            sentiment_score: 0.0,
            sentiment_reasoning: None,
            processed_at: Utc::now(),
            model_used: "test".to_owned(),
            processing_time_ms: 0,
            original_text_preview: String::new(),
        }
    }

    #[test]
    fn tab_stats_pick_up_sentiment_and_rankings() {
        let mut stats = TabStatistics::new("热门");
        let summaries = vec![
            summary("a", SentimentLabel::Positive, &["SH600519", "SZ000001"]),
            summary("b", SentimentLabel::Positive, &["SH600519"]),
            summary("c", SentimentLabel::Negative, &[]),
        ];
        finalize_tab_stats(&mut stats, &summaries);

        assert_eq!(stats.sentiment.positive, 2);
        assert_eq!(stats.sentiment.negative, 1);
        assert_eq!(stats.top_stocks[0], "SH600519");
        assert_eq!(stats.top_themes, vec!["AI"]);
    }
}
