//! Aggregation of posts and summaries into a [`CrawlReport`].
//!
//! Everything here is deterministic: accumulation order is first-seen (over
//! tabs in sorted order), and all rankings use stable sorts, so equal-count
//! entries keep their first-seen order and the same input always produces
//! the same report.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use marketpulse_core::{
    CrawlReport, Post, PostSummary, SentimentCounts, SentimentLabel, StockMention, TabStatistics,
    ThemeAnalysis, TopDiscussion,
};

const TOP_DISCUSSIONS_LIMIT: usize = 10;
const SAMPLE_POST_IDS_LIMIT: usize = 5;
const REPRESENTATIVE_QUOTES_LIMIT: usize = 3;

#[derive(Default)]
struct StockAcc {
    count: u64,
    positive: u64,
    neutral: u64,
    negative: u64,
    post_ids: Vec<String>,
    companies: Vec<String>,
}

#[derive(Default)]
struct ThemeAcc {
    count: u64,
    stocks: Vec<String>,
    sentiment: SentimentCounts,
    quotes: Vec<String>,
}

/// Accumulator map preserving first insertion order.
struct OrderedAcc<T> {
    index: HashMap<String, usize>,
    entries: Vec<(String, T)>,
}

impl<T: Default> OrderedAcc<T> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn get_mut(&mut self, key: &str) -> &mut T {
        if let Some(&i) = self.index.get(key) {
            &mut self.entries[i].1
        } else {
            self.index.insert(key.to_owned(), self.entries.len());
            self.entries.push((key.to_owned(), T::default()));
            &mut self.entries.last_mut().expect("just pushed").1
        }
    }
}

/// Per-symbol mention counts with sentiment taken from each post's summary
/// (posts without a summary count as neutral). Sorted by mention count,
/// descending.
#[must_use]
pub fn aggregate_stock_mentions(posts: &[Post], summaries: &[PostSummary]) -> Vec<StockMention> {
    let summary_map: HashMap<&str, &PostSummary> =
        summaries.iter().map(|s| (s.post_id.as_str(), s)).collect();

    let mut acc: OrderedAcc<StockAcc> = OrderedAcc::new();
    for post in posts {
        let summary = summary_map.get(post.id.as_str());
        let sentiment = summary.map_or(SentimentLabel::Neutral, |s| s.sentiment);

        let mut seen_in_post = HashSet::new();
        for symbol in &post.symbols {
            if !seen_in_post.insert(symbol.as_str()) {
                continue;
            }
            let entry = acc.get_mut(symbol);
            entry.count += 1;
            entry.post_ids.push(post.id.clone());
            match sentiment {
                SentimentLabel::Positive => entry.positive += 1,
                SentimentLabel::Negative => entry.negative += 1,
                SentimentLabel::Neutral | SentimentLabel::Unknown => entry.neutral += 1,
            }
            if let Some(s) = summary {
                entry.companies.extend(s.companies.iter().cloned());
            }
        }
    }

    let mut mentions: Vec<StockMention> = acc
        .entries
        .into_iter()
        .map(|(symbol, data)| StockMention {
            symbol,
            name: most_common(&data.companies),
            mention_count: data.count,
            positive_mentions: data.positive,
            neutral_mentions: data.neutral,
            negative_mentions: data.negative,
            sample_post_ids: data
                .post_ids
                .into_iter()
                .take(SAMPLE_POST_IDS_LIMIT)
                .collect(),
        })
        .collect();
    mentions.sort_by(|a, b| b.mention_count.cmp(&a.mention_count));
    mentions
}

/// The most frequent value, first-seen winning ties.
fn most_common(values: &[String]) -> Option<String> {
    let mut counts: OrderedAcc<u64> = OrderedAcc::new();
    for value in values {
        *counts.get_mut(value) += 1;
    }
    let mut best: Option<(String, u64)> = None;
    for (value, count) in counts.entries {
        match &best {
            Some((_, best_count)) if *best_count >= count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value)
}

/// Per-theme aggregates over the union of each summary's themes and sectors.
/// Sorted by mention count, descending.
#[must_use]
pub fn aggregate_themes(summaries: &[PostSummary]) -> Vec<ThemeAnalysis> {
    let mut acc: OrderedAcc<ThemeAcc> = OrderedAcc::new();
    for summary in summaries {
        for theme in summary.themes.iter().chain(&summary.sectors) {
            let entry = acc.get_mut(theme);
            entry.count += 1;
            for ticker in &summary.tickers {
                if !entry.stocks.contains(ticker) {
                    entry.stocks.push(ticker.clone());
                }
            }
            entry.sentiment.record(summary.sentiment);
            if entry.quotes.len() < REPRESENTATIVE_QUOTES_LIMIT {
                entry.quotes.push(summary.original_text_preview.clone());
            }
        }
    }

    let mut analyses: Vec<ThemeAnalysis> = acc
        .entries
        .into_iter()
        .map(|(theme, data)| {
            let trend = trend_direction(&data.sentiment);
            ThemeAnalysis {
                theme,
                mention_count: data.count,
                related_stocks: data.stocks,
                sentiment: data.sentiment,
                representative_quotes: data.quotes,
                trend_direction: trend,
            }
        })
        .collect();
    analyses.sort_by(|a, b| b.mention_count.cmp(&a.mention_count));
    analyses
}

/// `"up"` when positive exceeds negative by more than ×1.5, `"down"` for the
/// inverse, `"stable"` otherwise.
#[allow(clippy::cast_precision_loss)]
fn trend_direction(sentiment: &SentimentCounts) -> String {
    if sentiment.positive as f64 > sentiment.negative as f64 * 1.5 {
        "up".to_owned()
    } else if sentiment.negative as f64 > sentiment.positive as f64 * 1.5 {
        "down".to_owned()
    } else {
        "stable".to_owned()
    }
}

#[must_use]
pub fn overall_sentiment(summaries: &[PostSummary]) -> SentimentCounts {
    let mut counts = SentimentCounts::default();
    for summary in summaries {
        counts.record(summary.sentiment);
    }
    counts
}

/// The most engaged posts, ranked by `likes + comments×2 + retweets×3`.
#[must_use]
pub fn top_discussions(posts: &[Post], summaries: &[PostSummary]) -> Vec<TopDiscussion> {
    let summary_map: HashMap<&str, &PostSummary> =
        summaries.iter().map(|s| (s.post_id.as_str(), s)).collect();

    let mut ranked: Vec<&Post> = posts.iter().collect();
    ranked.sort_by(|a, b| b.engagement_score().cmp(&a.engagement_score()));

    ranked
        .into_iter()
        .take(TOP_DISCUSSIONS_LIMIT)
        .map(|post| {
            let summary = summary_map.get(post.id.as_str());
            TopDiscussion {
                id: post.id.clone(),
                tab: post.tab.clone(),
                text: post.text.clone(),
                author: post.author.clone(),
                symbols: post.symbols.clone(),
                likes: post.like_count,
                comments: post.comment_count,
                retweets: post.retweet_count,
                url: post.post_url.clone(),
                sentiment: summary.map(|s| s.sentiment),
                summary: summary.map(|s| s.summary.clone()),
            }
        })
        .collect()
}

/// Build the whole-run report. Tabs are processed in sorted order so the
/// flattened post/summary streams are stable across runs.
#[must_use]
pub fn build_report(
    job_name: &str,
    job_start: DateTime<Utc>,
    posts_by_tab: &HashMap<String, Vec<Post>>,
    summaries_by_tab: &HashMap<String, Vec<PostSummary>>,
    tab_statistics: BTreeMap<String, TabStatistics>,
) -> CrawlReport {
    let mut tabs: Vec<&String> = posts_by_tab.keys().collect();
    tabs.sort();

    let all_posts: Vec<Post> = tabs
        .iter()
        .flat_map(|tab| posts_by_tab[*tab].iter().cloned())
        .collect();

    let mut summary_tabs: Vec<&String> = summaries_by_tab.keys().collect();
    summary_tabs.sort();
    let all_summaries: Vec<PostSummary> = summary_tabs
        .iter()
        .flat_map(|tab| summaries_by_tab[*tab].iter().cloned())
        .collect();

    let unique_hashes: HashSet<String> = all_posts.iter().map(Post::content_hash).collect();

    tracing::info!(
        posts = all_posts.len(),
        unique = unique_hashes.len(),
        summaries = all_summaries.len(),
        "building report"
    );

    CrawlReport {
        job_name: job_name.to_owned(),
        job_start,
        job_end: Some(Utc::now()),
        total_posts_collected: all_posts.len() as u64,
        total_unique_posts: unique_hashes.len() as u64,
        total_posts_summarized: all_summaries.len() as u64,
        tab_statistics,
        stock_mentions: aggregate_stock_mentions(&all_posts, &all_summaries),
        theme_analysis: aggregate_themes(&all_summaries),
        overall_sentiment: overall_sentiment(&all_summaries),
        top_discussions: top_discussions(&all_posts, &all_summaries),
        errors: Vec::new(),
        warnings: Vec::new(),
    }
}
