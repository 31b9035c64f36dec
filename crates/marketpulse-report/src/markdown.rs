//! Markdown rendering of a [`CrawlReport`].
//!
//! Section order is fixed: header, executive summary, key discussion points,
//! stock table, sentiment distribution, theme deep-dives, verbatim
//! discussions, collection statistics, detailed stock analysis, footer.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use marketpulse_core::{CrawlReport, SentimentLabel};

const KEY_POINTS_LIMIT: usize = 10;
const STOCK_TABLE_LIMIT: usize = 20;
const THEME_DETAIL_LIMIT: usize = 15;
const DISCUSSION_LIMIT: usize = 10;
const DETAILED_STOCK_LIMIT: usize = 10;
const BAR_WIDTH: u64 = 20;

fn sentiment_emoji(label: SentimentLabel) -> &'static str {
    match label {
        SentimentLabel::Positive => "📈",
        SentimentLabel::Negative => "📉",
        SentimentLabel::Neutral => "➡️",
        SentimentLabel::Unknown => "❓",
    }
}

fn trend_emoji(direction: &str) -> &'static str {
    match direction {
        "up" => "🔺",
        "down" => "🔻",
        _ => "▪️",
    }
}

fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn format_timestamp(dt: Option<DateTime<Utc>>) -> String {
    dt.unwrap_or_else(Utc::now)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_owned()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// Render the full markdown report.
#[must_use]
#[allow(clippy::too_many_lines, clippy::cast_precision_loss)]
pub fn render(report: &CrawlReport) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# Investor Discussion Report — {}", report.job_name);
    md.push('\n');
    let _ = writeln!(md, "**Generated:** {}", format_timestamp(report.job_end));
    let _ = writeln!(
        md,
        "**Total Posts Collected:** {}",
        format_number(report.total_posts_collected)
    );
    let _ = writeln!(
        md,
        "**Unique Posts:** {}",
        format_number(report.total_unique_posts)
    );
    let _ = writeln!(
        md,
        "**Posts Summarized:** {}",
        format_number(report.total_posts_summarized)
    );
    md.push_str("\n## Executive Summary\n\n");

    let sentiment = &report.overall_sentiment;
    let total = sentiment.total();
    if total > 0 {
        let pos_pct = sentiment.positive as f64 / total as f64 * 100.0;
        let neg_pct = sentiment.negative as f64 / total as f64 * 100.0;
        let neu_pct = sentiment.neutral as f64 / total as f64 * 100.0;
        let mood = if sentiment.positive > sentiment.negative {
            "bullish"
        } else if sentiment.negative > sentiment.positive {
            "bearish"
        } else {
            "mixed"
        };
        let _ = writeln!(
            md,
            "Overall market sentiment is **{mood}** with {pos_pct:.1}% positive, \
             {neg_pct:.1}% negative, and {neu_pct:.1}% neutral discussions."
        );
    }
    md.push('\n');

    md.push_str("## Key Discussion Points\n\n");
    for (i, theme) in report.theme_analysis.iter().take(KEY_POINTS_LIMIT).enumerate() {
        let emoji = match theme.trend_direction.as_str() {
            "up" => sentiment_emoji(SentimentLabel::Positive),
            "down" => sentiment_emoji(SentimentLabel::Negative),
            _ => sentiment_emoji(SentimentLabel::Neutral),
        };
        let _ = writeln!(
            md,
            "{}. **{}** ({} mentions) {emoji}",
            i + 1,
            theme.theme,
            theme.mention_count
        );
        if let Some(quote) = theme.representative_quotes.first() {
            let _ = writeln!(md, "   - *\"{}\"*", truncate(quote, 100));
        }
    }
    md.push('\n');

    md.push_str("## Most Discussed Stocks\n\n");
    md.push_str("| Rank | Symbol | Mentions | Sentiment | Bullish | Bearish | Neutral |\n");
    md.push_str("|------|--------|----------|-----------|---------|---------|---------|\n");
    for (i, stock) in report.stock_mentions.iter().take(STOCK_TABLE_LIMIT).enumerate() {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} |",
            i + 1,
            stock.symbol,
            stock.mention_count,
            sentiment_emoji(stock.overall_sentiment()),
            stock.positive_mentions,
            stock.negative_mentions,
            stock.neutral_mentions
        );
    }
    md.push('\n');

    md.push_str("## Sentiment Distribution\n\n");
    let _ = writeln!(md, "📈 **Positive:** {} posts", sentiment.positive);
    let _ = writeln!(md, "➡️ **Neutral:** {} posts", sentiment.neutral);
    let _ = writeln!(md, "📉 **Negative:** {} posts", sentiment.negative);
    md.push('\n');

    md.push_str("## Investment Themes & Sectors\n\n");
    for theme in report.theme_analysis.iter().take(THEME_DETAIL_LIMIT) {
        let _ = writeln!(md, "### {} {}", theme.theme, trend_emoji(&theme.trend_direction));
        let _ = writeln!(md, "- **Mentions:** {}", theme.mention_count);
        if !theme.related_stocks.is_empty() {
            let stocks: Vec<&str> = theme
                .related_stocks
                .iter()
                .take(5)
                .map(String::as_str)
                .collect();
            let _ = writeln!(md, "- **Related Stocks:** {}", stocks.join(", "));
        }
        let _ = writeln!(
            md,
            "- **Sentiment:** Positive {}, Negative {}, Neutral {}",
            theme.sentiment.positive, theme.sentiment.negative, theme.sentiment.neutral
        );
        md.push('\n');
    }

    md.push_str("## Representative Discussions (Verbatim Quotes)\n\n");
    for (i, discussion) in report.top_discussions.iter().take(DISCUSSION_LIMIT).enumerate() {
        let _ = writeln!(md, "### Discussion #{}", i + 1);
        let _ = writeln!(
            md,
            "**Tab:** {} | **Author:** {}",
            discussion.tab,
            discussion.author.as_deref().unwrap_or("Anonymous")
        );
        if !discussion.symbols.is_empty() {
            let _ = writeln!(md, "**Stocks Mentioned:** {}", discussion.symbols.join(", "));
        }
        if let Some(sentiment) = discussion.sentiment {
            let _ = writeln!(md, "**Sentiment:** {sentiment}");
        }
        md.push('\n');
        let _ = writeln!(md, "> {}", discussion.text);
        md.push('\n');
        let _ = writeln!(
            md,
            "*👍 {} | 💬 {} | 🔄 {}*",
            discussion.likes, discussion.comments, discussion.retweets
        );
        if let Some(url) = &discussion.url {
            let _ = writeln!(md, "[View Original]({url})");
        }
        md.push_str("\n---\n\n");
    }

    md.push_str("## Data Collection Statistics\n\n");
    md.push_str("| Tab | Posts | Duration (s) | Errors |\n");
    md.push_str("|-----|-------|--------------|--------|\n");
    for (tab_name, stats) in &report.tab_statistics {
        let _ = writeln!(
            md,
            "| {} | {} | {:.1} | {} |",
            tab_name, stats.valid_posts, stats.crawl_duration_seconds, stats.errors_count
        );
    }
    md.push('\n');

    md.push_str("## Detailed Stock Analysis\n\n");
    for stock in report.stock_mentions.iter().take(DETAILED_STOCK_LIMIT) {
        let _ = writeln!(md, "### {}", stock.symbol);
        let _ = writeln!(md, "**Total Mentions:** {}", stock.mention_count);
        let _ = writeln!(
            md,
            "**Sentiment Ratio:** {:.1}% bullish",
            stock.sentiment_ratio() * 100.0
        );
        md.push('\n');
        let total = stock.positive_mentions + stock.negative_mentions + stock.neutral_mentions;
        if total > 0 {
            md.push_str("```\n");
            let _ = writeln!(
                md,
                "Bullish:  {} ({})",
                bar(stock.positive_mentions, total),
                stock.positive_mentions
            );
            let _ = writeln!(
                md,
                "Bearish:  {} ({})",
                bar(stock.negative_mentions, total),
                stock.negative_mentions
            );
            let _ = writeln!(
                md,
                "Neutral:  {} ({})",
                bar(stock.neutral_mentions, total),
                stock.neutral_mentions
            );
            md.push_str("```\n");
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str("*Report generated by the investor discussion crawler*\n");
    let _ = writeln!(
        md,
        "*Data collected on {}*",
        format_timestamp(report.job_end)
    );

    md
}

#[allow(clippy::cast_possible_truncation)]
fn bar(count: u64, total: u64) -> String {
    let width = (count * BAR_WIDTH / total) as usize;
    "█".repeat(width)
}
