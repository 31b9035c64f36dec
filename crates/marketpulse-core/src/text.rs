//! Stateless text analysis helpers: cleaning, hashing, symbol/URL
//! extraction, and keyword-based sentiment/sector classification.

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::SentimentLabel;

/// Keywords signalling bullish discussion. Matched as substrings of the
/// lowercased text.
const POSITIVE_KEYWORDS: &[&str] = &[
    "涨", "利好", "牛", "买入", "看好", "上涨", "增长", "突破", "强势", "机会", "潜力", "推荐",
    "优质", "龙头", "翻倍", "大涨", "暴涨", "飙升", "新高", "向上",
];

/// Keywords signalling bearish discussion.
const NEGATIVE_KEYWORDS: &[&str] = &[
    "跌", "利空", "熊", "卖出", "看空", "下跌", "亏损", "暴跌", "弱势", "风险", "警惕", "减持",
    "抛售", "崩盘", "破位", "大跌", "腰斩", "暴雷", "爆仓", "向下",
];

/// Keywords signalling wait-and-see discussion.
const NEUTRAL_KEYWORDS: &[&str] = &[
    "观望", "持有", "震荡", "盘整", "横盘", "等待", "中性", "不确定", "维持", "稳定",
];

/// Sector names and the keywords that map discussion text onto them.
const SECTOR_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Technology",
        &["芯片", "半导体", "AI", "人工智能", "算力", "云计算", "软件", "互联网"],
    ),
    (
        "New Energy",
        &["锂电", "光伏", "储能", "新能源车", "电池", "充电桩", "风电"],
    ),
    (
        "Healthcare",
        &["医药", "生物", "创新药", "医疗", "疫苗", "CXO", "中药"],
    ),
    (
        "Consumer",
        &["白酒", "消费", "零售", "食品", "家电", "餐饮", "旅游"],
    ),
    (
        "Finance",
        &["银行", "证券", "保险", "券商", "金融", "基金"],
    ),
    ("Real Estate", &["房地产", "地产", "楼市", "房价", "物业"]),
    (
        "Manufacturing",
        &["制造", "工业", "机械", "汽车", "钢铁", "有色"],
    ),
];

/// Hex-encoded SHA-256 over the colon-joined parts.
///
/// Used for content deduplication; the first 16 hex chars serve as the
/// short session-dedup key and assigned post id.
#[must_use]
pub fn generate_content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b":");
        }
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Short 16-char form of [`generate_content_hash`].
#[must_use]
pub fn short_content_hash(parts: &[&str]) -> String {
    let mut h = generate_content_hash(parts);
    h.truncate(16);
    h
}

/// Strip HTML tags and control characters and collapse whitespace.
#[must_use]
pub fn clean_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let tags = Regex::new(r"<[^>]+>").expect("valid tags regex");
    let stripped = tags.replace_all(text, "");
    let no_control: String = stripped
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    let ws = Regex::new(r"\s+").expect("valid whitespace regex");
    ws.replace_all(&no_control, " ").trim().to_owned()
}

/// Extract stock ticker symbols from discussion text.
///
/// Recognizes `$AAPL$`, `SH600519`, `SZ000001`, `HK00700`, `600519.SH`, and
/// the `$茅台(SH600519)$` compound form. Symbols are uppercased and
/// deduplicated in first-seen order; tokens shorter than 2 chars are
/// dropped.
#[must_use]
pub fn extract_stock_symbols(text: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    let mut push = |raw: String| {
        let sym = raw.to_uppercase();
        if sym.len() >= 2 && !symbols.contains(&sym) {
            symbols.push(sym);
        }
    };

    let dollar = Regex::new(r"\$([A-Za-z]{1,5})\$").expect("valid dollar-ticker regex");
    for cap in dollar.captures_iter(text) {
        push(cap[1].to_owned());
    }

    // No word-boundary anchors: codes sit directly against CJK text on this
    // feed, and CJK chars count as word chars so `\b` would never match there.
    let exchange = Regex::new(r"(?i)(SH\d{6}|SZ\d{6}|HK\d{5})").expect("valid exchange regex");
    for cap in exchange.captures_iter(text) {
        push(cap[1].to_owned());
    }

    let suffixed = Regex::new(r"(?i)(\d{6})\.(SH|SZ|HK)").expect("valid suffixed regex");
    for cap in suffixed.captures_iter(text) {
        push(format!("{}{}", &cap[2], &cap[1]));
    }

    let compound =
        Regex::new(r"\$[^$()]+\(([A-Za-z]{2}\d+)\)\$").expect("valid compound-ticker regex");
    for cap in compound.captures_iter(text) {
        push(cap[1].to_owned());
    }

    symbols
}

/// Extract http(s) URLs, deduplicated in first-seen order.
#[must_use]
pub fn extract_urls(text: &str) -> Vec<String> {
    let re = Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("valid url regex");
    let mut urls: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let url = m.as_str().to_owned();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Keyword-count sentiment classification with the ×1.5 imbalance threshold.
///
/// Returns the label and a confidence in `[0.5, 0.9]`; texts with no keyword
/// hits classify as neutral at 0.5.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn classify_sentiment_basic(text: &str) -> (SentimentLabel, f64) {
    let lower = text.to_lowercase();
    let hits = |keywords: &[&str]| keywords.iter().filter(|k| lower.contains(*k)).count() as f64;

    let positive = hits(POSITIVE_KEYWORDS);
    let negative = hits(NEGATIVE_KEYWORDS);
    let neutral = hits(NEUTRAL_KEYWORDS);
    let total = positive + negative + neutral;

    if total == 0.0 {
        return (SentimentLabel::Neutral, 0.5);
    }

    if positive > negative * 1.5 {
        let confidence = (0.5 + (positive - negative) / (total * 2.0)).min(0.9);
        (SentimentLabel::Positive, confidence)
    } else if negative > positive * 1.5 {
        let confidence = (0.5 + (negative - positive) / (total * 2.0)).min(0.9);
        (SentimentLabel::Negative, confidence)
    } else {
        (SentimentLabel::Neutral, 0.5)
    }
}

/// Market sectors whose keywords appear in the text, in table order.
#[must_use]
pub fn identify_sectors(text: &str) -> Vec<String> {
    let mut sectors = Vec::new();
    for (sector, keywords) in SECTOR_KEYWORDS {
        if keywords.iter().any(|k| text.contains(k)) {
            sectors.push((*sector).to_owned());
        }
    }
    sectors
}

/// Truncate to `max_len` chars, appending `...` when cut.
#[must_use]
pub fn truncate_text(text: &str, max_len: usize) -> String {
    let count = text.chars().count();
    if count <= max_len {
        return text.to_owned();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Replace filesystem-unsafe characters so a tab name can become a filename.
#[must_use]
pub fn safe_filename(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = safe.trim_matches(|c: char| c == ' ' || c == '.');
    let mut out: String = trimmed.chars().take(100).collect();
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_ticker_extracted() {
        assert_eq!(extract_stock_symbols("$AAPL$ is going up!"), vec!["AAPL"]);
    }

    #[test]
    fn exchange_prefixed_codes_extracted() {
        let symbols = extract_stock_symbols("看好SH600519，还有sz000001和HK00700");
        assert!(symbols.contains(&"SH600519".to_owned()));
        assert!(symbols.contains(&"SZ000001".to_owned()));
        assert!(symbols.contains(&"HK00700".to_owned()));
    }

    #[test]
    fn suffixed_code_normalized_to_prefix_form() {
        assert_eq!(extract_stock_symbols("600519.SH 创新高"), vec!["SH600519"]);
    }

    #[test]
    fn codes_adjacent_to_chinese_text_extracted() {
        assert_eq!(
            extract_stock_symbols("看好SH600519后市"),
            vec!["SH600519"]
        );
        assert_eq!(
            extract_stock_symbols("600519.SH创新高"),
            vec!["SH600519"]
        );
    }

    #[test]
    fn compound_form_yields_code() {
        let symbols = extract_stock_symbols("$贵州茅台(SH600519)$ 涨停");
        assert!(symbols.contains(&"SH600519".to_owned()));
    }

    #[test]
    fn duplicate_symbols_collapse() {
        assert_eq!(
            extract_stock_symbols("$AAPL$ and again $AAPL$"),
            vec!["AAPL"]
        );
    }

    #[test]
    fn no_symbols_in_plain_text() {
        assert!(extract_stock_symbols("大盘今天震荡").is_empty());
    }

    #[test]
    fn urls_extracted_and_deduplicated() {
        let urls = extract_urls("see https://example.com/a and https://example.com/a again");
        assert_eq!(urls, vec!["https://example.com/a"]);
    }

    #[test]
    fn clean_text_strips_tags_and_collapses_whitespace() {
        assert_eq!(
            clean_text("<div>hello   <b>world</b></div>\n\n again"),
            "hello world again"
        );
    }

    #[test]
    fn clean_text_empty_input() {
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn identical_parts_hash_identically() {
        let a = generate_content_hash(&["text", "author", "tab"]);
        let b = generate_content_hash(&["text", "author", "tab"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_text_hashes_differently() {
        assert_ne!(
            generate_content_hash(&["a", "", "tab"]),
            generate_content_hash(&["b", "", "tab"])
        );
    }

    #[test]
    fn short_hash_is_sixteen_chars() {
        assert_eq!(short_content_hash(&["看多"]).len(), 16);
    }

    #[test]
    fn bullish_keywords_classify_positive() {
        let (label, confidence) = classify_sentiment_basic("强烈看好，突破新高，上涨空间大");
        assert_eq!(label, SentimentLabel::Positive);
        assert!(confidence > 0.5);
        assert!(confidence <= 0.9);
    }

    #[test]
    fn bearish_keywords_classify_negative() {
        let (label, _) = classify_sentiment_basic("暴跌破位，风险很大，建议卖出");
        assert_eq!(label, SentimentLabel::Negative);
    }

    #[test]
    fn no_keywords_classify_neutral_at_default_confidence() {
        let (label, confidence) = classify_sentiment_basic("今天天气不错");
        assert_eq!(label, SentimentLabel::Neutral);
        assert!((confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn balanced_keywords_stay_neutral() {
        // One positive hit ("涨"), one negative hit ("跌"), so neither side
        // exceeds the other by more than ×1.5.
        let (label, _) = classify_sentiment_basic("有人说涨有人说跌");
        assert_eq!(label, SentimentLabel::Neutral);
    }

    #[test]
    fn sectors_identified_from_keywords() {
        let sectors = identify_sectors("白酒板块和半导体都值得关注");
        assert_eq!(sectors, vec!["Technology", "Consumer"]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let t = truncate_text("茅台茅台茅台茅台", 5);
        assert_eq!(t, "茅台...");
    }

    #[test]
    fn safe_filename_replaces_separators() {
        assert_eq!(safe_filename("a/b:c"), "a_b_c");
        assert_eq!(safe_filename("热门"), "热门");
        assert_eq!(safe_filename(""), "unnamed");
    }
}
