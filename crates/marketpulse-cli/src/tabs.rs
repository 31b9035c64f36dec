//! The known feed tabs and selection parsing.

pub(crate) const TAB_DESCRIPTIONS: &[(&str, &str)] = &[
    ("热门", "Hot/Trending Discussions"),
    ("7x24", "24/7 Live News & Updates"),
    ("视频", "Video Content"),
    ("基金", "Mutual Funds Discussions"),
    ("资讯", "News & Information"),
    ("达人", "Expert/Influencer Posts"),
    ("私募", "Private Equity Discussions"),
    ("ETF", "ETF Discussions"),
];

/// Expand a `--tabs` selection. `"all"` (case-insensitive) selects every
/// known tab; unknown names are rejected.
pub(crate) fn parse_tabs(selection: &[String]) -> anyhow::Result<Vec<String>> {
    if selection.is_empty() || selection.iter().any(|t| t.eq_ignore_ascii_case("all")) {
        return Ok(TAB_DESCRIPTIONS
            .iter()
            .map(|(name, _)| (*name).to_owned())
            .collect());
    }

    let mut tabs = Vec::new();
    for tab in selection {
        if !TAB_DESCRIPTIONS.iter().any(|(name, _)| name == tab) {
            let known: Vec<&str> = TAB_DESCRIPTIONS.iter().map(|(name, _)| *name).collect();
            anyhow::bail!("unknown tab '{tab}' (known tabs: {})", known.join(", "));
        }
        if !tabs.contains(tab) {
            tabs.push(tab.clone());
        }
    }
    Ok(tabs)
}
