use clap::Parser;

use super::*;
use crate::tabs::parse_tabs;

#[test]
fn no_args_defaults_to_all_tabs() {
    let cli = Cli::try_parse_from(["marketpulse"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
    assert_eq!(cli.tabs, vec!["all"]);
    assert_eq!(cli.max_posts, 50);
    assert!(!cli.no_llm);
}

#[test]
fn parses_list_tabs_command() {
    let cli = Cli::try_parse_from(["marketpulse", "list-tabs"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::ListTabs)));
}

#[test]
fn parses_comma_separated_tabs() {
    let cli = Cli::try_parse_from(["marketpulse", "--tabs", "热门,基金"])
        .expect("expected valid cli args");
    assert_eq!(cli.tabs, vec!["热门", "基金"]);
}

#[test]
fn parses_short_flags() {
    let cli = Cli::try_parse_from([
        "marketpulse",
        "-t",
        "热门",
        "-m",
        "25",
        "-j",
        "nightly",
        "-c",
        "2",
    ])
    .expect("expected valid cli args");
    assert_eq!(cli.max_posts, 25);
    assert_eq!(cli.job_name.as_deref(), Some("nightly"));
    assert_eq!(cli.concurrent, Some(2));
}

#[test]
fn all_selection_expands_to_every_known_tab() {
    let tabs = parse_tabs(&["all".to_owned()]).unwrap();
    assert_eq!(tabs.len(), tabs::TAB_DESCRIPTIONS.len());
    assert!(tabs.contains(&"热门".to_owned()));
    assert!(tabs.contains(&"ETF".to_owned()));
}

#[test]
fn explicit_selection_is_kept_in_order_without_duplicates() {
    let tabs = parse_tabs(&["基金".to_owned(), "热门".to_owned(), "基金".to_owned()]).unwrap();
    assert_eq!(tabs, vec!["基金", "热门"]);
}

#[test]
fn unknown_tab_is_rejected() {
    let err = parse_tabs(&["nonsense".to_owned()]).unwrap_err();
    assert!(err.to_string().contains("unknown tab 'nonsense'"));
}

#[test]
fn overrides_are_applied_to_config() {
    let cli = Cli::try_parse_from([
        "marketpulse",
        "-m",
        "7",
        "-j",
        "custom",
        "-o",
        "/tmp/out",
        "-c",
        "3",
        "--no-llm",
    ])
    .unwrap();
    let mut config = marketpulse_core::AppConfig {
        job_name: "default".to_owned(),
        log_level: "info".to_owned(),
        crawler_max_posts_per_tab: 100,
        crawler_max_concurrent_tabs: 4,
        browser_base_url: "http://localhost:3000".to_owned(),
        browser_token: None,
        browser_feed_url: "https://example.com/".to_owned(),
        llm_api_key: None,
        llm_api_base_url: "https://example.com/v1".to_owned(),
        llm_model_name: "model".to_owned(),
        llm_max_tokens: 1024,
        llm_temperature: 0.3,
        llm_requests_per_minute: 5,
        llm_max_concurrent_requests: 1,
        llm_retry_attempts: 5,
        llm_retry_backoff_base_ms: 2000,
        llm_request_timeout_secs: 60,
        storage_base_dir: std::path::PathBuf::from("storage"),
        storage_save_interval_secs: 30,
    };
    apply_overrides(&mut config, &cli);

    assert_eq!(config.crawler_max_posts_per_tab, 7);
    assert_eq!(config.job_name, "custom");
    assert_eq!(config.storage_base_dir.to_str(), Some("/tmp/out"));
    assert_eq!(config.crawler_max_concurrent_tabs, 3);
    assert!(cli.no_llm);
}
