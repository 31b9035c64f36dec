//! Command line entry point for the discussion crawl pipeline.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod run;
mod tabs;

#[cfg(test)]
mod tests;

#[derive(Debug, Parser)]
#[command(name = "marketpulse")]
#[command(about = "Investor discussion crawler and sentiment report generator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Tabs to crawl (热门, 7x24, 视频, 基金, 资讯, 达人, 私募, ETF) or "all".
    #[arg(short, long, value_delimiter = ',', default_value = "all")]
    tabs: Vec<String>,

    /// Maximum posts to collect per tab.
    #[arg(short, long, default_value_t = 50)]
    max_posts: usize,

    /// Custom job name (default: run_YYYYMMDD_HHMMSS).
    #[arg(short, long)]
    job_name: Option<String>,

    /// Output directory for data storage.
    #[arg(short, long)]
    output: Option<std::path::PathBuf>,

    /// LLM API key for summarization.
    #[arg(short = 'k', long, env = "MP_LLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Skip LLM summarization and use keyword analysis only.
    #[arg(long)]
    no_llm: bool,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Number of tabs to crawl concurrently.
    #[arg(short, long)]
    concurrent: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the tabs available for crawling.
    ListTabs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Some(Commands::ListTabs) = &cli.command {
        for (name, description) in tabs::TAB_DESCRIPTIONS {
            println!("{name:<8} {description}");
        }
        return Ok(());
    }

    let mut config = marketpulse_core::load_app_config_from_env()?;
    apply_overrides(&mut config, &cli);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let selected = tabs::parse_tabs(&cli.tabs)?;
    run::run_pipeline(config, selected, cli.no_llm).await
}

fn apply_overrides(config: &mut marketpulse_core::AppConfig, cli: &Cli) {
    config.crawler_max_posts_per_tab = cli.max_posts;
    if let Some(job_name) = &cli.job_name {
        config.job_name.clone_from(job_name);
    }
    if let Some(output) = &cli.output {
        config.storage_base_dir.clone_from(output);
    }
    if let Some(key) = &cli.api_key {
        if !key.is_empty() {
            config.llm_api_key = Some(key.clone());
        }
    }
    if let Some(level) = &cli.log_level {
        config.log_level.clone_from(level);
    }
    if let Some(concurrent) = cli.concurrent {
        config.crawler_max_concurrent_tabs = concurrent;
    }
}
