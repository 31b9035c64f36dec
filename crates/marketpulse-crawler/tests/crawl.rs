//! End-to-end crawl against a mocked rendering service.

use std::sync::Arc;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use marketpulse_core::DeduplicationIndex;
use marketpulse_crawler::{BrowserlessDriver, CrawlOrchestrator};

const FEED_HTML: &str = r#"
<html><body>
<article><p>贵州茅台大涨，白酒板块全线走强</p></article>
<article><p>半导体芯片库存风险加大，建议谨慎</p></article>
<div class="timeline__item"><span>$AAPL$ is going up after earnings</span></div>
<div class="feed-item"><span>新能源车八月销量数据超预期增长</span></div>
<div class="status-item"><span>银行股横盘震荡，等待政策方向</span></div>
</body></html>
"#;

#[tokio::test]
async fn rendered_feed_becomes_valid_unique_posts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED_HTML))
        .mount(&server)
        .await;

    let driver = Arc::new(
        BrowserlessDriver::new(&server.uri(), None, "https://example.com/feed", 10)
            .expect("driver builds"),
    );
    let orch = CrawlOrchestrator::new(driver, Arc::new(DeduplicationIndex::new()), 1);

    let posts = orch.crawl_tab("热门", 5).await;

    assert_eq!(posts.len(), 5);
    assert!(posts.iter().all(|p| p.is_valid()));
    assert!(posts.iter().all(|p| p.tab == "热门"));

    let mut ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5, "ids must be unique");

    let apple = posts
        .iter()
        .find(|p| p.text.contains("AAPL"))
        .expect("apple post extracted");
    assert_eq!(apple.symbols, vec!["AAPL"]);
}

#[tokio::test]
async fn second_crawl_of_same_feed_is_all_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED_HTML))
        .mount(&server)
        .await;

    let driver = Arc::new(
        BrowserlessDriver::new(&server.uri(), None, "https://example.com/feed", 10)
            .expect("driver builds"),
    );
    let index = Arc::new(DeduplicationIndex::new());
    let orch = CrawlOrchestrator::new(driver, Arc::clone(&index), 1);

    let first = orch.crawl_tab("热门", 5).await;
    assert_eq!(first.len(), 5);

    // Same session index: the identical snapshot yields nothing new.
    let second = orch.crawl_tab("7x24", 5).await;
    assert!(second.is_empty());
}
