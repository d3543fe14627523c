use anyhow::{Context, Result};
use futures::future::join_all;
use once_cell::sync::Lazy;
use quick_xml::de::from_str;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::sanitize::sanitize;

/// Returned instead of an empty block when aggregation yields zero items.
/// Downstream treats this as a meaningful "empty but valid" signal.
pub const NO_NEWS_SENTINEL: &str = "No current news found.";

const RECORD_TERMINATOR: &str = "---";

// ─── RSS 2.0 envelope (only the fields the digest consumes) ───

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
}

/// One sanitized feed entry, ready to be serialized into the aggregated
/// text block. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct NewsItem {
    pub source: &'static str,
    pub title: String,
    pub link: String,
    pub summary: String,
}

impl NewsItem {
    fn record(&self) -> String {
        format!(
            "SOURCE: {}\nTITLE: {}\nLINK: {}\nCONTENT: {}\n{}",
            self.source, self.title, self.link, self.summary, RECORD_TERMINATOR
        )
    }
}

fn source_tag(url: &str) -> &'static str {
    if url.contains("livemint") {
        "Livemint"
    } else {
        "ET"
    }
}

/// Named HTML entities that are not valid XML and would abort the parse
/// when a feed emits them outside CDATA.
fn scrub_feed_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strips embedded markup from a description fragment down to plain text
/// and collapses whitespace runs to single spaces.
fn clean_fragment(raw: &str) -> String {
    static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    let decoded = html_escape::decode_html_entities(raw);
    let stripped = TAGS.replace_all(&decoded, "");
    normalize_ws(&stripped)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub struct FeedAggregator {
    client: Client,
    sources: Vec<String>,
    max_entries_per_feed: usize,
    summary_max_chars: usize,
}

impl FeedAggregator {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.feed_request_timeout_secs))
            .build()
            .context("Failed to build feed HTTP client")?;

        Ok(FeedAggregator {
            client,
            sources: config.feed_urls.clone(),
            max_entries_per_feed: config.max_entries_per_feed,
            summary_max_chars: config.summary_max_chars,
        })
    }

    /// Fetches every configured source and flattens the results into a
    /// single text block, records in source order. A failing source never
    /// aborts the others; zero items overall yields the sentinel string.
    pub async fn aggregate(&self) -> String {
        let fetches = self.sources.iter().map(|url| self.fetch_source(url));
        let results = join_all(fetches).await;

        let mut records = Vec::new();
        for (url, result) in self.sources.iter().zip(results) {
            match result {
                Ok(items) => {
                    debug!("Collected {} items from {}", items.len(), source_tag(url));
                    records.extend(items.iter().map(NewsItem::record));
                }
                Err(e) => warn!("Skipping source {}: {:#}", source_tag(url), e),
            }
        }

        if records.is_empty() {
            NO_NEWS_SENTINEL.to_string()
        } else {
            records.join("\n")
        }
    }

    async fn fetch_source(&self, url: &str) -> Result<Vec<NewsItem>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Feed {} returned {}", url, status);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read feed body from {}", url))?;

        self.parse_feed(url, &body)
    }

    fn parse_feed(&self, url: &str, xml: &str) -> Result<Vec<NewsItem>> {
        let rss: Rss = from_str(&scrub_feed_entities(xml))
            .with_context(|| format!("Failed to parse feed XML from {}", url))?;

        let source = source_tag(url);
        let items = rss
            .channel
            .items
            .into_iter()
            .take(self.max_entries_per_feed)
            .map(|item| {
                let summary = truncate_chars(
                    &clean_fragment(item.description.as_deref().unwrap_or_default()),
                    self.summary_max_chars,
                );
                NewsItem {
                    source,
                    title: sanitize(&normalize_ws(item.title.as_deref().unwrap_or_default())),
                    link: item.link.unwrap_or_default(),
                    summary: sanitize(&summary),
                }
            })
            .collect();

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(feed_urls: Vec<String>) -> Config {
        Config {
            telegram_bot_token: "test-token".to_string(),
            telegram_chat_id: "12345".to_string(),
            telegram_api_url: String::new(),
            telegram_request_timeout_secs: 5,
            anthropic_api_key: "test-key".to_string(),
            anthropic_api_url: String::new(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            agent_max_tokens: 1024,
            agent_max_iterations: 5,
            backend_max_retries: 0,
            backend_request_timeout_secs: 5,
            feed_urls,
            max_entries_per_feed: 6,
            summary_max_chars: 200,
            feed_request_timeout_secs: 5,
            error_detail_max_chars: 300,
        }
    }

    fn rss_with_items(items: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <rss version=\"2.0\"><channel>\n\
             <title>Test Feed</title>\n\
             <link>https://example.com</link>\n\
             {}\n\
             </channel></rss>",
            items
        )
    }

    fn sample_item(n: usize) -> String {
        format!(
            "<item><title>Story {n}</title>\
             <link>https://example.com/{n}</link>\
             <description>Summary {n}</description></item>"
        )
    }

    async fn mount_feed(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_caps_entries_per_source() {
        let server = MockServer::start().await;
        let items: String = (1..=10).map(sample_item).collect();
        mount_feed(&server, "/rss", rss_with_items(&items)).await;

        let config = test_config(vec![format!("{}/rss", server.uri())]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        let block = aggregator.aggregate().await;
        assert_eq!(block.matches(RECORD_TERMINATOR).count(), 6);
        assert!(block.contains("TITLE: Story 6"));
        assert!(!block.contains("TITLE: Story 7"));
    }

    #[tokio::test]
    async fn test_record_format() {
        let server = MockServer::start().await;
        mount_feed(&server, "/rss", rss_with_items(&sample_item(1))).await;

        let config = test_config(vec![format!("{}/rss", server.uri())]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        let block = aggregator.aggregate().await;
        assert_eq!(
            block,
            "SOURCE: ET\nTITLE: Story 1\nLINK: https://example.com/1\nCONTENT: Summary 1\n---"
        );
    }

    #[tokio::test]
    async fn test_description_markup_stripped_and_collapsed() {
        let server = MockServer::start().await;
        let item = "<item><title>T</title><link>https://example.com/x</link>\
                    <description><![CDATA[<p>Benchmark   indices\n rallied&nbsp;sharply <b>today</b>.</p>]]></description></item>";
        mount_feed(&server, "/rss", rss_with_items(item)).await;

        let config = test_config(vec![format!("{}/rss", server.uri())]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        let block = aggregator.aggregate().await;
        assert!(block.contains("CONTENT: Benchmark indices rallied sharply today."));
        assert!(!block.contains('<'));
    }

    #[tokio::test]
    async fn test_summary_truncated() {
        let server = MockServer::start().await;
        let long = "x".repeat(500);
        let item = format!(
            "<item><title>T</title><link>https://example.com/x</link><description>{long}</description></item>"
        );
        mount_feed(&server, "/rss", rss_with_items(&item)).await;

        let config = test_config(vec![format!("{}/rss", server.uri())]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        let block = aggregator.aggregate().await;
        let content_line = block
            .lines()
            .find(|l| l.starts_with("CONTENT: "))
            .unwrap();
        assert_eq!(content_line.len(), "CONTENT: ".len() + 200);
    }

    #[tokio::test]
    async fn test_title_sanitized_link_raw() {
        let server = MockServer::start().await;
        let item = "<item><title>M&amp;M up 4% &lt;live&gt;</title>\
                    <link>https://example.com/a?b=1&amp;c=2</link>\
                    <description>d</description></item>";
        mount_feed(&server, "/rss", rss_with_items(item)).await;

        let config = test_config(vec![format!("{}/rss", server.uri())]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        let block = aggregator.aggregate().await;
        // XML entity decode yields "M&M up 4% <live>"; sanitize re-escapes it
        assert!(block.contains("TITLE: M&amp;M up 4% &lt;live&gt;"));
        // The link is consumed only as an href target and stays unescaped
        assert!(block.contains("LINK: https://example.com/a?b=1&c=2"));
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_sentinel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = test_config(vec![
            format!("{}/a", server.uri()),
            format!("{}/b", server.uri()),
        ]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        assert_eq!(aggregator.aggregate().await, NO_NEWS_SENTINEL);
    }

    #[tokio::test]
    async fn test_single_source_failure_skipped() {
        let server = MockServer::start().await;
        mount_feed(&server, "/good", rss_with_items(&sample_item(1))).await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = test_config(vec![
            format!("{}/bad", server.uri()),
            format!("{}/good", server.uri()),
        ]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        let block = aggregator.aggregate().await;
        assert!(block.contains("TITLE: Story 1"));
        assert_eq!(block.matches(RECORD_TERMINATOR).count(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_feed_skipped() {
        let server = MockServer::start().await;
        mount_feed(&server, "/broken", "this is not xml at all".to_string()).await;

        let config = test_config(vec![format!("{}/broken", server.uri())]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        assert_eq!(aggregator.aggregate().await, NO_NEWS_SENTINEL);
    }

    #[tokio::test]
    async fn test_empty_channel_yields_sentinel() {
        let server = MockServer::start().await;
        mount_feed(&server, "/rss", rss_with_items("")).await;

        let config = test_config(vec![format!("{}/rss", server.uri())]);
        let aggregator = FeedAggregator::new(&config).unwrap();

        assert_eq!(aggregator.aggregate().await, NO_NEWS_SENTINEL);
    }

    #[test]
    fn test_source_tag_mapping() {
        assert_eq!(source_tag("https://www.livemint.com/rss/markets"), "Livemint");
        assert_eq!(
            source_tag("https://economictimes.indiatimes.com/rssfeeds/1977021501.cms"),
            "ET"
        );
    }
}
