// src/ingest/providers/reuters_rss.rs
//! RSS fallback source, used when a GDELT cycle yields nothing new.
//! Dates stay raw (RFC-2822 or dc:date) and are canonicalized by the
//! enricher's `to_iso_utc`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::event::NormalizedRecord;
use crate::ingest::{domain_from_url, scrub_title, FeedSource, FetchBatch};

pub const REUTERS_RSS_URL: &str = "https://feeds.reuters.com/reuters/businessNews";

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    // Some feeds carry the date in Dublin Core instead of pubDate.
    #[serde(rename = "dc:date")]
    dc_date: Option<String>,
}

fn scrub_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse an RSS payload into normalized records, newest-first as listed.
pub fn parse_rss(raw: &str, limit: usize) -> Result<Vec<NormalizedRecord>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_entities_for_xml(raw);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::new();
    for it in rss.channel.item.into_iter().take(limit) {
        let title = scrub_title(it.title.as_deref().unwrap_or_default());
        let link = it.link.as_deref().unwrap_or_default().trim().to_string();
        if title.is_empty() && link.is_empty() {
            continue;
        }

        let mut domain = String::new();
        if link.starts_with("http") {
            domain = domain_from_url(&link);
        }
        if domain.is_empty() {
            domain = "reuters.com".to_string();
        }

        let date = it
            .dc_date
            .or(it.pub_date)
            .unwrap_or_default()
            .trim()
            .to_string();

        out.push(NormalizedRecord {
            date,
            title,
            url: link,
            domain,
            language: "en".to_string(),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_events_total").increment(out.len() as u64);
    Ok(out)
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        url: String,
    },
}

pub struct ReutersRssSource {
    mode: Mode,
    limit: usize,
}

impl ReutersRssSource {
    pub fn from_fixture(raw: &str) -> Self {
        Self {
            mode: Mode::Fixture(raw.to_string()),
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn from_url(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("building rss http client")?;
        Ok(Self {
            mode: Mode::Http {
                client,
                url: url.to_string(),
            },
            limit: DEFAULT_LIMIT,
        })
    }
}

#[async_trait]
impl FeedSource for ReutersRssSource {
    async fn fetch_latest(&self) -> Result<FetchBatch> {
        let raw = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { client, url } => {
                let resp = client.get(url).send().await.context("rss http get")?;
                resp.text().await.context("rss http body")?
            }
        };
        let raw_bytes = raw.len();
        Ok(FetchBatch {
            records: parse_rss(&raw, self.limit)?,
            raw_bytes,
        })
    }

    fn name(&self) -> &'static str {
        "reuters-rss"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Business News</title>
    <item>
      <title>Acme in merger talks &ndash; sources</title>
      <link>https://www.reuters.com/business/acme-merger</link>
      <pubDate>Fri, 26 Sep 2025 19:50:22 GMT</pubDate>
    </item>
    <item>
      <title></title>
      <link></link>
    </item>
    <item>
      <title>Earnings season kicks off</title>
      <link>https://Example.ORG/markets/earnings</link>
    </item>
  </channel>
</rss>
"#;

    #[test]
    fn items_parse_with_domain_and_raw_date() {
        let rows = parse_rss(RSS, 50).unwrap();
        assert_eq!(rows.len(), 2); // fully empty item is dropped
        assert_eq!(rows[0].title, "Acme in merger talks - sources");
        assert_eq!(rows[0].domain, "www.reuters.com");
        assert_eq!(rows[0].date, "Fri, 26 Sep 2025 19:50:22 GMT");
        assert_eq!(rows[0].language, "en");
    }

    #[test]
    fn missing_link_falls_back_to_reuters_domain() {
        let rss = r#"<rss><channel><item><title>Headline only</title></item></channel></rss>"#;
        let rows = parse_rss(rss, 50).unwrap();
        assert_eq!(rows[0].domain, "reuters.com");
        assert!(rows[0].url.is_empty());
    }

    #[test]
    fn limit_caps_the_batch() {
        let rows = parse_rss(RSS, 1).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn broken_xml_is_an_error_not_a_panic() {
        assert!(parse_rss("<rss><channel><item>", 10).is_err());
    }
}
