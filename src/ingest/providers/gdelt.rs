// src/ingest/providers/gdelt.rs
//! GDELT DOC 2.0 ArtList source (CSV). Column names vary across feed
//! revisions, so canonical fields are resolved through an alias table
//! against the header row, once per batch.

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::config::FeedConfig;
use crate::event::NormalizedRecord;
use crate::ingest::{domain_from_url, FeedSource, FetchBatch};

const BASE: &str = "https://api.gdeltproject.org/api/v2/doc/doc";

// Accepted header spellings per canonical field, tried in priority order.
const URL_ALIASES: &[&str] = &["url", "sourceurl", "documentidentifier", "link"];
const TITLE_ALIASES: &[&str] = &["title", "documenttitle", "alttitle"];
const DATE_ALIASES: &[&str] = &["date", "timestamp", "sqldate", "dateadded"];
const LANG_ALIASES: &[&str] = &["language", "doclanguage"];
const DOMAIN_ALIASES: &[&str] = &["domain"];

pub fn build_feed_url(query: &str, maxrecords: usize, timespan: &str) -> Result<url::Url> {
    let maxrecords = maxrecords.to_string();
    url::Url::parse_with_params(
        BASE,
        &[
            ("query", query),
            ("mode", "ArtList"),
            ("maxrecords", maxrecords.as_str()),
            ("sort", "DateDesc"),
            ("format", "CSV"),
            ("timespan", timespan),
        ],
    )
    .context("building gdelt feed url")
}

fn pick_column(headers: &csv::StringRecord, aliases: &[&str]) -> Option<usize> {
    for alias in aliases {
        if let Some(idx) = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(alias))
        {
            return Some(idx);
        }
    }
    None
}

fn field(row: &csv::StringRecord, idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).unwrap_or_default().trim()
}

/// Parse an ArtList CSV payload into normalized records. Rows that fail
/// CSV parsing, or carry neither title nor url, are skipped; the rest of
/// the batch is still processed.
pub fn parse_artlist_csv(raw: &str) -> Vec<NormalizedRecord> {
    let t0 = std::time::Instant::now();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(raw.as_bytes());

    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            tracing::warn!(error = ?e, "gdelt csv has no parsable header");
            return Vec::new();
        }
    };

    let url_col = pick_column(&headers, URL_ALIASES);
    let title_col = pick_column(&headers, TITLE_ALIASES);
    let date_col = pick_column(&headers, DATE_ALIASES);
    let lang_col = pick_column(&headers, LANG_ALIASES);
    let domain_col = pick_column(&headers, DOMAIN_ALIASES);

    let mut out = Vec::new();
    for row in reader.records() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = ?e, "skipping malformed csv row");
                continue;
            }
        };

        let title = field(&row, title_col).to_string();
        let urlval = field(&row, url_col).to_string();
        if title.is_empty() && urlval.is_empty() {
            continue;
        }

        let mut domain = field(&row, domain_col).to_lowercase();
        if domain.is_empty() && urlval.starts_with("http") {
            domain = domain_from_url(&urlval);
        }

        out.push(NormalizedRecord {
            date: field(&row, date_col).to_string(),
            language: field(&row, lang_col).to_lowercase(),
            title,
            url: urlval,
            domain,
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("feed_parse_ms").record(ms);
    counter!("feed_events_total").increment(out.len() as u64);
    out
}

enum Mode {
    // Owned copy so tests can hand in any &str.
    Fixture(String),
    Http {
        client: reqwest::Client,
        url: url::Url,
    },
}

pub struct GdeltSource {
    mode: Mode,
}

impl GdeltSource {
    pub fn from_fixture(raw: &str) -> Self {
        Self {
            mode: Mode::Fixture(raw.to_string()),
        }
    }

    /// HTTP mode; the fetch timeout is baked into the client so blocking
    /// is bounded by configuration.
    pub fn from_config(cfg: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.fetch_timeout_secs))
            .build()
            .context("building gdelt http client")?;
        let url = build_feed_url(&cfg.query, cfg.batch_max, &cfg.timespan)?;
        Ok(Self {
            mode: Mode::Http { client, url },
        })
    }
}

#[async_trait]
impl FeedSource for GdeltSource {
    async fn fetch_latest(&self) -> Result<FetchBatch> {
        let raw = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { client, url } => {
                let resp = client
                    .get(url.clone())
                    .send()
                    .await
                    .context("gdelt http get")?;
                resp.text().await.context("gdelt http body")?
            }
        };
        let raw_bytes = raw.len();
        Ok(FetchBatch {
            records: parse_artlist_csv(&raw),
            raw_bytes,
        })
    }

    fn name(&self) -> &'static str {
        "gdelt"
    }
}
