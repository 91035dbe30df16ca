// src/ingest/mod.rs
pub mod poller;
pub mod providers;

use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::event::NormalizedRecord;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_events_total", "Raw records parsed from the upstream feed.");
        describe_counter!(
            "feed_kept_total",
            "Events enqueued after normalization + dedup."
        );
        describe_counter!(
            "feed_dedup_total",
            "Records skipped because their key was already seen."
        );
        describe_counter!("feed_provider_errors_total", "Source fetch/parse errors.");
        describe_histogram!("feed_parse_ms", "Source parse time in milliseconds.");
        describe_gauge!("feed_last_poll_ts", "Unix ts of the last completed poll cycle.");
        describe_gauge!("ws_subscribers", "Currently connected subscribers.");
    });
}

/// A batch of normalized records plus the raw payload size, for logging.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub records: Vec<NormalizedRecord>,
    pub raw_bytes: usize,
}

/// A source of raw news records. The poll loop only knows this contract;
/// transport (HTTP, fixture) is the provider's business.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<FetchBatch>;
    fn name(&self) -> &'static str;
}

/// Clean a feed-provided title: decode HTML entities, strip tags,
/// collapse whitespace, trim.
pub fn scrub_title(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"));
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Lowercased host of a url, or empty on any parse failure. Callers gate
/// on the value looking like an absolute http(s) url first.
pub fn domain_from_url(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default()
}
