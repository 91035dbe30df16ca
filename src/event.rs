// src/event.rs
use serde::{Deserialize, Serialize};

/// One row from the upstream feed after schema resolution.
///
/// All fields are best-effort, trimmed strings; `domain` and `language`
/// are lowercased. Rows with neither title nor url are dropped by the
/// providers before they ever become a `NormalizedRecord`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub date: String,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub language: String,
}

/// News category assigned by the title classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    GovStake,
    CEOResignation,
    #[serde(rename = "M&A")]
    MergerAcquisition,
    Earnings,
    Contract,
    News,
    Info,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::GovStake => "GovStake",
            Category::CEOResignation => "CEOResignation",
            Category::MergerAcquisition => "M&A",
            Category::Earnings => "Earnings",
            Category::Contract => "Contract",
            Category::News => "News",
            Category::Info => "Info",
        };
        f.write_str(s)
    }
}

/// The canonical unit flowing through the pipeline and out to subscribers.
///
/// This is also the wire shape: subscribers receive exactly these fields
/// as a JSON object, `tickers` as an array, everything else strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub headline: String,
    pub summary: String,
    pub tickers: Vec<String>,
    pub category: Category,
    pub url: String,
    pub ts: String,
    pub domain: String,
    pub language: String,
}

impl Event {
    /// Key used to decide whether two events are the same news item:
    /// the url when present, otherwise headline + timestamp.
    pub fn dedup_key(&self) -> String {
        if !self.url.is_empty() {
            self.url.clone()
        } else {
            format!("{}|{}", self.headline, self.ts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(url: &str) -> Event {
        Event {
            headline: "Acme to acquire Beta Corp".into(),
            summary: "Source: example.com".into(),
            tickers: vec!["ACME".into()],
            category: Category::MergerAcquisition,
            url: url.into(),
            ts: "2025-09-26T19:50:22Z".into(),
            domain: "example.com".into(),
            language: "en".into(),
        }
    }

    #[test]
    fn dedup_key_prefers_url() {
        let ev = sample("https://example.com/a");
        assert_eq!(ev.dedup_key(), "https://example.com/a");
    }

    #[test]
    fn dedup_key_falls_back_to_headline_and_ts() {
        let ev = sample("");
        assert_eq!(
            ev.dedup_key(),
            "Acme to acquire Beta Corp|2025-09-26T19:50:22Z"
        );
    }

    #[test]
    fn category_serializes_with_ampersand() {
        let s = serde_json::to_string(&Category::MergerAcquisition).unwrap();
        assert_eq!(s, r#""M&A""#);
        let back: Category = serde_json::from_str(&s).unwrap();
        assert_eq!(back, Category::MergerAcquisition);
    }

    #[test]
    fn event_wire_shape_has_exactly_the_expected_fields() {
        let v = serde_json::to_value(sample("https://example.com/a")).unwrap();
        let obj = v.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["category", "domain", "headline", "language", "summary", "tickers", "ts", "url"]
        );
        assert!(obj["tickers"].is_array());
    }
}
