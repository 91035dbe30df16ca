// src/enrich.rs
//! Turns a `NormalizedRecord` into exactly one `Event`: language
//! normalization (with optional detection), timestamp canonicalization,
//! title classification and ticker extraction.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use crate::event::{Category, Event, NormalizedRecord};

/// Placeholder headline for records that carried a url but no title.
pub const NO_TITLE: &str = "(no title)";

/// Capability: map a piece of text to a lowercase ISO 639-1 language code
/// (or "unk"). Selected once at construction, not per call.
pub type LangDetector = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Default detector backed by whatlang. Deterministic: same input, same
/// output. Returns "unk" on empty or undetectable input.
pub fn whatlang_detector() -> LangDetector {
    Arc::new(|text: &str| {
        if text.trim().is_empty() {
            return "unk".to_string();
        }
        whatlang::detect(text)
            .and_then(|info| isolang::Language::from_639_3(info.lang().code()))
            .and_then(|lang| lang.to_639_1())
            .map(str::to_string)
            .unwrap_or_else(|| "unk".to_string())
    })
}

/// Fallback detector for builds/deployments that don't want detection.
pub fn unk_detector() -> LangDetector {
    Arc::new(|_: &str| "unk".to_string())
}

/// Normalize a feed-provided language value to an ISO 639-1-ish code.
/// Accepts values like "spanish", "English", "es-ES", "en-GB".
pub fn normalize_lang(lang: &str) -> String {
    let l = lang.trim().to_lowercase();
    if l.is_empty() {
        return "unk".to_string();
    }
    if l.starts_with("es") || l == "spanish" {
        return "es".to_string();
    }
    if l.starts_with("en") || l == "english" {
        return "en".to_string();
    }
    l
}

fn iso_now_utc() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Canonicalize a feed date into ISO-8601 UTC, first parse wins:
/// 1) compact GDELT `yyyymmddhhmmss`,
/// 2) `YYYY-MM-DD HH:MM:SS` (space or `T`; naive is taken as UTC),
/// 3) RFC-2822 (RSS pubDate).
/// Anything else, including empty input, falls back to "now".
pub fn to_iso_utc(date_str: &str) -> String {
    let s = date_str.trim();
    if s.is_empty() {
        return iso_now_utc();
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S") {
        return Utc
            .from_utc_datetime(&dt)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    let t = s.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&t) {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&t, "%Y-%m-%dT%H:%M:%S%.f") {
        return Utc
            .from_utc_datetime(&dt)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    iso_now_utc()
}

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

/// Classify a headline into a `Category`. Ordered rules, first match wins,
/// matching is case-insensitive.
pub fn classify(title: &str) -> Category {
    static RE_GOV_STAKE: OnceCell<Regex> = OnceCell::new();
    static RE_CEO_RESIGN: OnceCell<Regex> = OnceCell::new();
    static RE_MA: OnceCell<Regex> = OnceCell::new();
    static RE_EARNINGS: OnceCell<Regex> = OnceCell::new();
    static RE_CONTRACT: OnceCell<Regex> = OnceCell::new();

    let gov = re(
        &RE_GOV_STAKE,
        r"(?i)\b(government|state)\b.*\b(stake|equity|share)\b",
    );
    let ceo = re(
        &RE_CEO_RESIGN,
        r"(?i)\b(CEO|CFO)\b.*\b(resigns?|steps down|resignation)\b",
    );
    let ma = re(
        &RE_MA,
        r"(?i)\b(acquisition|acquire|acquired|merger|merging|combine)\b",
    );
    let earnings = re(&RE_EARNINGS, r"(?i)\b(earnings|guidance|EPS|revenue)\b");
    let contract = re(&RE_CONTRACT, r"(?i)\b(contract|award|offtake|MoU)\b");

    if gov.is_match(title) {
        Category::GovStake
    } else if ceo.is_match(title) {
        Category::CEOResignation
    } else if ma.is_match(title) {
        Category::MergerAcquisition
    } else if earnings.is_match(title) {
        Category::Earnings
    } else if contract.is_match(title) {
        Category::Contract
    } else {
        Category::News
    }
}

/// Uppercase tokens that look like tickers but are common false positives.
static STOP_UPPER: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "THE", "AND", "FOR", "WITH", "FROM", "THIS", "THAT", "WAS", "WILL", "HAVE", "HAS", "USA",
        "US", "CEO", "CFO", "DOE", "DOD", "IPO", "ETF", "FDA", "SEC", "EU", "UK", "LITHIUM",
        "OIL", "GAS", "BANK", "NEWS", "MERGER", "ACQUISITION", "Q1", "Q2", "Q3", "Q4",
    ]
    .into_iter()
    .collect()
});

/// Scan a headline for plausible ticker symbols: uppercase tokens of
/// length 2–5, minus the stoplist, first-occurrence order, at most 6.
pub fn guess_tickers(title: &str) -> Vec<String> {
    static UPPER_TOKEN: OnceCell<Regex> = OnceCell::new();
    let token = re(&UPPER_TOKEN, r"\b[A-Z]{2,5}\b");

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in token.find_iter(title) {
        let tok = m.as_str();
        if STOP_UPPER.contains(tok) || !seen.insert(tok) {
            continue;
        }
        out.push(tok.to_string());
        if out.len() == 6 {
            break;
        }
    }
    out
}

/// Stateless-per-record enricher; carries only the detector capability.
#[derive(Clone)]
pub struct Enricher {
    detector: LangDetector,
}

impl Enricher {
    pub fn new(detector: LangDetector) -> Self {
        Self { detector }
    }

    /// Produce exactly one `Event` from a normalized record.
    pub fn enrich(&self, rec: &NormalizedRecord) -> Event {
        let language = if rec.language.is_empty() {
            normalize_lang(&(self.detector)(&rec.title))
        } else {
            normalize_lang(&rec.language)
        };

        let headline = if rec.title.is_empty() {
            NO_TITLE.to_string()
        } else {
            rec.title.clone()
        };
        let summary = if rec.domain.is_empty() {
            String::new()
        } else {
            format!("Source: {}", rec.domain)
        };

        Event {
            tickers: guess_tickers(&rec.title),
            category: classify(&rec.title),
            headline,
            summary,
            url: rec.url.clone(),
            ts: to_iso_utc(&rec.date),
            domain: rec.domain.clone(),
            language,
        }
    }
}

/// Synthetic event emitted once at startup so a fresh frontend shows the
/// pipeline is alive before the first fetch completes.
pub fn seed_event() -> Event {
    Event {
        headline: "Feed connected".to_string(),
        summary: "Live news relay is up".to_string(),
        tickers: vec!["TEST".to_string()],
        category: Category::Info,
        url: String::new(),
        ts: iso_now_utc(),
        domain: String::new(),
        language: "en".to_string(),
    }
}
