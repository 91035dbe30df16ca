// src/config.rs
//! Feed configuration: defaults, optional TOML/JSON file, env overrides.
//! Precedence: env var > config file > default.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "FEED_CONFIG_PATH";

const DEFAULT_QUERY: &str = "(stocks OR stock OR shares OR market OR earnings OR EPS OR revenue \
     OR acquisition OR merger OR resigns OR resignation OR contract OR lithium OR oil OR mining \
     OR semiconductor OR government)";

#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// GDELT DOC query expression.
    pub query: String,
    /// Base poll interval; also the value backoff resets to on success.
    pub poll_interval_secs: u64,
    /// Backoff ceiling after consecutive fetch failures.
    pub backoff_max_secs: u64,
    /// Upstream fetch timeout.
    pub fetch_timeout_secs: u64,
    /// Max records requested per fetch.
    pub batch_max: usize,
    /// Lookback window passed to the feed, e.g. "12h".
    pub timespan: String,
    /// History buffer capacity (events replayed to new subscribers).
    pub history_cap: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            poll_interval_secs: 30,
            backoff_max_secs: 300,
            fetch_timeout_secs: 12,
            batch_max: 120,
            timespan: "12h".to_string(),
            history_cap: 300,
        }
    }
}

/// File shape: every knob optional, missing values keep their defaults.
#[derive(Debug, Default, Deserialize)]
struct FeedConfigFile {
    query: Option<String>,
    poll_interval_secs: Option<u64>,
    backoff_max_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    batch_max: Option<usize>,
    timespan: Option<String>,
    history_cap: Option<usize>,
}

impl FeedConfig {
    /// Load using env var + fallbacks:
    /// 1) $FEED_CONFIG_PATH
    /// 2) config/feed.toml
    /// 3) config/feed.json
    /// then apply FEED_* env overrides on top.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("FEED_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let toml_p = PathBuf::from("config/feed.toml");
            let json_p = PathBuf::from("config/feed.json");
            if toml_p.exists() {
                Self::load_from(&toml_p)?
            } else if json_p.exists() {
                Self::load_from(&json_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env();
        Ok(cfg)
    }

    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading feed config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let file = parse_file(&content, &ext)?;
        Ok(Self::default().merged(file))
    }

    fn merged(mut self, f: FeedConfigFile) -> Self {
        if let Some(v) = f.query {
            self.query = v;
        }
        if let Some(v) = f.poll_interval_secs {
            self.poll_interval_secs = v;
        }
        if let Some(v) = f.backoff_max_secs {
            self.backoff_max_secs = v;
        }
        if let Some(v) = f.fetch_timeout_secs {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = f.batch_max {
            self.batch_max = v;
        }
        if let Some(v) = f.timespan {
            self.timespan = v;
        }
        if let Some(v) = f.history_cap {
            self.history_cap = v;
        }
        self
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("FEED_QUERY") {
            if !v.trim().is_empty() {
                self.query = v;
            }
        }
        if let Ok(v) = std::env::var("FEED_TIMESPAN") {
            if !v.trim().is_empty() {
                self.timespan = v;
            }
        }
        env_u64("FEED_POLL_INTERVAL_SECS", &mut self.poll_interval_secs);
        env_u64("FEED_BACKOFF_MAX_SECS", &mut self.backoff_max_secs);
        env_u64("FEED_FETCH_TIMEOUT_SECS", &mut self.fetch_timeout_secs);
        env_usize("FEED_BATCH_MAX", &mut self.batch_max);
        env_usize("FEED_HISTORY_CAP", &mut self.history_cap);
    }
}

fn env_u64(key: &str, slot: &mut u64) {
    if let Some(v) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn env_usize(key: &str, slot: &mut usize) {
    if let Some(v) = std::env::var(key).ok().and_then(|v| v.parse().ok()) {
        *slot = v;
    }
}

fn parse_file(s: &str, hint_ext: &str) -> Result<FeedConfigFile> {
    if hint_ext == "toml" {
        return toml::from_str(s).context("parsing feed config as TOML");
    }
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing feed config as JSON");
    }
    // No usable extension: try TOML first, then JSON.
    if let Ok(v) = toml::from_str(s) {
        return Ok(v);
    }
    serde_json::from_str(s).context("unsupported feed config format")
}
