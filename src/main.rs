//! News Alert Relay — Binary Entrypoint
//! Boots the Axum server and the two pipeline tasks (poller, broadcaster),
//! wired together by one internal channel.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_alert_relay::api::{self, AppState};
use news_alert_relay::broadcast::{run_broadcaster, Registry};
use news_alert_relay::config::FeedConfig;
use news_alert_relay::enrich::{unk_detector, whatlang_detector, Enricher};
use news_alert_relay::history::History;
use news_alert_relay::ingest::poller::Poller;
use news_alert_relay::ingest::providers::gdelt::GdeltSource;
use news_alert_relay::ingest::providers::reuters_rss::{ReutersRssSource, REUTERS_RSS_URL};
use news_alert_relay::ingest::FeedSource;
use news_alert_relay::metrics::Metrics;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - FEED_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("FEED_DEV_LOG").ok().is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_alert_relay=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    // Startup wiring failures are fatal on purpose.
    let cfg = FeedConfig::load().expect("Failed to load feed config");
    let metrics = Metrics::init(cfg.history_cap);

    let history = Arc::new(History::with_capacity(cfg.history_cap));
    let registry = Arc::new(Registry::new(history.clone()));
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    // Detection can be switched off for constrained deployments.
    let detector = if std::env::var("FEED_LANG_DETECT").as_deref() == Ok("0") {
        unk_detector()
    } else {
        whatlang_detector()
    };
    let enricher = Enricher::new(detector);

    let primary: Box<dyn FeedSource> =
        Box::new(GdeltSource::from_config(&cfg).expect("Failed to build feed source"));
    let fallback: Option<Box<dyn FeedSource>> =
        if std::env::var("FEED_RSS_FALLBACK").as_deref() == Ok("0") {
            None
        } else {
            Some(Box::new(
                ReutersRssSource::from_url(REUTERS_RSS_URL, cfg.fetch_timeout_secs)
                    .expect("Failed to build rss fallback"),
            ))
        };

    let poller = Poller::new(cfg, primary, fallback, enricher, tx);
    let poller_handle = tokio::spawn(poller.run());
    let broadcaster_handle = tokio::spawn(run_broadcaster(rx, history.clone(), registry.clone()));

    // Orderly stop for local runs; Shuttle tears the process down itself.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            news_alert_relay::shutdown(vec![poller_handle, broadcaster_handle]).await;
        }
    });

    let state = AppState { registry, history };
    let router = api::create_router(state).merge(metrics.router());

    Ok(router.into())
}
