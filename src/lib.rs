// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod broadcast;
pub mod config;
pub mod enrich;
pub mod event;
pub mod history;
pub mod ingest;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::broadcast::{run_broadcaster, Registry};
pub use crate::config::FeedConfig;
pub use crate::event::{Category, Event, NormalizedRecord};
pub use crate::history::History;

use tokio::task::JoinHandle;

/// Stop the long-lived pipeline tasks: abort them, then await, keeping
/// only non-cancellation errors in the log.
pub async fn shutdown(handles: Vec<JoinHandle<()>>) {
    for h in &handles {
        h.abort();
    }
    for h in handles {
        if let Err(e) = h.await {
            if !e.is_cancelled() {
                tracing::warn!(error = ?e, "pipeline task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_suppresses_cancellation() {
        let h = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        // Must return promptly instead of propagating the JoinError.
        shutdown(vec![h]).await;
    }
}
