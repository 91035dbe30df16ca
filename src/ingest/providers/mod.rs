// src/ingest/providers/mod.rs
pub mod gdelt;
pub mod reuters_rss;
