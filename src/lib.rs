//! A personal feed aggregator.
//!
//! Tracks RSS/Atom feed URLs, fetches them one at a time, merges newly seen
//! entries into a SQLite store and keeps read/unread state across runs.
//!
//! - [`feed`] - the ingestion pipeline: locate, fetch, parse, reconcile
//! - [`storage`] - the SQLite store
//! - [`app`] - the pipeline wired to the store
//! - [`config`] - `config.toml` loading
//! - [`util`] - URL validation and terminal-safe text

pub mod app;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
