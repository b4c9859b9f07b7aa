//! Daily Trends - a news reader backend
//!
//! This crate aggregates news-search results across the reader's selected
//! categories, caches them, keeps bookmarks, and enriches articles with
//! readable content and optional summaries. Everything is served as a JSON API.

pub mod aggregator;
pub mod banner;
pub mod bookmarks;
pub mod chat;
pub mod config;
pub mod content;
pub mod entry_cache;
pub mod error;
pub mod feed_cache;
pub mod fetcher;
pub mod models;
pub mod routes;
pub mod session;
pub mod storage;
pub mod summary;
pub mod text;
pub mod translation;
