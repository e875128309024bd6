//! Syncs syndication feeds into a local SQLite store and republishes newly
//! discovered entries to Twitter exactly once.

pub mod config;
pub mod feed;
pub mod publish;
pub mod storage;
pub mod util;
