//! # newsfeed
//!
//! News ingestion: listing discovery through a markdown fetch proxy, body
//! cleanup, LLM summaries and keyword tags, and map-reduce category digests.
//!
//! ## Modules
//!
//! - [`fetch`]: listing pagination, date filtering, body fetching
//! - [`processing`]: per-article step pipeline (noise, extraction, cleanup,
//!   summary, tags)
//! - [`chunking`]: token-budgeted digests over many articles
//! - [`pipeline`]: per-source runs, backfill, category digests
//! - [`storage`]: the repository boundary and its JSON-file implementation
//! - [`api`]: the generative backend boundary and its Gemini implementation
//! - [`config`], [`cost`], [`error`], [`models`], [`utils`], [`cli`]

pub mod api;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod cost;
pub mod error;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{NewsfeedError, Result};
