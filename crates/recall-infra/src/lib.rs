//! Infrastructure layer for Recall.
//!
//! Implements the repository traits defined in `recall-core` on SQLite and
//! provides the concrete embedding and summarization providers, plus the
//! configuration loader.

pub mod config;
pub mod embedder;
pub mod sqlite;
pub mod summarizer;
