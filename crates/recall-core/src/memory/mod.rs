//! The memory subsystem: short-term logs, long-term facts, and per-turn
//! context retrieval.
//!
//! Components, leaf first: [`session_store::SessionStore`],
//! [`short_term::ShortTermLog`], [`index::LongTermIndex`],
//! [`pruning::PruningPolicy`], [`retrieval::RetrievalEngine`].
//! [`service::MemoryService`] wires them together.

pub mod box_embedder;
pub mod clock;
pub mod command;
pub mod embedder;
pub mod index;
pub mod locks;
pub mod pruning;
pub mod retrieval;
pub mod retry;
pub mod service;
pub mod session_store;
pub mod short_term;
pub mod summarizer;
pub mod vector;
