//! Memory components and repository trait definitions for Recall.
//!
//! This crate defines the "ports" (repository and capability traits) that the
//! infrastructure layer implements, and the components built on top of them:
//! session store, short-term log, pruning policy, long-term index, and
//! retrieval engine. It depends only on `recall-types` -- never on
//! `recall-infra` or any database/IO crate.

pub mod memory;
pub mod repository;
