//! Shared domain types for Recall.
//!
//! This crate contains the domain types used across the memory subsystem:
//! Session, Message, Fact, RetrievalContext, the configuration surface,
//! and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod context;
pub mod error;
pub mod memory;
pub mod message;
pub mod session;
