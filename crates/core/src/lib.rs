//! # spancost core
//!
//! Domain types, traits, and error definitions shared by the spancost
//! crates. This crate has **no pipeline logic**; it defines the output
//! record and the sink seam that every other crate builds against.
//!
//! ## Design Philosophy
//!
//! Destinations are defined as a trait here. Implementations live in the
//! telemetry crate or in the embedding application. This enables:
//! - Swapping destinations without touching the cost pipeline
//! - Easy testing with recording/failing sinks
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod log;
pub mod sink;

// Re-export key types at crate root for ergonomics
pub use error::{CatalogError, Error, Result, SinkError};
pub use log::TokenLog;
pub use sink::TokenLogSink;
