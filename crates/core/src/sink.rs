//! Sink trait: the abstraction over log destinations.
//!
//! A sink receives every finished [`TokenLog`] exactly once. Destinations
//! (stdout, a callback, an HTTP collector, a queue) live outside the cost
//! pipeline; the pipeline only needs something it can hand a record to.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SinkError;
use crate::log::TokenLog;

/// The core sink trait.
///
/// Implementations may perform I/O. Errors are reported back to the
/// exporter, which records them per span and carries on with the batch.
#[async_trait]
pub trait TokenLogSink: Send + Sync {
    /// Human-readable sink name (e.g., "console", "webhook").
    fn name(&self) -> &str;

    /// Deliver one record.
    async fn handle(&self, log: &TokenLog) -> std::result::Result<(), SinkError>;
}

#[async_trait]
impl<S: TokenLogSink + ?Sized> TokenLogSink for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn handle(&self, log: &TokenLog) -> std::result::Result<(), SinkError> {
        (**self).handle(log).await
    }
}
