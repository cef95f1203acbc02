use async_trait::async_trait;

use crate::engine::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

/// One-way channel from a run to whoever triggered it.
///
/// Delivery is best effort: implementations log their own transport errors
/// and never fail the run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn status(&self, status: Status, text: &str);

    /// Live delivery of the finished balance.
    async fn report(&self, report: &Report);

    /// Terminal signal. Sent exactly once per run, on success and on failure.
    async fn stop(&self);
}
