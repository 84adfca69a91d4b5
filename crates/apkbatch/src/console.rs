//! Operator-facing console output.
//!
//! Everything the operator reads goes through a [`Reporter`], which is passed
//! to the components that need it. Diagnostics go to `tracing` instead.

#[cfg(test)]
mod memory;
mod terminal;

#[cfg(test)]
pub use memory::{MemoryReporter, Tone};
pub use terminal::TerminalReporter;

/// Sink for console messages and download progress
pub trait Reporter: Send + Sync {
    /// Neutral progress information
    fn info(&self, message: &str);
    fn success(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    /// Batch summaries and other lines that should stand out
    fn highlight(&self, message: &str);
    /// Prompt text printed without a trailing newline
    fn prompt(&self, message: &str);
    /// Starts a progress display for one transfer. `total` is `None` when unknown.
    fn progress(&self, label: &str, total: Option<u64>) -> Box<dyn ProgressSink>;
}

/// Receives byte counts for a single transfer
pub trait ProgressSink: Send + Sync {
    fn advance(&self, bytes: u64);
    fn finish(&self);
    fn abandon(&self);
}

/// Progress sink that discards everything
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _bytes: u64) {}
    fn finish(&self) {}
    fn abandon(&self) {}
}
