use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use super::{ProgressSink, Reporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warn,
    Error,
    Highlight,
    Prompt,
}

/// Records every message in memory. Used to inspect operator output in tests.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<(Tone, String)>>,
    progress_bytes: Arc<AtomicU64>,
    progress_totals: Mutex<Vec<(String, Option<u64>)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Tone, String)> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    /// Messages of the given tone, in emission order
    pub fn messages(&self, tone: Tone) -> Vec<String> {
        self.lines().into_iter().filter(|(t, _)| *t == tone).map(|(_, m)| m).collect()
    }

    pub fn contains(&self, tone: Tone, needle: &str) -> bool {
        self.messages(tone).iter().any(|m| m.contains(needle))
    }

    /// Bytes reported across all progress sinks
    pub fn progress_bytes(&self) -> u64 {
        self.progress_bytes.load(Ordering::Relaxed)
    }

    pub fn progress_totals(&self) -> Vec<(String, Option<u64>)> {
        self.progress_totals.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn push(&self, tone: Tone, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((tone, message.to_string()));
        }
    }
}

impl Reporter for MemoryReporter {
    fn info(&self, message: &str) {
        self.push(Tone::Info, message);
    }

    fn success(&self, message: &str) {
        self.push(Tone::Success, message);
    }

    fn warn(&self, message: &str) {
        self.push(Tone::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Tone::Error, message);
    }

    fn highlight(&self, message: &str) {
        self.push(Tone::Highlight, message);
    }

    fn prompt(&self, message: &str) {
        self.push(Tone::Prompt, message);
    }

    fn progress(&self, label: &str, total: Option<u64>) -> Box<dyn ProgressSink> {
        if let Ok(mut totals) = self.progress_totals.lock() {
            totals.push((label.to_string(), total));
        }
        Box::new(CountingProgress(self.progress_bytes.clone()))
    }
}

struct CountingProgress(Arc<AtomicU64>);

impl ProgressSink for CountingProgress {
    fn advance(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    fn finish(&self) {}

    fn abandon(&self) {}
}
