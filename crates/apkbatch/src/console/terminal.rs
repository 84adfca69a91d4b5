use std::io::Write as _;

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::{ProgressSink, Reporter};

const BAR_TEMPLATE: &str =
    "{msg:20!} [{bar:40.blue/cyan}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}";
const SPINNER_TEMPLATE: &str = "{spinner:.blue} {msg:20!} {bytes} {bytes_per_sec}";

/// Colored terminal output with one progress bar per active download
#[derive(Debug, Default)]
pub struct TerminalReporter {
    bars: MultiProgress,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self, text: colored::ColoredString) {
        self.bars.suspend(|| println!("{text}"));
    }
}

impl Reporter for TerminalReporter {
    fn info(&self, message: &str) {
        self.line(message.normal());
    }

    fn success(&self, message: &str) {
        self.line(message.bright_green());
    }

    fn warn(&self, message: &str) {
        self.line(message.bright_yellow());
    }

    fn error(&self, message: &str) {
        self.line(message.bright_red().bold());
    }

    fn highlight(&self, message: &str) {
        self.line(message.bright_cyan().bold());
    }

    fn prompt(&self, message: &str) {
        self.bars.suspend(|| {
            print!("{}", message.bright_yellow());
            let _ = std::io::stdout().flush();
        });
    }

    fn progress(&self, label: &str, total: Option<u64>) -> Box<dyn ProgressSink> {
        let bar = match total {
            Some(total) if total > 0 => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            _ => {
                let bar = ProgressBar::no_length();
                if let Ok(style) = ProgressStyle::with_template(SPINNER_TEMPLATE) {
                    bar.set_style(style);
                }
                bar
            }
        };
        bar.set_message(label.to_string());
        Box::new(TerminalProgress(self.bars.add(bar)))
    }
}

struct TerminalProgress(ProgressBar);

impl ProgressSink for TerminalProgress {
    fn advance(&self, bytes: u64) {
        self.0.inc(bytes);
    }

    fn finish(&self) {
        self.0.finish_and_clear();
    }

    fn abandon(&self) {
        self.0.abandon();
    }
}
