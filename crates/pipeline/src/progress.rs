use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}";

/// Terminal progress bar plus a shared completed-unit counter.
///
/// The counter is shared with the coordinator and only ever increases, so
/// callers can poll it across stages. The bar is hidden when disabled.
#[derive(Clone)]
pub struct Progress {
    bar: ProgressBar,
    completed: Arc<AtomicU64>,
}

impl Progress {
    pub fn new(total: usize, message: impl Into<String>, visible: bool, completed: Arc<AtomicU64>) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(total as u64);
            let style = ProgressStyle::default_bar()
                .template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            bar.set_style(style);
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(message.into());
        Self { bar, completed }
    }

    pub fn inc(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
