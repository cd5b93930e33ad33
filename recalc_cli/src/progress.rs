use indicatif::{ProgressBar, ProgressStyle};
use recalc_core::{ProgressFactory, ProgressSink};
use std::io::IsTerminal;

/// One `indicatif` bar per traversal, sized by the remote count.
#[derive(Debug, Clone, Copy)]
pub struct TerminalProgress {
    visible: bool,
}

impl TerminalProgress {
    /// Bars are drawn only when `enabled` and stderr is a terminal.
    pub fn new(enabled: bool) -> Self {
        Self {
            visible: enabled && std::io::stderr().is_terminal(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

/// `{prefix}` carries the entity type.
fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {pos}/{len} [{bar:50}] {percent}% time remaining: {eta}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressFactory for TerminalProgress {
    fn start(&self, entity_type: &str, total: u64) -> Box<dyn ProgressSink> {
        let bar = if self.visible {
            ProgressBar::new(total)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(bar_style());
        bar.set_prefix(entity_type.to_string());
        Box::new(BarSink { bar })
    }
}

struct BarSink {
    bar: ProgressBar,
}

impl ProgressSink for BarSink {
    fn tick(&mut self, n: u64) {
        self.bar.inc(n);
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
