use collateral_core::{ProductContext, ProgressReporter};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// CLI progress reporter: one spinner per product, a result line when it ends.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.take() {
                old.finish_and_clear();
            }
            *guard = Some(pb);
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    pub fn finish(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_series_start(&self, series_url: &str, products: usize) {
        eprintln!("{} {} ({} products)", "Series".bold(), series_url, products);
    }

    fn on_product_start(&self, product: &ProductContext) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("  {spinner:.cyan} {prefix} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_prefix(product.code.clone());
        pb.set_message("starting");
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_attempt(&self, product: &ProductContext, attempt: u8, max_attempts: u8) {
        self.with_bar(|pb| pb.set_prefix(format!("{} [{}/{}]", product.code, attempt, max_attempts)));
    }

    fn on_step(&self, _product: &ProductContext, step: &str) {
        self.with_bar(|pb| pb.set_message(step.to_string()));
    }

    fn on_product_finish(&self, product: &ProductContext, outcome: &str) {
        self.finish();
        if outcome == "complete" {
            eprintln!("  {} {}", "✓".green(), product.code);
        } else {
            eprintln!("  {} {} {}", "✗".red(), product.code, outcome.dimmed());
        }
    }
}
