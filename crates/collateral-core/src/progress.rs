use crate::product::ProductContext;

/// Trait for reporting crawl progress.
///
/// The CLI renders these with indicatif. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, _series: usize) {}
    fn on_series_start(&self, _series_url: &str, _products: usize) {}
    fn on_product_start(&self, _product: &ProductContext) {}
    fn on_attempt(&self, _product: &ProductContext, _attempt: u8, _max_attempts: u8) {}
    fn on_step(&self, _product: &ProductContext, _step: &str) {}
    fn on_product_finish(&self, _product: &ProductContext, _outcome: &str) {}
    fn on_run_complete(&self, _completed: usize, _failed: usize, _skipped: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
