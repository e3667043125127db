use crate::acquire::{Acquirer, ProductOutcome};
use crate::config::AppConfig;
use crate::driver::SessionDriver;
use crate::error::{Error, Result};
use crate::identity::read_identity_list;
use crate::product::ProductContext;
use crate::progress::ProgressReporter;
use crate::scratch::ScratchArea;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct CrawlEngine {
    config: AppConfig,
}

#[derive(Debug, Default)]
pub struct CrawlSummary {
    /// RFC 3339 timestamp of the run start.
    pub started_at: String,
    pub series: usize,
    pub completed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
    pub duration: Duration,
}

impl CrawlSummary {
    pub fn processed(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

impl CrawlEngine {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Series to crawl: explicit URLs and the series file, or the catalog's
    /// own index when neither names any.
    fn series_urls<D: SessionDriver + ?Sized>(&self, driver: &mut D) -> Result<Vec<String>> {
        let mut urls = self.config.series_urls.clone();
        if let Some(path) = &self.config.series_file {
            urls.extend(read_identity_list(path)?);
        }
        if urls.is_empty() {
            urls = driver.series_index()?;
            debug!("Discovered {} series from the index", urls.len());
        }
        Ok(urls)
    }

    fn product_filters(&self) -> Result<Vec<String>> {
        match &self.config.product_file {
            Some(path) => read_identity_list(path),
            None => Ok(Vec::new()),
        }
    }

    /// Crawl every selected product, one at a time.
    ///
    /// Per-product failures are recorded in the summary. Authentication
    /// failures and interrupts end the run with an error.
    pub fn run<D: SessionDriver + ?Sized>(
        &self,
        driver: &mut D,
        scratch: &ScratchArea,
        reporter: &dyn ProgressReporter,
        cancel: &AtomicBool,
    ) -> Result<CrawlSummary> {
        let start = Instant::now();
        let started_at = chrono::Utc::now().to_rfc3339();
        driver.authenticate(&self.config.credentials())?;
        info!("Authenticated");

        let series_urls = self.series_urls(driver)?;
        let filters = self.product_filters()?;
        let limit = self.config.max_products;
        reporter.on_run_start(series_urls.len());

        let mut summary = CrawlSummary {
            started_at,
            series: series_urls.len(),
            ..CrawlSummary::default()
        };

        'series: for series_url in &series_urls {
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }
            let mut products = match driver.list_products(series_url) {
                Ok(products) => products,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("Skipping series {}: {}", series_url, err);
                    continue;
                }
            };
            products.retain(|p: &ProductContext| {
                if !p.has_usable_code() {
                    warn!("Ignoring product with unusable code {:?} at {}", p.code, p.product_url);
                }
                p.has_usable_code()
            });
            if !filters.is_empty() {
                products.retain(|p: &ProductContext| filters.iter().any(|f| p.matches_filter(f)));
            }
            info!("Series {}: {} product(s)", series_url, products.len());
            reporter.on_series_start(series_url, products.len());

            for product in &products {
                if limit > 0 && summary.processed() >= limit {
                    info!("Reached max_products ({})", limit);
                    break 'series;
                }
                let mut acquirer = Acquirer::new(&mut *driver, scratch, &self.config, reporter, cancel);
                match acquirer.process(product) {
                    Ok(ProductOutcome::Complete) => summary.completed.push(product.code.clone()),
                    Ok(ProductOutcome::Failed(reason)) => {
                        summary.failed.push((product.code.clone(), reason))
                    }
                    Ok(ProductOutcome::Skipped(_)) => summary.skipped.push(product.code.clone()),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        error!("Error processing {}: {}", product.code, err);
                        summary.failed.push((product.code.clone(), err.to_string()));
                    }
                }
            }
        }

        summary.duration = start.elapsed();
        reporter.on_run_complete(summary.completed.len(), summary.failed.len(), summary.skipped.len());
        info!(
            "Crawl finished in {:.2}s: {} complete, {} failed, {} skipped",
            summary.duration.as_secs_f64(),
            summary.completed.len(),
            summary.failed.len(),
            summary.skipped.len(),
        );
        Ok(summary)
    }
}
