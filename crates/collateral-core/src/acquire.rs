//! Per-product acquisition loop.
//!
//! A product moves `NotStarted -> AttemptInProgress(n) -> {Complete, Failed}`.
//! Every attempt gathers the image, manual, CAD archive and batch document
//! archive, promotes what landed and re-validates the directory. Only a
//! validator-confirmed directory is marked complete; anything else is removed
//! once attempts run out.

use crate::cad;
use crate::config::AppConfig;
use crate::driver::{DocumentColumn, DownloadTarget, RowHandle, SessionDriver};
use crate::error::{Error, Result};
use crate::product::ProductContext;
use crate::progress::ProgressReporter;
use crate::promote;
use crate::scratch::ScratchArea;
use crate::validator::{self, Validation, COMPLETE_MARKER, IMAGES_DIR};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const INCLUDE_COLUMNS: &[&str] = &["catalog", "pdf drawing", "dxf", "data sheet", "datasheet", "manual"];
const EXCLUDE_COLUMNS: &[&str] = &["warranty", "environmental", "handling precautions"];
const DEFAULT_IMAGE_EXTENSION: &str = ".png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    NotStarted,
    AttemptInProgress(u8),
    Complete,
    Failed,
}

/// Result of a best-effort step. Skips are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    Done(T),
    Skipped(String),
}

impl<T> StepOutcome<T> {
    /// Downgrade a step error to a skip. Fatal errors still propagate.
    pub fn best_effort(result: Result<T>) -> Result<Self> {
        match result {
            Ok(value) => Ok(StepOutcome::Done(value)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => Ok(StepOutcome::Skipped(err.to_string())),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StepOutcome::Done(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductOutcome {
    Complete,
    Failed(String),
    Skipped(String),
}

impl fmt::Display for ProductOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductOutcome::Complete => write!(f, "complete"),
            ProductOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            ProductOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

enum AttemptVerdict {
    Complete,
    Incomplete(String),
    RowMissing,
}

/// `//host/x` gets a scheme, `/x` is resolved against the site root.
pub fn normalize_asset_url(src: &str, site_base_url: &str) -> String {
    if src.starts_with("//") {
        format!("https:{}", src)
    } else if src.starts_with('/') {
        format!("{}{}", site_base_url.trim_end_matches('/'), src)
    } else {
        src.to_string()
    }
}

/// `.jpg` for `.../thumb.jpg?w=200`, `.png` when the path has none.
pub fn image_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    Path::new(last)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string())
}

/// Columns worth adding to the cart: any include keyword, no exclude keyword.
pub fn select_document_columns(columns: &[DocumentColumn]) -> Vec<DocumentColumn> {
    columns
        .iter()
        .filter(|column| {
            let label = column.label.trim().to_lowercase();
            !EXCLUDE_COLUMNS.iter().any(|word| label.contains(word))
                && INCLUDE_COLUMNS.iter().any(|word| label.contains(word))
        })
        .cloned()
        .collect()
}

fn describe(validation: &Validation) -> String {
    if validation.failures.is_empty() {
        return "incomplete".to_string();
    }
    validation
        .failures
        .iter()
        .map(|failure| match failure.category {
            Some(category) => format!("{} {}", category, failure.reason),
            None => failure.reason.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct Acquirer<'a, D: SessionDriver + ?Sized> {
    driver: &'a mut D,
    scratch: &'a ScratchArea,
    config: &'a AppConfig,
    reporter: &'a dyn ProgressReporter,
    cancel: &'a AtomicBool,
    state: AcquisitionState,
}

impl<'a, D: SessionDriver + ?Sized> Acquirer<'a, D> {
    pub fn new(
        driver: &'a mut D,
        scratch: &'a ScratchArea,
        config: &'a AppConfig,
        reporter: &'a dyn ProgressReporter,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            driver,
            scratch,
            config,
            reporter,
            cancel,
            state: AcquisitionState::NotStarted,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }

    /// Drive one product to a complete directory or to no directory at all.
    ///
    /// Only fatal errors are returned; the directory is removed before they
    /// propagate.
    pub fn process(&mut self, product: &ProductContext) -> Result<ProductOutcome> {
        self.state = AcquisitionState::NotStarted;
        if !product.has_usable_code() {
            warn!("Product at {} has no usable code, skipping", product.product_url);
            return Ok(ProductOutcome::Skipped("unusable product code".into()));
        }
        let dest = product.directory(&self.config.output_root);
        if dest.exists() && !self.config.overwrite {
            debug!("{}: {} exists, skipping", product.code, dest.display());
            return Ok(ProductOutcome::Skipped("already present".into()));
        }

        self.reporter.on_product_start(product);
        fs::create_dir_all(dest.join(IMAGES_DIR))?;
        let stale_marker = dest.join(COMPLETE_MARKER);
        if stale_marker.exists() {
            fs::remove_file(&stale_marker)?;
        }

        let outcome = match self.run_attempts(product, &dest) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.state = AcquisitionState::Failed;
                discard(&self.config.output_root, &dest);
                return Err(err);
            }
        };

        match &outcome {
            ProductOutcome::Complete => {
                if let Err(err) = validator::mark_complete(&dest) {
                    self.state = AcquisitionState::Failed;
                    discard(&self.config.output_root, &dest);
                    return Err(err);
                }
                self.state = AcquisitionState::Complete;
                info!(code = %product.code, "Product complete");
            }
            ProductOutcome::Failed(reason) => {
                self.state = AcquisitionState::Failed;
                warn!(code = %product.code, "Product failed: {}", reason);
                discard(&self.config.output_root, &dest);
            }
            ProductOutcome::Skipped(_) => {}
        }
        self.reporter.on_product_finish(product, &outcome.to_string());
        Ok(outcome)
    }

    fn run_attempts(&mut self, product: &ProductContext, dest: &Path) -> Result<ProductOutcome> {
        let max_attempts = self.config.acquisition.max_attempts;
        let mut last_reason = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            self.state = AcquisitionState::AttemptInProgress(attempt);
            self.reporter.on_attempt(product, attempt, max_attempts);
            info!(code = %product.code, attempt, "Starting attempt {}/{}", attempt, max_attempts);

            let verdict = match self.attempt(product, dest) {
                Ok(verdict) => verdict,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(code = %product.code, attempt, "Attempt aborted: {}", err);
                    AttemptVerdict::Incomplete(err.to_string())
                }
            };

            match verdict {
                AttemptVerdict::Complete => return Ok(ProductOutcome::Complete),
                AttemptVerdict::RowMissing => {
                    return Ok(ProductOutcome::Failed("product row not found".into()))
                }
                AttemptVerdict::Incomplete(reason) => {
                    info!(code = %product.code, attempt, "Incomplete: {}", reason);
                    last_reason = reason;
                }
            }
            if attempt < max_attempts {
                self.pause(self.config.acquisition.retry_pause());
            }
        }
        Ok(ProductOutcome::Failed(last_reason))
    }

    fn attempt(&mut self, product: &ProductContext, dest: &Path) -> Result<AttemptVerdict> {
        self.scratch.reset_staging()?;
        self.scratch.clear()?;

        self.reporter.on_step(product, "image");
        match StepOutcome::best_effort(self.fetch_image(product, dest))? {
            StepOutcome::Done(Some(path)) => debug!("{}: image at {}", product.code, path.display()),
            StepOutcome::Done(None) => debug!("{}: no thumbnail offered", product.code),
            StepOutcome::Skipped(reason) => debug!("{}: image skipped: {}", product.code, reason),
        }
        self.check_cancel()?;

        self.reporter.on_step(product, "manual");
        if let StepOutcome::Skipped(reason) = StepOutcome::best_effort(self.fetch_manual(product, dest))? {
            debug!("{}: manual skipped: {}", product.code, reason);
        }
        self.check_cancel()?;

        let Some(row) = self.resolve_row(product)? else {
            warn!("{}: product row not found on {}", product.code, product.series_url);
            return Ok(AttemptVerdict::RowMissing);
        };

        let cleared = self.driver.clear_download_cart()?;
        if cleared > 0 {
            debug!("{}: removed {} leftover cart item(s)", product.code, cleared);
        }

        self.reporter.on_step(product, "cad");
        self.scratch.clear()?;
        let poll = self.config.acquisition.poll();
        let cad = cad::fetch_cad_archive(&mut *self.driver, &row, &product.code, self.scratch, poll, self.cancel);
        if let StepOutcome::Skipped(reason) = StepOutcome::best_effort(cad)? {
            debug!("{}: CAD skipped: {}", product.code, reason);
        }
        self.check_cancel()?;

        self.reporter.on_step(product, "documents");
        let added = self.fill_cart(product, &row)?;
        if added == 0 {
            debug!("{}: nothing to add to the cart", product.code);
        } else {
            match StepOutcome::best_effort(self.fetch_batch(product))? {
                StepOutcome::Done(path) => debug!("{}: batch staged as {}", product.code, path.display()),
                StepOutcome::Skipped(reason) => warn!("{}: batch download skipped: {}", product.code, reason),
            }
        }
        self.check_cancel()?;

        self.reporter.on_step(product, "promote");
        for staged in self.scratch.staged_files()? {
            if let Err(err) = promote::promote(&staged, product, dest) {
                warn!("{}: could not promote {}: {}", product.code, staged.display(), err);
            }
        }

        for removed in validator::remove_invalid_pdfs(dest)? {
            warn!("{}: deleted invalid PDF {}", product.code, removed.display());
        }
        let validation = validator::validate(dest)?;
        if validation.complete {
            Ok(AttemptVerdict::Complete)
        } else {
            Ok(AttemptVerdict::Incomplete(describe(&validation)))
        }
    }

    /// Navigate to the series page and find the product's row by scanning.
    /// Re-navigates once if the first scan comes up empty.
    fn resolve_row(&mut self, product: &ProductContext) -> Result<Option<RowHandle>> {
        for _ in 0..2 {
            match self.driver.navigate(&product.series_url) {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!("{}: navigation failed: {}", product.code, err);
                    continue;
                }
            }
            self.pause(self.config.acquisition.interaction_delay());
            if let Some(row) = self.driver.find_row(&product.code)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn fetch_image(&mut self, product: &ProductContext, dest: &Path) -> Result<Option<PathBuf>> {
        let Some(row) = self.resolve_row(product)? else {
            return Err(Error::TransientUi(format!("no row for {}", product.code)));
        };
        let Some(src) = self.driver.thumbnail_url(&row)? else {
            return Ok(None);
        };
        let url = normalize_asset_url(&src, &self.config.site_base_url);
        let bytes = self.driver.fetch_via_session(&url)?;
        let target = dest
            .join(IMAGES_DIR)
            .join(format!("{}{}", product.code, image_extension(&url)));
        fs::write(&target, bytes)?;
        Ok(Some(target))
    }

    fn fetch_manual(&mut self, product: &ProductContext, dest: &Path) -> Result<Option<PathBuf>> {
        let name = format!("{}_Manual.pdf", product.code);
        if dest.join(&name).exists() && !self.config.overwrite {
            return Ok(None);
        }
        self.driver.navigate(&product.product_url)?;
        self.pause(self.config.acquisition.interaction_delay());
        let links = self.driver.manual_links()?;
        let Some(href) = links.iter().find(|href| href.to_lowercase().contains(".pdf")) else {
            return Ok(None);
        };
        let url = normalize_asset_url(href, &self.config.site_base_url);
        let bytes = self.driver.fetch_via_session(&url)?;
        Ok(Some(self.scratch.stage_bytes(&name, &bytes)?))
    }

    fn fill_cart(&mut self, product: &ProductContext, row: &RowHandle) -> Result<usize> {
        let columns = self.driver.document_columns()?;
        if self.config.dump_headers {
            let labels: Vec<&str> = columns.iter().map(|c| c.label.as_str()).collect();
            info!("Headers for {}: {:?}", product.code, labels);
        }
        let mut added = 0;
        for column in select_document_columns(&columns) {
            match StepOutcome::best_effort(self.driver.add_to_cart(row, &column))? {
                StepOutcome::Done(true) => added += 1,
                StepOutcome::Done(false) => {}
                StepOutcome::Skipped(reason) => {
                    debug!("{}: could not add {}: {}", product.code, column.label, reason)
                }
            }
            self.pause(self.config.acquisition.interaction_delay() / 2);
        }
        Ok(added)
    }

    fn fetch_batch(&mut self, product: &ProductContext) -> Result<PathBuf> {
        self.scratch.clear()?;
        let ignore = self.scratch.snapshot()?;
        self.driver.trigger_download(DownloadTarget::Batch)?;
        let landed = self.scratch.wait_for_download(
            "batch",
            &ignore,
            self.config.acquisition.poll(),
            self.cancel,
        )?;
        debug!("{}: batch landed as {}", product.code, landed.display());
        self.scratch.stage(&landed)
    }
}

/// Remove a product directory. Only direct children of the output root are
/// ever removed.
fn discard(output_root: &Path, dest: &Path) {
    let is_child = dest.parent() == Some(output_root)
        && matches!(dest.components().next_back(), Some(Component::Normal(_)));
    if !is_child {
        warn!("Refusing to remove {}: not a product directory under {}", dest.display(), output_root.display());
        return;
    }
    if dest.exists() {
        if let Err(err) = fs::remove_dir_all(dest) {
            warn!("Failed to remove {}: {}", dest.display(), err);
        }
    }
}
