//! CAD sub-acquisition through the embedded configurator.
//!
//! The configurator lives in its own ephemeral context. [`ConfiguratorContext`]
//! owns that context for the duration of the flow and closes it on every exit
//! path, errors and early returns included.

use crate::driver::{DownloadTarget, RowHandle, SessionDriver};
use crate::error::{Error, Result};
use crate::scratch::{PollSettings, ScratchArea};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, warn};

/// Neutral export format requested from the configurator.
pub const EXPORT_FORMAT: &str = "STEP AP214";

pub struct ConfiguratorContext<'a, D: SessionDriver + ?Sized> {
    driver: &'a mut D,
}

impl<'a, D: SessionDriver + ?Sized> ConfiguratorContext<'a, D> {
    /// Open the configurator for `row`. `None` when the row offers no CAD
    /// link or no context appeared.
    pub fn open(driver: &'a mut D, row: &RowHandle) -> Result<Option<Self>> {
        if !driver.open_cad_configurator(row)? {
            return Ok(None);
        }
        Ok(Some(Self { driver }))
    }
}

impl<D: SessionDriver + ?Sized> Deref for ConfiguratorContext<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.driver
    }
}

impl<D: SessionDriver + ?Sized> DerefMut for ConfiguratorContext<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.driver
    }
}

impl<D: SessionDriver + ?Sized> Drop for ConfiguratorContext<'_, D> {
    fn drop(&mut self) {
        if let Err(err) = self.driver.close_ephemeral_context() {
            warn!("Failed to close CAD configurator: {}", err);
        }
    }
}

/// Drive the configurator to a STEP download and stage the result.
///
/// Returns `Ok(None)` when the product has no CAD link or the download never
/// lands. Interrupts and other driver errors propagate; the context is closed
/// either way.
pub fn fetch_cad_archive<D: SessionDriver + ?Sized>(
    driver: &mut D,
    row: &RowHandle,
    code: &str,
    scratch: &ScratchArea,
    poll: PollSettings,
    cancel: &AtomicBool,
) -> Result<Option<PathBuf>> {
    let Some(mut context) = ConfiguratorContext::open(driver, row)? else {
        debug!("{}: no CAD configurator offered", code);
        return Ok(None);
    };

    if context.dismiss_consent_workaround()? {
        debug!("{}: followed consent workaround", code);
    }
    if !context.select_export_format(EXPORT_FORMAT)? {
        debug!("{}: no format selection, using configurator default", code);
    }
    if !context.start_generation()? {
        debug!("{}: generation control missing", code);
    }

    let ignore = scratch.snapshot()?;
    context.trigger_download(DownloadTarget::CadArchive)?;
    let landed = match scratch.wait_for_download("CAD", &ignore, poll, cancel) {
        Ok(path) => path,
        Err(err @ Error::DownloadTimeout { .. }) => {
            warn!("{}: {}", code, err);
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    drop(context);

    let staged = scratch.stage(&landed)?;
    info!("{}: CAD archive staged as {}", code, staged.display());
    Ok(Some(staged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Credentials, MirrorDriver};
    use std::fs;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    const CATALOG: &str = r#"
        [[series]]
        name = "Ring"
        url = "series/ring"

        [[series.products]]
        code = "ABC-100"
        cad = "assets/abc-100.zip"
        consent_gate = true

        [[series.products]]
        code = "NOCAD-1"
    "#;

    fn setup() -> (TempDir, ScratchArea, MirrorDriver) {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("assets")).unwrap();
        fs::write(tmp.path().join("assets/abc-100.zip"), vec![b'P'; 1200]).unwrap();
        fs::write(tmp.path().join("catalog.toml"), CATALOG).unwrap();
        let scratch = ScratchArea::create(false).unwrap();
        let mut driver = MirrorDriver::open(tmp.path(), &scratch.downloads_dir()).unwrap();
        driver.authenticate(&Credentials::default()).unwrap();
        driver.navigate("series/ring").unwrap();
        (tmp, scratch, driver)
    }

    fn poll() -> PollSettings {
        PollSettings {
            timeout: Duration::from_millis(500),
            interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_cad_download_is_staged_and_context_closed() {
        let (_tmp, scratch, mut driver) = setup();
        let row = driver.find_row("ABC-100").unwrap().unwrap();
        let cancel = AtomicBool::new(false);

        let staged = fetch_cad_archive(&mut driver, &row, "ABC-100", &scratch, poll(), &cancel)
            .unwrap()
            .unwrap();

        assert!(staged.starts_with(scratch.staging_dir()));
        assert!(scratch.list_files().unwrap().is_empty());
        assert!(!driver.has_open_context());
    }

    #[test]
    fn test_missing_cad_link_is_none() {
        let (_tmp, scratch, mut driver) = setup();
        let row = driver.find_row("NOCAD-1").unwrap().unwrap();
        let cancel = AtomicBool::new(false);

        let staged =
            fetch_cad_archive(&mut driver, &row, "NOCAD-1", &scratch, poll(), &cancel).unwrap();

        assert!(staged.is_none());
        assert!(!driver.has_open_context());
    }

    #[test]
    fn test_context_closed_when_interrupted() {
        let (_tmp, scratch, mut driver) = setup();
        let row = driver.find_row("ABC-100").unwrap().unwrap();
        let cancel = AtomicBool::new(true);

        let err = fetch_cad_archive(&mut driver, &row, "ABC-100", &scratch, poll(), &cancel)
            .unwrap_err();

        assert!(matches!(err, Error::Interrupted));
        assert!(!driver.has_open_context());
    }
}
