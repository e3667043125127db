use crate::error::{Error, Result};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tempfile::TempDir;
use tracing::{debug, info, trace, warn};

/// Suffixes browsers use for files that are still being written.
const IN_PROGRESS_SUFFIXES: &[&str] = &[".crdownload", ".part", ".partial"];

/// Names present in `downloads/` just before a download was triggered.
pub type IgnoreSet = HashSet<OsString>;

/// How long and how often [`ScratchArea::wait_for_download`] polls.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

/// Ephemeral holding area for files in transit from the catalog.
///
/// `downloads/` is where the session driver lands files; each landed file is
/// moved into `staging/` right away so the next download starts from an empty
/// directory. Dropping the area removes it unless it was opened with `keep`.
pub struct ScratchArea {
    dir: Option<TempDir>,
    root: PathBuf,
    keep: bool,
}

fn is_in_progress(name: &str) -> bool {
    IN_PROGRESS_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

enum Landing {
    Pending,
    Ignored,
    Fresh(SystemTime),
}

/// An entry that vanished between listing and `stat` was being renamed by the
/// browser, so it counts as still in progress.
fn landed_entry(name: &OsString, metadata: io::Result<fs::Metadata>, ignore: &IgnoreSet) -> Result<Landing> {
    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Landing::Pending),
        Err(err) => return Err(err.into()),
    };
    if !metadata.is_file() || ignore.contains(name) {
        return Ok(Landing::Ignored);
    }
    Ok(Landing::Fresh(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)))
}

fn clear_dir(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

impl ScratchArea {
    pub fn create(keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("collateral-download-")
            .tempdir()?;
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("downloads"))?;
        fs::create_dir_all(root.join("staging"))?;
        debug!("Scratch area at {}", root.display());
        Ok(Self {
            dir: Some(dir),
            root,
            keep,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the session driver must write downloads into.
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    /// Completed files currently in `downloads/`.
    pub fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(self.downloads_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn clear(&self) -> Result<()> {
        let removed = clear_dir(&self.downloads_dir())?;
        if removed > 0 {
            trace!("Cleared {} leftover download(s)", removed);
        }
        Ok(())
    }

    pub fn reset_staging(&self) -> Result<()> {
        clear_dir(&self.staging_dir())?;
        Ok(())
    }

    /// Must be taken immediately before triggering a download, never after.
    pub fn snapshot(&self) -> Result<IgnoreSet> {
        let mut names = IgnoreSet::new();
        for entry in fs::read_dir(self.downloads_dir())? {
            names.insert(entry?.file_name());
        }
        Ok(names)
    }

    /// Block until a new completed file lands in `downloads/`.
    ///
    /// A poll succeeds only when no in-progress marker is present and at least
    /// one file outside `ignore` exists; the most recently modified of those is
    /// returned.
    pub fn wait_for_download(
        &self,
        label: &str,
        ignore: &IgnoreSet,
        poll: PollSettings,
        cancel: &AtomicBool,
    ) -> Result<PathBuf> {
        let start = Instant::now();
        while start.elapsed() < poll.timeout {
            if cancel.load(Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }

            let mut pending = false;
            let mut fresh: Vec<(SystemTime, PathBuf)> = Vec::new();
            for entry in fs::read_dir(self.downloads_dir())? {
                let entry = entry?;
                let name = entry.file_name();
                if is_in_progress(&name.to_string_lossy()) {
                    pending = true;
                    continue;
                }
                match landed_entry(&name, entry.metadata(), ignore)? {
                    Landing::Pending => pending = true,
                    Landing::Ignored => {}
                    Landing::Fresh(modified) => fresh.push((modified, entry.path())),
                }
            }

            if !pending {
                if let Some((_, path)) = fresh.into_iter().max_by_key(|(modified, _)| *modified) {
                    debug!("{} download landed: {}", label, path.display());
                    return Ok(path);
                }
            }
            thread::sleep(poll.interval);
        }

        Err(Error::DownloadTimeout {
            label: label.to_string(),
            waited: start.elapsed(),
        })
    }

    /// Move a landed download out of `downloads/` into `staging/`.
    pub fn stage(&self, landed: &Path) -> Result<PathBuf> {
        let name = landed
            .file_name()
            .ok_or_else(|| Error::Other(format!("{} has no file name", landed.display())))?;
        let mut target = self.staging_dir().join(name);
        let mut n = 1;
        while target.exists() {
            target = self
                .staging_dir()
                .join(format!("{}-{}", n, name.to_string_lossy()));
            n += 1;
        }
        if fs::rename(landed, &target).is_err() {
            fs::copy(landed, &target)?;
            fs::remove_file(landed)?;
        }
        Ok(target)
    }

    /// Write bytes fetched through the session straight into `staging/`.
    pub fn stage_bytes(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let target = self.staging_dir().join(name);
        fs::write(&target, bytes)?;
        Ok(target)
    }

    pub fn staged_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(self.staging_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Release the area. Also runs on drop; calling it explicitly surfaces errors.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            if self.keep {
                let kept = dir.keep();
                info!("Keeping downloads in {}", kept.display());
            } else {
                dir.close()?;
            }
        }
        Ok(())
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("Failed to remove scratch area {}: {}", self.root.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};

    fn fast_poll(timeout_ms: u64) -> PollSettings {
        PollSettings {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_vanished_entry_counts_as_pending() {
        let gone = io::Error::new(io::ErrorKind::NotFound, "renamed");
        let name = OsString::from("model.zip.crdownload.tmp");
        assert!(matches!(
            landed_entry(&name, Err(gone), &IgnoreSet::new()).unwrap(),
            Landing::Pending
        ));

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(landed_entry(&name, Err(denied), &IgnoreSet::new()).is_err());
    }

    #[test]
    fn test_waits_out_in_progress_marker() {
        let scratch = ScratchArea::create(false).unwrap();
        let downloads = scratch.downloads_dir();
        let ignore = scratch.snapshot().unwrap();
        let cancel = AtomicBool::new(false);

        let writer = {
            let downloads = downloads.clone();
            thread::spawn(move || {
                let partial = downloads.join("batch.zip.crdownload");
                fs::write(&partial, b"partial").unwrap();
                thread::sleep(Duration::from_millis(35));
                fs::rename(&partial, downloads.join("batch.zip")).unwrap();
            })
        };

        let landed = scratch
            .wait_for_download("batch", &ignore, fast_poll(5_000), &cancel)
            .unwrap();
        writer.join().unwrap();
        assert_eq!(landed.file_name().unwrap(), "batch.zip");
    }

    #[test]
    fn test_ignores_files_present_before_trigger() {
        let scratch = ScratchArea::create(false).unwrap();
        fs::write(scratch.downloads_dir().join("stale.zip"), b"old").unwrap();
        let ignore = scratch.snapshot().unwrap();
        let cancel = AtomicBool::new(false);

        let err = scratch
            .wait_for_download("batch", &ignore, fast_poll(60), &cancel)
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_returns_most_recent_new_file() {
        let scratch = ScratchArea::create(false).unwrap();
        let ignore = scratch.snapshot().unwrap();
        let older = scratch.downloads_dir().join("a.zip");
        let newer = scratch.downloads_dir().join("b.zip");
        fs::write(&older, b"a").unwrap();
        fs::write(&newer, b"b").unwrap();
        set_file_mtime(&older, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
        set_file_mtime(&newer, FileTime::from_unix_time(1_700_000_100, 0)).unwrap();

        let cancel = AtomicBool::new(false);
        let landed = scratch
            .wait_for_download("batch", &ignore, fast_poll(1_000), &cancel)
            .unwrap();
        assert_eq!(landed, newer);
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let scratch = ScratchArea::create(false).unwrap();
        let ignore = scratch.snapshot().unwrap();
        let cancel = AtomicBool::new(true);
        let err = scratch
            .wait_for_download("CAD", &ignore, fast_poll(1_000), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }

    #[test]
    fn test_stage_moves_file_and_clear_empties_downloads() {
        let scratch = ScratchArea::create(false).unwrap();
        let landed = scratch.downloads_dir().join("x.pdf");
        fs::write(&landed, b"%PDF").unwrap();
        fs::write(scratch.downloads_dir().join("leftover.tmp"), b"x").unwrap();

        let staged = scratch.stage(&landed).unwrap();
        assert!(!landed.exists());
        assert_eq!(scratch.staged_files().unwrap(), vec![staged]);

        scratch.clear().unwrap();
        assert!(scratch.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_drop_removes_area_unless_kept() {
        let scratch = ScratchArea::create(false).unwrap();
        let root = scratch.root().to_path_buf();
        drop(scratch);
        assert!(!root.exists());

        let kept = ScratchArea::create(true).unwrap();
        let kept_root = kept.root().to_path_buf();
        kept.close().unwrap();
        assert!(kept_root.exists());
        fs::remove_dir_all(kept_root).unwrap();
    }
}
