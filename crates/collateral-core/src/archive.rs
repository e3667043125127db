//! CAD archive normalization.
//!
//! A DXF/STEP slot always holds a zip whose entries are only files of the
//! matching CAD kind, flattened to their base names.

use crate::category::CadKind;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Result of [`sanitize`]. An empty `kept` with `changed == false` means the
/// archive carried nothing of the requested kind and was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub changed: bool,
    pub kept: Vec<String>,
}

impl Sanitized {
    pub fn nothing_kept(&self) -> bool {
        self.kept.is_empty()
    }
}

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|err| Error::FormatValidation {
        path: path.to_path_buf(),
        reason: format!("unreadable archive: {}", err),
    })
}

fn base_name(entry: &str) -> String {
    entry
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry)
        .to_string()
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Every entry name in the archive, directories included.
pub fn entry_names(path: &Path) -> Result<Vec<String>> {
    let archive = open(path)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// True when at least one entry carries the CAD kind's extension.
pub fn contains_kind(path: &Path, kind: CadKind) -> Result<bool> {
    Ok(entry_names(path)?
        .iter()
        .any(|name| !name.ends_with('/') && kind.matches_name(name)))
}

/// Drop every entry that is not a `kind` file and flatten the survivors.
///
/// Corrupt archives come back as `Err`; the caller decides whether that fails
/// the category. Applying this twice is a no-op the second time.
pub fn sanitize(path: &Path, kind: CadKind) -> Result<Sanitized> {
    let mut archive = open(path)?;
    let members: Vec<String> = archive.file_names().map(str::to_string).collect();
    let targets: Vec<String> = members
        .iter()
        .filter(|name| !name.ends_with('/') && kind.matches_name(name))
        .cloned()
        .collect();

    if targets.is_empty() {
        debug!("{} holds no {:?} entries", path.display(), kind);
        return Ok(Sanitized {
            changed: false,
            kept: Vec::new(),
        });
    }

    if targets.len() == members.len() {
        return Ok(Sanitized {
            changed: false,
            kept: targets.iter().map(|name| base_name(name)).collect(),
        });
    }

    let mut tmp = NamedTempFile::new_in(parent_dir(path))?;
    let mut kept = Vec::new();
    {
        let mut writer = ZipWriter::new(tmp.as_file_mut());
        let mut seen = HashSet::new();
        for name in &targets {
            let flat = base_name(name);
            if !seen.insert(flat.clone()) {
                warn!("Skipping duplicate entry {} in {}", name, path.display());
                continue;
            }
            let mut data = Vec::new();
            archive.by_name(name)?.read_to_end(&mut data)?;
            writer.start_file(flat.as_str(), options())?;
            writer.write_all(&data)?;
            kept.push(flat);
        }
        writer.finish()?;
    }
    drop(archive);
    tmp.persist(path).map_err(|err| err.error)?;

    debug!("Rewrote {} keeping {:?}", path.display(), kept);
    Ok(Sanitized {
        changed: true,
        kept,
    })
}

/// Entry name for a bare CAD file being wrapped: the base name with any leading
/// format label (`STEP_`, `dxf-`) removed, so `STEP_data.stp` becomes `data.stp`.
pub fn bare_entry_name(file_name: &str, kind: CadKind) -> String {
    let name = base_name(file_name);
    let label = match kind {
        CadKind::Dxf => "dxf",
        CadKind::Step => "step",
    };
    let lower = name.to_lowercase();
    for separator in ['_', '-'] {
        let prefix = format!("{}{}", label, separator);
        if lower.starts_with(&prefix) && name.len() > prefix.len() {
            return name[prefix.len()..].to_string();
        }
    }
    name
}

/// Build a fresh single-entry archive at `target` holding `source`.
pub fn wrap_single(source: &Path, entry_name: &str, target: &Path) -> Result<()> {
    wrap_files(&[(source.to_path_buf(), entry_name.to_string())], target)
}

/// Build a fresh archive at `target` from `(source, entry name)` pairs.
/// Repeated entry names keep the first file.
pub fn wrap_files(sources: &[(PathBuf, String)], target: &Path) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(parent_dir(target))?;
    {
        let mut writer = ZipWriter::new(tmp.as_file_mut());
        let mut seen = HashSet::new();
        for (source, entry_name) in sources {
            if !seen.insert(entry_name.as_str()) {
                warn!("Skipping duplicate entry {} for {}", entry_name, target.display());
                continue;
            }
            writer.start_file(entry_name.as_str(), options())?;
            let mut input = File::open(source)?;
            io::copy(&mut input, &mut writer)?;
        }
        writer.finish()?;
    }
    tmp.persist(target).map_err(|err| err.error)?;
    Ok(())
}

/// Unpack `archive_path` under `dest` and return every extracted regular file.
pub fn extract_all(archive_path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = open(archive_path)?;
    fs::create_dir_all(dest)?;
    archive.extract(dest)?;

    let mut files: Vec<PathBuf> = WalkDir::new(dest)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Error walking {}: {}", dest.display(), err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_sanitize_drops_readme_and_flattens() {
        let tmp = tempdir().unwrap();
        let zip = tmp.path().join("ABC-100_DXF.zip");
        write_zip(
            &zip,
            &[
                ("drawings/", b""),
                ("drawings/foo.dxf", b"0\nSECTION"),
                ("readme.txt", b"read me"),
            ],
        );

        let first = sanitize(&zip, CadKind::Dxf).unwrap();
        assert!(first.changed);
        assert_eq!(first.kept, vec!["foo.dxf".to_string()]);
        assert_eq!(entry_names(&zip).unwrap(), vec!["foo.dxf".to_string()]);

        let second = sanitize(&zip, CadKind::Dxf).unwrap();
        assert!(!second.changed);
        assert_eq!(second.kept, first.kept);
    }

    #[test]
    fn test_sanitize_leaves_archive_without_targets() {
        let tmp = tempdir().unwrap();
        let zip = tmp.path().join("X_STEP.zip");
        write_zip(&zip, &[("model.igs", b"igs"), ("readme.txt", b"r")]);
        let before = fs::read(&zip).unwrap();

        let outcome = sanitize(&zip, CadKind::Step).unwrap();
        assert!(!outcome.changed);
        assert!(outcome.nothing_kept());
        assert_eq!(fs::read(&zip).unwrap(), before);
    }

    #[test]
    fn test_sanitize_keeps_both_step_extensions() {
        let tmp = tempdir().unwrap();
        let zip = tmp.path().join("X_STEP.zip");
        write_zip(
            &zip,
            &[("a/one.stp", b"1"), ("b/two.STEP", b"2"), ("c/three.dxf", b"3")],
        );
        let outcome = sanitize(&zip, CadKind::Step).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.kept, vec!["one.stp".to_string(), "two.STEP".to_string()]);
    }

    #[test]
    fn test_corrupt_archive_is_not_sanitizable() {
        let tmp = tempdir().unwrap();
        let zip = tmp.path().join("X_DXF.zip");
        fs::write(&zip, b"PK\x03\x04 truncated garbage").unwrap();
        let err = sanitize(&zip, CadKind::Dxf).unwrap_err();
        assert!(matches!(err, Error::FormatValidation { .. }));
    }

    #[test]
    fn test_wrap_single_and_entry_name() {
        let tmp = tempdir().unwrap();
        let raw = tmp.path().join("STEP_data.stp");
        fs::write(&raw, b"ISO-10303-21;").unwrap();
        let target = tmp.path().join("XYZ_STEP.zip");

        let entry = bare_entry_name("STEP_data.stp", CadKind::Step);
        assert_eq!(entry, "data.stp");
        wrap_single(&raw, &entry, &target).unwrap();

        assert_eq!(entry_names(&target).unwrap(), vec!["data.stp".to_string()]);
        assert!(contains_kind(&target, CadKind::Step).unwrap());
        assert!(!contains_kind(&target, CadKind::Dxf).unwrap());
    }

    #[test]
    fn test_failed_wrap_leaves_no_partial_archive() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("XYZ");
        fs::create_dir(&dir).unwrap();
        let missing = tmp.path().join("gone.dxf");

        assert!(wrap_single(&missing, "gone.dxf", &dir.join("XYZ_DXF.zip")).is_err());

        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_wrap_files_keeps_first_of_duplicate_names() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.stp");
        let b = tmp.path().join("b.stp");
        fs::write(&a, b"ISO-10303-21; a").unwrap();
        fs::write(&b, b"ISO-10303-21; b").unwrap();
        let target = tmp.path().join("XYZ_STEP.zip");

        wrap_files(
            &[(a.clone(), "a.stp".into()), (b, "b.stp".into()), (a, "a.stp".into())],
            &target,
        )
        .unwrap();

        assert_eq!(entry_names(&target).unwrap(), vec!["a.stp", "b.stp"]);
    }

    #[test]
    fn test_bare_entry_name_without_label() {
        assert_eq!(bare_entry_name("model.stp", CadKind::Step), "model.stp");
        assert_eq!(bare_entry_name("dxf-part.dxf", CadKind::Dxf), "part.dxf");
        assert_eq!(bare_entry_name("stepper.stp", CadKind::Step), "stepper.stp");
    }

    #[test]
    fn test_extract_all_lists_nested_files() {
        let tmp = tempdir().unwrap();
        let zip = tmp.path().join("batch.zip");
        write_zip(&zip, &[("a/c_x.pdf", b"%PDF"), ("b.txt", b"b")]);
        let files = extract_all(&zip, &tmp.path().join("out")).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("a/c_x.pdf")));
    }
}
