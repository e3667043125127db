//! Decides whether a product directory can be trusted.

use crate::archive;
use crate::category::{CanonicalCategory, ContainerFormat};
use crate::format::{is_pdf, MIN_ARTIFACT_BYTES};
use crate::error::Result;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const COMPLETE_MARKER: &str = ".complete";
pub const IMAGES_DIR: &str = "Images";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Missing,
    TooSmall(u64),
    NotPdf,
    EmptyArchive,
    CorruptArchive(String),
    CodeMismatch,
    MissingImage,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Missing => write!(f, "missing"),
            FailureReason::TooSmall(size) => {
                write!(f, "too small ({} bytes, need {})", size, MIN_ARTIFACT_BYTES)
            }
            FailureReason::NotPdf => write!(f, "not a PDF"),
            FailureReason::EmptyArchive => write!(f, "archive holds no matching CAD file"),
            FailureReason::CorruptArchive(err) => write!(f, "corrupt archive: {}", err),
            FailureReason::CodeMismatch => write!(f, "file name does not carry the product code"),
            FailureReason::MissingImage => write!(f, "no product image over {} bytes", MIN_ARTIFACT_BYTES),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintFailure {
    pub category: Option<CanonicalCategory>,
    pub file: Option<PathBuf>,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub complete: bool,
    /// Required categories with no acceptable file.
    pub missing: Vec<CanonicalCategory>,
    pub failures: Vec<ConstraintFailure>,
}

/// Files in `dir` that claim `category`'s slot, canonical name first.
pub fn slot_files(dir: &Path, category: CanonicalCategory) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if category.claims(&entry.file_name().to_string_lossy()) {
            files.push(entry.path());
        }
    }
    let code = dir_code(dir);
    let canonical = category.file_name(&code);
    files.sort_by_key(|path| (path.file_name().map(|n| n != canonical.as_str()), path.clone()));
    Ok(files)
}

fn dir_code(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Check a single file against its category's constraints.
pub fn check_file(path: &Path, category: CanonicalCategory, code: &str) -> Option<FailureReason> {
    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(_) => return Some(FailureReason::Missing),
    };
    if size < MIN_ARTIFACT_BYTES {
        return Some(FailureReason::TooSmall(size));
    }
    match category.format() {
        ContainerFormat::Pdf => {
            if !is_pdf(path) {
                return Some(FailureReason::NotPdf);
            }
        }
        ContainerFormat::Zip => {
            if let Some(kind) = category.cad_kind() {
                match archive::contains_kind(path, kind) {
                    Ok(true) => {}
                    Ok(false) => return Some(FailureReason::EmptyArchive),
                    Err(err) => return Some(FailureReason::CorruptArchive(err.to_string())),
                }
            }
        }
    }
    let named = path
        .file_name()
        .map(|name| name.to_string_lossy().contains(code))
        .unwrap_or(false);
    if !named {
        return Some(FailureReason::CodeMismatch);
    }
    None
}

/// `Images/` must hold at least one file over the size floor.
pub fn has_product_image(dir: &Path) -> bool {
    let images = dir.join(IMAGES_DIR);
    let Ok(entries) = fs::read_dir(images) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry
            .metadata()
            .map(|m| m.is_file() && m.len() > MIN_ARTIFACT_BYTES)
            .unwrap_or(false)
    })
}

/// Delete every file in a PDF slot that lacks the `%PDF` signature and return
/// the removed paths.
pub fn remove_invalid_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for category in CanonicalCategory::ALL {
        if category.format() != ContainerFormat::Pdf {
            continue;
        }
        for file in slot_files(dir, category)? {
            if !is_pdf(&file) {
                fs::remove_file(&file)?;
                removed.push(file);
            }
        }
    }
    Ok(removed)
}

/// Validate `dir` against the required/optional schema. The product code is
/// the directory name.
pub fn validate(dir: &Path) -> Result<Validation> {
    let code = dir_code(dir);
    let mut missing = Vec::new();
    let mut failures = Vec::new();

    for category in CanonicalCategory::ALL {
        let files = slot_files(dir, category)?;
        if files.is_empty() {
            if category.is_required() {
                missing.push(category);
                failures.push(ConstraintFailure {
                    category: Some(category),
                    file: None,
                    reason: FailureReason::Missing,
                });
            }
            continue;
        }

        let verdicts: Vec<(PathBuf, Option<FailureReason>)> = files
            .into_iter()
            .map(|file| {
                let verdict = check_file(&file, category, &code);
                (file, verdict)
            })
            .collect();
        if verdicts.iter().any(|(_, verdict)| verdict.is_none()) {
            continue;
        }
        if category.is_required() {
            missing.push(category);
        }
        failures.extend(verdicts.into_iter().filter_map(|(file, verdict)| {
            verdict.map(|reason| ConstraintFailure {
                category: Some(category),
                file: Some(file),
                reason,
            })
        }));
    }

    if !has_product_image(dir) {
        failures.push(ConstraintFailure {
            category: None,
            file: None,
            reason: FailureReason::MissingImage,
        });
    }

    Ok(Validation {
        complete: failures.is_empty(),
        missing,
        failures,
    })
}

pub fn is_marked_complete(dir: &Path) -> bool {
    dir.join(COMPLETE_MARKER).is_file()
}

/// Zero-byte sentinel; its existence is the whole contract.
pub fn mark_complete(dir: &Path) -> Result<()> {
    fs::write(dir.join(COMPLETE_MARKER), b"")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn pdf(size: usize) -> Vec<u8> {
        let mut data = b"%PDF-1.4\n".to_vec();
        data.resize(size, b'0');
        data
    }

    fn cad_zip(path: &Path, entries: &[(&str, usize)]) {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, size) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(&vec![b'x'; *size]).unwrap();
        }
        writer.finish().unwrap();
    }

    fn product_dir(root: &Path, code: &str) -> PathBuf {
        let dir = root.join(code);
        fs::create_dir_all(dir.join(IMAGES_DIR)).unwrap();
        fs::write(dir.join(format!("{}_Catalog.pdf", code)), pdf(2048)).unwrap();
        fs::write(dir.join(format!("{}_Dimension.pdf", code)), pdf(1536)).unwrap();
        cad_zip(
            &dir.join(format!("{}_DXF.zip", code)),
            &[("foo.dxf", 2000), ("readme.txt", 100)],
        );
        fs::write(dir.join(IMAGES_DIR).join(format!("{}.png", code)), vec![7u8; 5120]).unwrap();
        dir
    }

    #[test]
    fn test_complete_directory() {
        let tmp = tempdir().unwrap();
        let dir = product_dir(tmp.path(), "ABC-100");
        let validation = validate(&dir).unwrap();
        assert!(validation.complete, "{:?}", validation.failures);
        assert!(validation.missing.is_empty());
    }

    #[test]
    fn test_invalid_pdf_beside_valid_one_is_removed() {
        let tmp = tempdir().unwrap();
        let dir = product_dir(tmp.path(), "ABC-100");
        let stale = dir.join("ABC-100_Catalog_old.pdf");
        fs::write(&stale, vec![b'<'; 4096]).unwrap();

        assert_eq!(remove_invalid_pdfs(&dir).unwrap(), vec![stale.clone()]);

        assert!(!stale.exists());
        assert!(dir.join("ABC-100_Catalog.pdf").exists());
        assert!(validate(&dir).unwrap().complete);
    }

    #[test]
    fn test_missing_dxf() {
        let tmp = tempdir().unwrap();
        let dir = product_dir(tmp.path(), "ABC-100");
        fs::remove_file(dir.join("ABC-100_DXF.zip")).unwrap();
        let validation = validate(&dir).unwrap();
        assert!(!validation.complete);
        assert_eq!(validation.missing, vec![CanonicalCategory::Dxf]);
    }

    #[test]
    fn test_optional_absence_does_not_block() {
        let tmp = tempdir().unwrap();
        let dir = product_dir(tmp.path(), "ABC-100");
        assert!(slot_files(&dir, CanonicalCategory::Step).unwrap().is_empty());
        assert!(validate(&dir).unwrap().complete);
    }

    #[test]
    fn test_small_required_file_fails() {
        let tmp = tempdir().unwrap();
        let dir = product_dir(tmp.path(), "ABC-100");
        fs::write(dir.join("ABC-100_Catalog.pdf"), pdf(999)).unwrap();
        let validation = validate(&dir).unwrap();
        assert!(!validation.complete);
        assert_eq!(validation.missing, vec![CanonicalCategory::Catalog]);
        assert_eq!(validation.failures[0].reason, FailureReason::TooSmall(999));
    }

    #[test]
    fn test_bad_pdf_signature_fails() {
        let tmp = tempdir().unwrap();
        let dir = product_dir(tmp.path(), "ABC-100");
        fs::write(dir.join("ABC-100_Dimension.pdf"), vec![b'<'; 4096]).unwrap();
        let validation = validate(&dir).unwrap();
        assert!(!validation.complete);
        assert_eq!(validation.failures[0].reason, FailureReason::NotPdf);
    }

    #[test]
    fn test_present_optional_file_is_checked() {
        let tmp = tempdir().unwrap();
        let dir = product_dir(tmp.path(), "ABC-100");
        cad_zip(&dir.join("ABC-100_STEP.zip"), &[("notes.txt", 3000)]);
        let validation = validate(&dir).unwrap();
        assert!(!validation.complete);
        assert!(validation.missing.is_empty());
        assert_eq!(validation.failures[0].reason, FailureReason::EmptyArchive);
    }

    #[test]
    fn test_small_image_fails() {
        let tmp = tempdir().unwrap();
        let dir = product_dir(tmp.path(), "ABC-100");
        fs::write(dir.join(IMAGES_DIR).join("ABC-100.png"), vec![1u8; 1000]).unwrap();
        let validation = validate(&dir).unwrap();
        assert!(!validation.complete);
        assert_eq!(validation.failures[0].reason, FailureReason::MissingImage);
    }

    #[test]
    fn test_marker_round_trip() {
        let tmp = tempdir().unwrap();
        assert!(!is_marked_complete(tmp.path()));
        mark_complete(tmp.path()).unwrap();
        assert!(is_marked_complete(tmp.path()));
        assert_eq!(fs::metadata(tmp.path().join(COMPLETE_MARKER)).unwrap().len(), 0);
    }
}
