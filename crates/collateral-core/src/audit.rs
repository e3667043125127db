//! Second pass over finished output.
//!
//! Only directories carrying the completion marker are touched. The pass
//! removes duplicates, deletes invalid PDFs and re-sanitizes CAD archives, and
//! reports everything else as warnings. It never adds or removes the marker.

use crate::archive;
use crate::category::{CanonicalCategory, ContainerFormat};
use crate::error::Result;
use crate::format::is_pdf;
use crate::validator::{has_product_image, is_marked_complete, slot_files};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Ok,
    Warn,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Ok => write!(f, "OK"),
            AuditStatus::Warn => write!(f, "WARN"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryAudit {
    pub product: String,
    pub path: PathBuf,
    pub status: AuditStatus,
    pub issues: Vec<String>,
    pub fixed: Vec<String>,
}

impl DirectoryAudit {
    fn new(path: &Path) -> Self {
        Self {
            product: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            status: AuditStatus::Ok,
            issues: Vec::new(),
            fixed: Vec::new(),
        }
    }

    fn issue(&mut self, issue: String) {
        self.status = AuditStatus::Warn;
        self.issues.push(issue);
    }
}

#[derive(Debug, Default)]
pub struct AuditReport {
    pub directories: Vec<DirectoryAudit>,
}

impl AuditReport {
    pub fn ok(&self) -> usize {
        self.directories
            .iter()
            .filter(|d| d.status == AuditStatus::Ok)
            .count()
    }

    pub fn warn(&self) -> usize {
        self.directories.len() - self.ok()
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn size_of(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Keep the single largest file per slot.
fn remove_duplicates(dir: &Path, audit: &mut DirectoryAudit) -> Result<()> {
    for category in CanonicalCategory::ALL {
        let files = slot_files(dir, category)?;
        if files.len() < 2 {
            continue;
        }
        let mut keep = &files[0];
        for file in &files[1..] {
            if size_of(file) > size_of(keep) {
                keep = file;
            }
        }
        for file in files.iter().filter(|f| *f != keep) {
            let size = size_of(file);
            fs::remove_file(file)?;
            audit.fixed.push(format!(
                "Removed duplicate {} ({} bytes), kept {}",
                name_of(file),
                size,
                name_of(keep)
            ));
        }
    }
    Ok(())
}

pub fn audit_directory(dir: &Path) -> Result<DirectoryAudit> {
    let mut audit = DirectoryAudit::new(dir);

    remove_duplicates(dir, &mut audit)?;

    for category in CanonicalCategory::ALL {
        if category.is_required() && slot_files(dir, category)?.is_empty() {
            audit.issue(format!("Missing required {}", category.slot_suffix()));
        }
    }

    for category in CanonicalCategory::ALL {
        if category.format() != ContainerFormat::Pdf {
            continue;
        }
        for pdf in slot_files(dir, category)? {
            if size_of(&pdf) == 0 || !is_pdf(&pdf) {
                let name = name_of(&pdf);
                audit.issue(format!("Invalid PDF: {}", name));
                fs::remove_file(&pdf)?;
                audit.fixed.push(format!("Deleted invalid PDF: {}", name));
            }
        }
    }

    for category in CanonicalCategory::ALL {
        let Some(kind) = category.cad_kind() else {
            continue;
        };
        for zip in slot_files(dir, category)? {
            let name = name_of(&zip);
            match archive::sanitize(&zip, kind) {
                Ok(sanitized) if sanitized.nothing_kept() => {
                    audit.issue(format!("{} zip missing expected CAD file: {}", category, name))
                }
                Ok(sanitized) if sanitized.changed => audit
                    .fixed
                    .push(format!("Cleaned {} zip: kept {:?}", category, sanitized.kept)),
                Ok(_) => {}
                Err(err) => {
                    debug!("{}: {}", name, err);
                    audit.issue(format!("Corrupt {} zip: {}", category, name));
                }
            }
        }
    }

    if !has_product_image(dir) {
        audit.issue("Missing or invalid product image in Images/".to_string());
    }

    Ok(audit)
}

/// Marked product directories directly under `roots`, sorted per root.
pub fn marked_directories(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for root in roots {
        if !root.is_dir() {
            warn!("Skipping missing root {}", root.display());
            continue;
        }
        let mut found: Vec<PathBuf> = fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && is_marked_complete(path))
            .collect();
        found.sort();
        dirs.extend(found);
    }
    Ok(dirs)
}

pub fn audit_roots(roots: &[PathBuf]) -> Result<AuditReport> {
    let dirs = marked_directories(roots)?;
    info!("Auditing {} product folder(s)", dirs.len());

    let directories = dirs
        .par_iter()
        .map(|dir| match audit_directory(dir) {
            Ok(audit) => audit,
            Err(err) => {
                warn!("Audit of {} failed: {}", dir.display(), err);
                let mut audit = DirectoryAudit::new(dir);
                audit.issue(format!("Audit failed: {}", err));
                audit
            }
        })
        .collect();

    Ok(AuditReport { directories })
}
