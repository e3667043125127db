//! Moves raw artifacts into their canonical product slots.

use crate::archive;
use crate::category::{CanonicalCategory, ContainerFormat};
use crate::classifier;
use crate::error::Result;
use crate::format::{is_archive_name, is_pdf, looks_like_zip};
use crate::product::ProductContext;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What happened to one file during promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Promoted {
        category: CanonicalCategory,
        path: PathBuf,
    },
    /// No rule claimed the file.
    Discarded { name: String },
    /// Classified, but failed the category's format check.
    Rejected {
        name: String,
        category: CanonicalCategory,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionReport {
    pub dispositions: Vec<Disposition>,
}

impl PromotionReport {
    pub fn promoted(&self) -> impl Iterator<Item = (CanonicalCategory, &Path)> {
        self.dispositions.iter().filter_map(|d| match d {
            Disposition::Promoted { category, path } => Some((*category, path.as_path())),
            _ => None,
        })
    }

    fn push(&mut self, disposition: Disposition) {
        self.dispositions.push(disposition);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Promote a raw artifact into `dest`.
///
/// Every archive is unpacked next to the artifact and each contained file is
/// promoted on its own; archives found inside are not unpacked again. Loose
/// CAD files of one kind from the same archive share one slot archive. A
/// corrupt outer archive is logged and skipped.
pub fn promote(raw: &Path, product: &ProductContext, dest: &Path) -> Result<PromotionReport> {
    let mut report = PromotionReport::default();
    let name = display_name(raw);

    if !looks_like_zip(raw) {
        promote_file(raw, product, dest, &mut report)?;
        return Ok(report);
    }

    let parent = raw.parent().unwrap_or_else(|| Path::new("."));
    let unpacked = tempfile::Builder::new()
        .prefix("unpacked-")
        .tempdir_in(parent)?;
    let files = match archive::extract_all(raw, unpacked.path()) {
        Ok(files) => files,
        Err(err) => {
            warn!("{}: could not unpack {}: {}", product.code, name, err);
            return Ok(report);
        }
    };
    debug!("{}: {} file(s) in {}", product.code, files.len(), name);

    let mut loose_cad: Vec<(CanonicalCategory, Vec<PathBuf>)> = Vec::new();
    for file in files {
        let member = display_name(&file);
        let category = classifier::classify(&member, product)
            .filter(|c| c.cad_kind().is_some() && !is_archive_name(&member) && !looks_like_zip(&file));
        match category {
            Some(category) => match loose_cad.iter_mut().find(|(c, _)| *c == category) {
                Some((_, group)) => group.push(file),
                None => loose_cad.push((category, vec![file])),
            },
            None => promote_file(&file, product, dest, &mut report)?,
        }
    }
    for (category, group) in loose_cad {
        promote_loose_cad(&group, category, product, dest, &mut report)?;
    }
    Ok(report)
}

fn promote_file(
    file: &Path,
    product: &ProductContext,
    dest: &Path,
    report: &mut PromotionReport,
) -> Result<()> {
    let name = display_name(file);
    let Some(category) = classifier::classify(&name, product) else {
        debug!("{}: discarding unclassified {}", product.code, name);
        report.push(Disposition::Discarded { name });
        return Ok(());
    };
    let target = dest.join(category.file_name(&product.code));

    match category.format() {
        ContainerFormat::Pdf => {
            if !is_pdf(file) {
                debug!("{}: {} is not a PDF, not promoting", product.code, name);
                report.push(Disposition::Rejected {
                    name,
                    category,
                    reason: "missing %PDF signature".into(),
                });
                return Ok(());
            }
            fs::copy(file, &target)?;
        }
        ContainerFormat::Zip => {
            let Some(kind) = category.cad_kind() else {
                return Ok(());
            };
            if is_archive_name(&name) || looks_like_zip(file) {
                fs::copy(file, &target)?;
            } else {
                archive::wrap_single(file, &archive::bare_entry_name(&name, kind), &target)?;
            }
            return finish_cad_slot(&name, category, target, product, report);
        }
    }

    info!(code = %product.code, %category, "Promoted {} -> {}", name, display_name(&target));
    report.push(Disposition::Promoted {
        category,
        path: target,
    });
    Ok(())
}

fn promote_loose_cad(
    files: &[PathBuf],
    category: CanonicalCategory,
    product: &ProductContext,
    dest: &Path,
    report: &mut PromotionReport,
) -> Result<()> {
    let Some(kind) = category.cad_kind() else {
        return Ok(());
    };
    let target = dest.join(category.file_name(&product.code));
    let entries: Vec<(PathBuf, String)> = files
        .iter()
        .map(|file| (file.clone(), archive::bare_entry_name(&display_name(file), kind)))
        .collect();
    archive::wrap_files(&entries, &target)?;
    let names: Vec<String> = files.iter().map(|file| display_name(file)).collect();
    finish_cad_slot(&names.join(", "), category, target, product, report)
}

/// Sanitize a freshly written CAD slot; drop it when nothing usable is left.
fn finish_cad_slot(
    name: &str,
    category: CanonicalCategory,
    target: PathBuf,
    product: &ProductContext,
    report: &mut PromotionReport,
) -> Result<()> {
    let Some(kind) = category.cad_kind() else {
        return Ok(());
    };
    let reason = match archive::sanitize(&target, kind) {
        Ok(sanitized) if sanitized.nothing_kept() => Some(format!("no {:?} entries", kind)),
        Ok(_) => None,
        Err(err) => Some(err.to_string()),
    };
    if let Some(reason) = reason {
        warn!("{}: dropping {} ({})", product.code, name, reason);
        fs::remove_file(&target)?;
        report.push(Disposition::Rejected {
            name: name.to_string(),
            category,
            reason,
        });
        return Ok(());
    }

    info!(code = %product.code, %category, "Promoted {} -> {}", name, display_name(&target));
    report.push(Disposition::Promoted {
        category,
        path: target,
    });
    Ok(())
}
