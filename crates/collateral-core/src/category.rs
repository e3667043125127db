use glob::{Pattern, PatternError};
use std::fmt;
use std::path::Path;

/// Container a canonical file is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    Pdf,
    Zip,
}

impl ContainerFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Pdf => ".pdf",
            ContainerFormat::Zip => ".zip",
        }
    }
}

/// CAD payload a DXF/STEP archive must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CadKind {
    Dxf,
    Step,
}

impl CadKind {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            CadKind::Dxf => &["dxf"],
            CadKind::Step => &["stp", "step"],
        }
    }

    /// True when `name` ends in one of this kind's extensions (case-insensitive).
    pub fn matches_name(self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| self.extensions().contains(&ext.as_str()))
            .unwrap_or(false)
    }

    pub fn category(self) -> CanonicalCategory {
        match self {
            CadKind::Dxf => CanonicalCategory::Dxf,
            CadKind::Step => CanonicalCategory::Step,
        }
    }
}

/// The fixed set of documents a product directory is organized around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalCategory {
    Catalog,
    Dimension,
    Datasheet,
    Manual,
    Dxf,
    Step,
}

impl CanonicalCategory {
    pub const ALL: [CanonicalCategory; 6] = [
        CanonicalCategory::Catalog,
        CanonicalCategory::Dimension,
        CanonicalCategory::Dxf,
        CanonicalCategory::Step,
        CanonicalCategory::Manual,
        CanonicalCategory::Datasheet,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            CanonicalCategory::Catalog => "_Catalog",
            CanonicalCategory::Dimension => "_Dimension",
            CanonicalCategory::Datasheet => "_Datasheet",
            CanonicalCategory::Manual => "_Manual",
            CanonicalCategory::Dxf => "_DXF",
            CanonicalCategory::Step => "_STEP",
        }
    }

    pub fn format(self) -> ContainerFormat {
        match self {
            CanonicalCategory::Dxf | CanonicalCategory::Step => ContainerFormat::Zip,
            _ => ContainerFormat::Pdf,
        }
    }

    pub fn is_required(self) -> bool {
        matches!(
            self,
            CanonicalCategory::Catalog | CanonicalCategory::Dimension | CanonicalCategory::Dxf
        )
    }

    pub fn cad_kind(self) -> Option<CadKind> {
        match self {
            CanonicalCategory::Dxf => Some(CadKind::Dxf),
            CanonicalCategory::Step => Some(CadKind::Step),
            _ => None,
        }
    }

    /// `_Catalog.pdf`, `_DXF.zip`, ...
    pub fn slot_suffix(self) -> String {
        format!("{}{}", self.suffix(), self.format().extension())
    }

    /// `<code><suffix><ext>`. Repeat writes land on the same path.
    pub fn file_name(self, code: &str) -> String {
        format!("{}{}", code, self.slot_suffix())
    }

    /// Matches every file that claims this slot, including variants such as
    /// `X_Catalog_dup.pdf` left behind by interleaved attempts.
    pub fn slot_pattern(self) -> Result<Pattern, PatternError> {
        Pattern::new(&format!("*{}*{}", self.suffix(), self.format().extension()))
    }

    pub fn claims(self, file_name: &str) -> bool {
        self.slot_pattern()
            .map(|pattern| pattern.matches(file_name))
            .unwrap_or(false)
    }

    /// Slot a file name belongs to, if any. Longer suffix tokens never overlap,
    /// so the first claim is the only one.
    pub fn for_file_name(file_name: &str) -> Option<CanonicalCategory> {
        CanonicalCategory::ALL
            .into_iter()
            .find(|category| category.claims(file_name))
    }
}

impl fmt::Display for CanonicalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CanonicalCategory::Catalog => "Catalog",
            CanonicalCategory::Dimension => "Dimension",
            CanonicalCategory::Datasheet => "Datasheet",
            CanonicalCategory::Manual => "Manual",
            CanonicalCategory::Dxf => "DXF",
            CanonicalCategory::Step => "STEP",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_is_derived_from_code() {
        assert_eq!(CanonicalCategory::Catalog.file_name("ABC-100"), "ABC-100_Catalog.pdf");
        assert_eq!(CanonicalCategory::Dxf.file_name("ABC-100"), "ABC-100_DXF.zip");
        assert_eq!(CanonicalCategory::Step.file_name("ABC-100"), "ABC-100_STEP.zip");
    }

    #[test]
    fn test_required_set() {
        let required: Vec<_> = CanonicalCategory::ALL
            .into_iter()
            .filter(|c| c.is_required())
            .collect();
        assert_eq!(
            required,
            vec![
                CanonicalCategory::Catalog,
                CanonicalCategory::Dimension,
                CanonicalCategory::Dxf
            ]
        );
    }

    #[test]
    fn test_slot_pattern_claims_variants() {
        assert!(CanonicalCategory::Catalog.claims("X_Catalog.pdf"));
        assert!(CanonicalCategory::Catalog.claims("X_Catalog_dup.pdf"));
        assert!(!CanonicalCategory::Catalog.claims("X_Catalog.zip"));
        assert!(!CanonicalCategory::Dimension.claims("X_Datasheet.pdf"));
        assert_eq!(
            CanonicalCategory::for_file_name("X_STEP.zip"),
            Some(CanonicalCategory::Step)
        );
        assert_eq!(CanonicalCategory::for_file_name("notes.txt"), None);
    }

    #[test]
    fn test_cad_kind_extension_match() {
        assert!(CadKind::Dxf.matches_name("dir/foo.DXF"));
        assert!(CadKind::Step.matches_name("part.step"));
        assert!(CadKind::Step.matches_name("part.stp"));
        assert!(!CadKind::Step.matches_name("readme.txt"));
        assert!(!CadKind::Dxf.matches_name("dxf"));
    }
}
