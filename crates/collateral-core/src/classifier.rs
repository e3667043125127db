//! Maps arbitrarily named downloads to canonical categories.
//!
//! Filenames coming out of the catalog are inconsistent (localized labels,
//! vendor prefixes, bare CAD files), so classification is an ordered list of
//! rules. The first rule that yields a category wins; explicit keywords always
//! outrank structural guesses.

use crate::category::CanonicalCategory;
use crate::product::ProductContext;
use std::path::Path;

/// Keyword table scanned in order over the lower-cased file name.
pub const KEYWORDS: &[(&str, CanonicalCategory)] = &[
    ("manual", CanonicalCategory::Manual),
    ("catalog", CanonicalCategory::Catalog),
    ("dimension", CanonicalCategory::Dimension),
    ("dimension drawing", CanonicalCategory::Dimension),
    ("dxf", CanonicalCategory::Dxf),
    ("step", CanonicalCategory::Step),
    ("datasheet", CanonicalCategory::Datasheet),
    ("data sheet", CanonicalCategory::Datasheet),
];

/// Pre-digested view of a file name the rules run against.
#[derive(Debug)]
pub struct Candidate {
    pub name: String,
    pub stem: String,
    pub extension: String,
    pub code: String,
}

impl Candidate {
    pub fn new(file_name: &str, code: &str) -> Self {
        let name = file_name.to_lowercase();
        let stem = name.split('.').next().unwrap_or_default().to_string();
        let extension = Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            stem,
            extension,
            code: code.to_lowercase(),
        }
    }
}

pub struct Rule {
    pub name: &'static str,
    apply: fn(&Candidate) -> Option<CanonicalCategory>,
}

impl Rule {
    pub fn apply(&self, candidate: &Candidate) -> Option<CanonicalCategory> {
        (self.apply)(candidate)
    }
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "keyword",
        apply: keyword_rule,
    },
    Rule {
        name: "prefix",
        apply: prefix_rule,
    },
    Rule {
        name: "datasheet-substring",
        apply: datasheet_rule,
    },
    Rule {
        name: "dimension-heuristic",
        apply: dimension_rule,
    },
    Rule {
        name: "code-pdf",
        apply: code_pdf_rule,
    },
    Rule {
        name: "cad-extension",
        apply: cad_extension_rule,
    },
];

fn keyword_rule(c: &Candidate) -> Option<CanonicalCategory> {
    KEYWORDS
        .iter()
        .find(|(keyword, _)| c.name.contains(keyword))
        .map(|(_, category)| *category)
}

fn prefix_rule(c: &Candidate) -> Option<CanonicalCategory> {
    if c.name.starts_with("c_") {
        Some(CanonicalCategory::Catalog)
    } else if c.name.starts_with("d_") {
        Some(CanonicalCategory::Dimension)
    } else if c.name.starts_with("m_") && !c.name.contains("datasheet") {
        Some(CanonicalCategory::Manual)
    } else {
        None
    }
}

fn datasheet_rule(c: &Candidate) -> Option<CanonicalCategory> {
    (c.name.contains("datasheet") || c.name.contains("data-sheet"))
        .then_some(CanonicalCategory::Datasheet)
}

fn dimension_rule(c: &Candidate) -> Option<CanonicalCategory> {
    let named = c.stem.contains("dimension") || c.stem.contains("drawing");
    let coded = !c.code.is_empty() && c.stem.ends_with("_e") && c.stem.starts_with(&c.code);
    (named || coded).then_some(CanonicalCategory::Dimension)
}

fn code_pdf_rule(c: &Candidate) -> Option<CanonicalCategory> {
    (!c.code.is_empty() && c.name.contains(&c.code) && c.extension == "pdf")
        .then_some(CanonicalCategory::Datasheet)
}

fn cad_extension_rule(c: &Candidate) -> Option<CanonicalCategory> {
    matches!(c.extension.as_str(), "stp" | "step").then_some(CanonicalCategory::Step)
}

/// Category for `file_name`, or `None` when the file should be discarded.
pub fn classify(file_name: &str, product: &ProductContext) -> Option<CanonicalCategory> {
    explain(file_name, product).map(|(_, category)| category)
}

/// Like [`classify`] but also names the rule that decided.
pub fn explain(file_name: &str, product: &ProductContext) -> Option<(&'static str, CanonicalCategory)> {
    let candidate = Candidate::new(file_name, &product.code);
    RULES
        .iter()
        .find_map(|rule| rule.apply(&candidate).map(|category| (rule.name, category)))
}
