use std::path::{Path, PathBuf};

/// Identity of one catalog item. Built once at discovery time and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductContext {
    pub code: String,
    pub series_name: String,
    pub series_url: String,
    pub product_url: String,
}

impl ProductContext {
    pub fn new(raw_code: &str, series_name: &str, series_url: &str, product_url: &str) -> Self {
        Self {
            code: sanitize_code(raw_code),
            series_name: series_name.trim().to_string(),
            series_url: series_url.to_string(),
            product_url: product_url.to_string(),
        }
    }

    /// False for codes that would not name a directory of their own.
    pub fn has_usable_code(&self) -> bool {
        is_usable_code(&self.code)
    }

    pub fn directory(&self, output_root: &Path) -> PathBuf {
        output_root.join(&self.code)
    }

    /// Filter entries may name either the code or the product URL.
    pub fn matches_filter(&self, filter: &str) -> bool {
        self.code == filter || self.product_url == filter
    }
}

/// Make a product label safe to use as a directory name and filename stem.
pub fn sanitize_code(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            other => other,
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_usable_code(code: &str) -> bool {
    !code.is_empty() && code != "." && code != ".."
}
