//! Seam to the interactive catalog session.
//!
//! The core never assumes a page structure beyond these capabilities. Row
//! handles are only valid until the next navigation; callers re-resolve them
//! by product code instead of holding on to them.

pub mod mirror;

pub use mirror::MirrorDriver;

use crate::error::Result;
use crate::product::ProductContext;

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// A product row as seen during one page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHandle {
    pub label: String,
    pub index: usize,
    /// Navigation generation the handle was issued in.
    pub generation: u64,
}

/// One header cell of the product document table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentColumn {
    pub index: usize,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Consolidated archive of everything in the pending-download cart.
    Batch,
    /// Generated CAD file inside the configurator context.
    CadArchive,
}

pub trait SessionDriver {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<()>;

    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Series pages listed on the catalog's series index.
    fn series_index(&mut self) -> Result<Vec<String>>;

    /// Product rows of a series page. Navigates.
    fn list_products(&mut self, series_url: &str) -> Result<Vec<ProductContext>>;

    /// Rows visible on the current page.
    fn visible_rows(&mut self) -> Result<Vec<RowHandle>>;

    /// Scan visible rows for the one whose label carries `code`.
    fn find_row(&mut self, code: &str) -> Result<Option<RowHandle>> {
        Ok(self
            .visible_rows()?
            .into_iter()
            .find(|row| row.label.contains(code)))
    }

    fn thumbnail_url(&mut self, row: &RowHandle) -> Result<Option<String>>;

    /// Links on the current page whose text mentions "manual".
    fn manual_links(&mut self) -> Result<Vec<String>>;

    /// Empty the pending-download cart. Returns how many items were removed.
    fn clear_download_cart(&mut self) -> Result<usize>;

    fn document_columns(&mut self) -> Result<Vec<DocumentColumn>>;

    /// Add the document in `column` of `row` to the cart. `false` when the
    /// cell offers nothing to add.
    fn add_to_cart(&mut self, row: &RowHandle, column: &DocumentColumn) -> Result<bool>;

    fn trigger_download(&mut self, target: DownloadTarget) -> Result<()>;

    /// Open the embedded CAD configurator for `row` in a new context.
    /// `false` when the row offers no CAD link or no new context appeared.
    fn open_cad_configurator(&mut self, row: &RowHandle) -> Result<bool>;

    /// Follow the consent workaround link if the configurator shows one.
    fn dismiss_consent_workaround(&mut self) -> Result<bool>;

    /// Tick `format` in the export format selection, if there is one.
    fn select_export_format(&mut self, format: &str) -> Result<bool>;

    fn start_generation(&mut self) -> Result<bool>;

    fn close_ephemeral_context(&mut self) -> Result<()>;

    /// Fetch `url` with the session's cookies. Non-2xx is `Error::Fetch`.
    fn fetch_via_session(&mut self, url: &str) -> Result<Vec<u8>>;
}
