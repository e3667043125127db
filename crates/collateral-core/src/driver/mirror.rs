//! Replay driver over a local catalog mirror.
//!
//! The mirror is a directory with a `catalog.toml` describing series, product
//! rows, document columns and the asset files behind each link. It keeps the
//! contracts of a live session: handles go stale on navigation, the CAD
//! configurator lives in an ephemeral context, and downloads land in the
//! scratch `downloads/` directory as files.

use super::{Credentials, DocumentColumn, DownloadTarget, RowHandle, SessionDriver};
use crate::error::{Error, Result};
use crate::product::ProductContext;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const CATALOG_FILE: &str = "catalog.toml";
const URL_SCHEME: &str = "mirror://";
const STEP_EXPORT_FORMAT: &str = "STEP AP214";

#[derive(Debug, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub series_index: Vec<String>,
    pub account: Option<Account>,
    #[serde(default)]
    pub series: Vec<Series>,
}

#[derive(Debug, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Series {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub products: Vec<ProductRow>,
}

#[derive(Debug, Deserialize)]
pub struct ProductRow {
    pub code: String,
    pub label: Option<String>,
    pub url: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub manuals: Vec<String>,
    pub cad: Option<String>,
    #[serde(default)]
    pub consent_gate: bool,
    #[serde(default)]
    pub documents: BTreeMap<String, String>,
    /// Batch downloads that silently never land before one succeeds.
    #[serde(default)]
    pub dropped_batches: u32,
    /// Leave the row off the page entirely.
    #[serde(default)]
    pub hidden: bool,
}

impl ProductRow {
    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.code)
    }

    fn url(&self, series: &Series) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", series.url, self.code))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Blank,
    Series(usize),
    Product(usize, usize),
}

pub struct MirrorDriver {
    root: PathBuf,
    catalog: Catalog,
    downloads: PathBuf,
    authenticated: bool,
    page: Page,
    generation: u64,
    cart: Vec<(usize, usize, PathBuf)>,
    cad_context: Option<(usize, usize)>,
    dropped: HashMap<(usize, usize), u32>,
    download_count: usize,
}

impl MirrorDriver {
    /// Open the mirror at `root`; downloads are written into `downloads`.
    pub fn open(root: &Path, downloads: &Path) -> Result<Self> {
        let raw = fs::read_to_string(root.join(CATALOG_FILE))?;
        let catalog: Catalog = toml::from_str(&raw)?;
        debug!(
            "Mirror at {} with {} series",
            root.display(),
            catalog.series.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            catalog,
            downloads: downloads.to_path_buf(),
            authenticated: false,
            page: Page::Blank,
            generation: 0,
            cart: Vec::new(),
            cad_context: None,
            dropped: HashMap::new(),
            download_count: 0,
        })
    }

    fn require_session(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(Error::Auth("session is not authenticated".into()))
        }
    }

    fn asset_path(&self, url: &str) -> PathBuf {
        self.root.join(url.strip_prefix(URL_SCHEME).unwrap_or(url))
    }

    fn product(&self, series: usize, product: usize) -> &ProductRow {
        &self.catalog.series[series].products[product]
    }

    fn visible_products(&self, series: usize) -> Vec<usize> {
        self.catalog.series[series]
            .products
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.hidden)
            .map(|(i, _)| i)
            .collect()
    }

    /// Resolve a handle, rejecting ones issued before the last navigation.
    fn resolve(&self, row: &RowHandle) -> Result<(usize, usize)> {
        match self.page {
            Page::Series(series) if row.generation == self.generation => {
                let visible = self.visible_products(series);
                visible
                    .get(row.index)
                    .map(|product| (series, *product))
                    .ok_or_else(|| Error::TransientUi(format!("no row at index {}", row.index)))
            }
            _ => Err(Error::TransientUi(format!(
                "stale row handle for {}",
                row.label
            ))),
        }
    }

    fn require_cad_context(&self) -> Result<(usize, usize)> {
        self.cad_context
            .ok_or_else(|| Error::TransientUi("CAD configurator is not open".into()))
    }

    /// Write like a browser does: in-progress name first, final name last.
    fn land(&mut self, name: &str, write: impl FnOnce(&Path) -> Result<()>) -> Result<PathBuf> {
        self.download_count += 1;
        let partial = self.downloads.join(format!("{}.crdownload", name));
        write(partial.as_path())?;
        let target = self.downloads.join(name);
        fs::rename(&partial, &target)?;
        trace!("Mirror landed {}", target.display());
        Ok(target)
    }

    fn land_batch(&mut self) -> Result<()> {
        let Some(&(series, product, _)) = self.cart.first() else {
            return Err(Error::TransientUi("download cart is empty".into()));
        };
        let remaining = self
            .dropped
            .entry((series, product))
            .or_insert(self.catalog.series[series].products[product].dropped_batches);
        if *remaining > 0 {
            *remaining -= 1;
            debug!("Mirror dropped a batch download");
            return Ok(());
        }

        let files: Vec<PathBuf> = self.cart.iter().map(|(_, _, path)| path.clone()).collect();
        let name = format!("download-{}.zip", self.download_count + 1);
        self.land(&name, |partial| {
            let mut writer = ZipWriter::new(File::create(partial)?);
            for file in &files {
                let entry = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                writer.start_file(entry.as_str(), SimpleFileOptions::default())?;
                io::copy(&mut File::open(file)?, &mut writer)?;
            }
            writer.finish()?;
            Ok(())
        })?;
        Ok(())
    }

    fn land_cad(&mut self) -> Result<()> {
        let (series, product) = self.require_cad_context()?;
        let Some(cad) = self.product(series, product).cad.clone() else {
            return Ok(());
        };
        let source = self.asset_path(&cad);
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Other(format!("bad CAD asset path {}", cad)))?;
        self.land(&name, |partial| {
            fs::copy(&source, partial)?;
            Ok(())
        })?;
        Ok(())
    }
}

impl SessionDriver for MirrorDriver {
    fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        if let Some(account) = &self.catalog.account {
            let user_ok = credentials.username.as_deref() == Some(account.username.as_str());
            let pass_ok = credentials.password.as_deref() == Some(account.password.as_str());
            if !(user_ok && pass_ok) {
                return Err(Error::Auth("credentials rejected by catalog".into()));
            }
        }
        self.authenticated = true;
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        self.require_session()?;
        self.generation += 1;
        for (s, series) in self.catalog.series.iter().enumerate() {
            if series.url == url {
                self.page = Page::Series(s);
                return Ok(());
            }
            if let Some(p) = series.products.iter().position(|row| row.url(series) == url) {
                self.page = Page::Product(s, p);
                return Ok(());
            }
        }
        self.page = Page::Blank;
        Err(Error::TransientUi(format!("no page at {}", url)))
    }

    fn series_index(&mut self) -> Result<Vec<String>> {
        self.require_session()?;
        if !self.catalog.series_index.is_empty() {
            return Ok(self.catalog.series_index.clone());
        }
        Ok(self.catalog.series.iter().map(|s| s.url.clone()).collect())
    }

    fn list_products(&mut self, series_url: &str) -> Result<Vec<ProductContext>> {
        self.navigate(series_url)?;
        let Page::Series(s) = self.page else {
            return Ok(Vec::new());
        };
        let series = &self.catalog.series[s];
        Ok(self
            .visible_products(s)
            .into_iter()
            .map(|p| {
                let row = &series.products[p];
                ProductContext::new(&row.code, &series.name, &series.url, &row.url(series))
            })
            .collect())
    }

    fn visible_rows(&mut self) -> Result<Vec<RowHandle>> {
        let Page::Series(s) = self.page else {
            return Ok(Vec::new());
        };
        Ok(self
            .visible_products(s)
            .into_iter()
            .enumerate()
            .map(|(index, p)| RowHandle {
                label: self.product(s, p).label().to_string(),
                index,
                generation: self.generation,
            })
            .collect())
    }

    fn thumbnail_url(&mut self, row: &RowHandle) -> Result<Option<String>> {
        let (s, p) = self.resolve(row)?;
        Ok(self.product(s, p).thumbnail.clone())
    }

    fn manual_links(&mut self) -> Result<Vec<String>> {
        match self.page {
            Page::Product(s, p) => Ok(self.product(s, p).manuals.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn clear_download_cart(&mut self) -> Result<usize> {
        self.require_session()?;
        let removed = self.cart.len();
        self.cart.clear();
        Ok(removed)
    }

    fn document_columns(&mut self) -> Result<Vec<DocumentColumn>> {
        let Page::Series(s) = self.page else {
            return Ok(Vec::new());
        };
        Ok(self.catalog.series[s]
            .columns
            .iter()
            .enumerate()
            .map(|(index, label)| DocumentColumn {
                index,
                label: label.clone(),
            })
            .collect())
    }

    fn add_to_cart(&mut self, row: &RowHandle, column: &DocumentColumn) -> Result<bool> {
        let (s, p) = self.resolve(row)?;
        let Some(asset) = self.product(s, p).documents.get(&column.label).cloned() else {
            return Ok(false);
        };
        let path = self.asset_path(&asset);
        if !path.is_file() {
            return Ok(false);
        }
        self.cart.push((s, p, path));
        Ok(true)
    }

    fn trigger_download(&mut self, target: DownloadTarget) -> Result<()> {
        self.require_session()?;
        match target {
            DownloadTarget::Batch => self.land_batch(),
            DownloadTarget::CadArchive => self.land_cad(),
        }
    }

    fn open_cad_configurator(&mut self, row: &RowHandle) -> Result<bool> {
        let (s, p) = self.resolve(row)?;
        if self.product(s, p).cad.is_none() {
            return Ok(false);
        }
        self.cad_context = Some((s, p));
        Ok(true)
    }

    fn dismiss_consent_workaround(&mut self) -> Result<bool> {
        let (s, p) = self.require_cad_context()?;
        Ok(self.product(s, p).consent_gate)
    }

    fn select_export_format(&mut self, format: &str) -> Result<bool> {
        self.require_cad_context()?;
        Ok(format == STEP_EXPORT_FORMAT)
    }

    fn start_generation(&mut self) -> Result<bool> {
        self.require_cad_context()?;
        Ok(true)
    }

    fn close_ephemeral_context(&mut self) -> Result<()> {
        self.cad_context = None;
        Ok(())
    }

    fn fetch_via_session(&mut self, url: &str) -> Result<Vec<u8>> {
        self.require_session()?;
        let path = self.asset_path(url);
        fs::read(&path).map_err(|err| Error::Fetch {
            url: url.to_string(),
            reason: match err.kind() {
                io::ErrorKind::NotFound => "404 Not Found".to_string(),
                _ => err.to_string(),
            },
        })
    }
}

impl MirrorDriver {
    /// True while a CAD configurator context is open.
    pub fn has_open_context(&self) -> bool {
        self.cad_context.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CATALOG: &str = r#"
        [account]
        username = "buyer"
        password = "pw"

        [[series]]
        name = "Ring"
        url = "series/ring"
        columns = ["Catalog", "Warranty"]

        [[series.products]]
        code = "ABC-100"
        label = "ABC-100 white"
        documents = { "Catalog" = "assets/c_abc.pdf" }
    "#;

    fn mirror() -> (tempfile::TempDir, MirrorDriver) {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("assets")).unwrap();
        fs::create_dir_all(tmp.path().join("downloads")).unwrap();
        fs::write(tmp.path().join("assets/c_abc.pdf"), b"%PDF-1.4").unwrap();
        fs::write(tmp.path().join(CATALOG_FILE), CATALOG).unwrap();
        let driver = MirrorDriver::open(tmp.path(), &tmp.path().join("downloads")).unwrap();
        (tmp, driver)
    }

    fn login() -> Credentials {
        Credentials {
            username: Some("buyer".into()),
            password: Some("pw".into()),
        }
    }

    #[test]
    fn test_rejects_wrong_credentials() {
        let (_tmp, mut driver) = mirror();
        let err = driver.authenticate(&Credentials::default()).unwrap_err();
        assert!(err.is_fatal());
        assert!(driver.navigate("series/ring").unwrap_err().is_fatal());
    }

    #[test]
    fn test_row_handle_goes_stale_after_navigation() {
        let (_tmp, mut driver) = mirror();
        driver.authenticate(&login()).unwrap();
        driver.navigate("series/ring").unwrap();
        let row = driver.find_row("ABC-100").unwrap().unwrap();
        assert!(driver.thumbnail_url(&row).is_ok());

        driver.navigate("series/ring").unwrap();
        assert!(matches!(
            driver.thumbnail_url(&row),
            Err(Error::TransientUi(_))
        ));
        let fresh = driver.find_row("ABC-100").unwrap().unwrap();
        assert_eq!(fresh.index, row.index);
        assert_ne!(fresh.generation, row.generation);
    }

    #[test]
    fn test_batch_download_lands_cart_as_zip() {
        let (tmp, mut driver) = mirror();
        driver.authenticate(&login()).unwrap();
        driver.navigate("series/ring").unwrap();
        let row = driver.find_row("ABC-100").unwrap().unwrap();
        let columns = driver.document_columns().unwrap();
        assert!(driver.add_to_cart(&row, &columns[0]).unwrap());
        assert!(!driver.add_to_cart(&row, &columns[1]).unwrap());

        driver.trigger_download(DownloadTarget::Batch).unwrap();
        let landed: Vec<_> = fs::read_dir(tmp.path().join("downloads"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(landed, vec!["download-1.zip".to_string()]);
        assert_eq!(driver.clear_download_cart().unwrap(), 1);
    }

    #[test]
    fn test_fetch_missing_asset_is_fetch_error() {
        let (_tmp, mut driver) = mirror();
        driver.authenticate(&login()).unwrap();
        let err = driver.fetch_via_session("mirror://assets/none.png").unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
