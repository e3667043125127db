use clap::{Args, Parser, Subcommand};
use collateral_core::AppConfig;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "collateral")]
#[command(about = "Collects per-product collateral documents and audits the output", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./Collateral.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Crawl the catalog and build one directory per product
    Crawl(CrawlArgs),
    /// Deduplicate, re-validate and report on finished product directories
    Audit {
        /// Output roots to audit
        #[arg(long, num_args = 1.., required = true)]
        roots: Vec<PathBuf>,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Series page to crawl; repeatable
    #[arg(long = "series-url")]
    pub series_url: Vec<String>,

    /// File listing series URLs (txt, csv or tsv)
    #[arg(long)]
    pub series_file: Option<PathBuf>,

    /// File listing product codes or URLs to restrict the crawl to
    #[arg(long)]
    pub product_file: Option<PathBuf>,

    #[arg(long)]
    pub output_root: Option<PathBuf>,

    /// Stop after this many products (0 = no limit)
    #[arg(long)]
    pub max_products: Option<usize>,

    /// Re-acquire products whose directory already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Acquisition attempts per product (1 or 2)
    #[arg(long)]
    pub attempts: Option<u8>,

    /// Seconds to wait for each download
    #[arg(long)]
    pub download_timeout: Option<u64>,

    /// Keep the scratch download directory after the run
    #[arg(long)]
    pub keep_downloads: bool,

    /// Log document column headers per product
    #[arg(long)]
    pub dump_headers: bool,

    /// Local catalog mirror to crawl
    #[arg(long)]
    pub mirror: Option<PathBuf>,
}

impl CrawlArgs {
    /// Command line values win over file and environment configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if !self.series_url.is_empty() {
            config.series_urls = self.series_url.clone();
        }
        if let Some(path) = &self.series_file {
            config.series_file = Some(path.clone());
        }
        if let Some(path) = &self.product_file {
            config.product_file = Some(path.clone());
        }
        if let Some(root) = &self.output_root {
            config.output_root = root.clone();
        }
        if let Some(max) = self.max_products {
            config.max_products = max;
        }
        if let Some(attempts) = self.attempts {
            config.acquisition.max_attempts = attempts;
        }
        if let Some(timeout) = self.download_timeout {
            config.acquisition.download_timeout_secs = timeout;
        }
        if let Some(mirror) = &self.mirror {
            config.mirror_root = Some(mirror.clone());
        }
        config.overwrite |= self.overwrite;
        config.keep_downloads |= self.keep_downloads;
        config.dump_headers |= self.dump_headers;
    }
}
