pub mod acquire;
pub mod archive;
pub mod audit;
pub mod cad;
pub mod category;
pub mod classifier;
pub mod config;
pub mod crawl;
pub mod driver;
pub mod error;
pub mod format;
pub mod identity;
pub mod product;
pub mod progress;
pub mod promote;
pub mod scratch;
pub mod validator;

pub use acquire::{Acquirer, AcquisitionState, ProductOutcome, StepOutcome};
pub use audit::{audit_roots, AuditReport, AuditStatus, DirectoryAudit};
pub use category::CanonicalCategory;
pub use config::AppConfig;
pub use crawl::{CrawlEngine, CrawlSummary};
pub use driver::{MirrorDriver, SessionDriver};
pub use error::Error;
pub use product::ProductContext;
pub use progress::{ProgressReporter, SilentReporter};
pub use scratch::ScratchArea;
