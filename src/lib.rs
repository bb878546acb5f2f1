pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::ReportConfig;

pub use crate::core::export::SnapshotExporter;
pub use crate::core::harvester::TimeWindowHarvester;
pub use crate::core::report::{Enrichment, FunnelReportEngine, FunnelSettings};
pub use crate::core::resolver::BatchCpfResolver;
pub use crate::utils::error::{ReportError, Result};
