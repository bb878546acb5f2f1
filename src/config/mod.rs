pub mod toml_config;

pub use toml_config::ReportConfig;

#[cfg(feature = "cli")]
use crate::domain::model::TimeRange;
#[cfg(feature = "cli")]
use crate::utils::error::{ReportError, Result};
#[cfg(feature = "cli")]
use chrono::{DateTime, Duration, Utc};
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "funnel-etl")]
#[command(about = "Marketing funnel harvesting and reconciliation snapshots")]
pub struct CliConfig {
    #[arg(long, default_value = "funnel.toml", help = "Path to the TOML config file")]
    pub config: String,

    #[arg(long, default_value = "7", help = "Harvest the last N days")]
    pub days: i64,

    #[arg(long, help = "Range start override (RFC3339)")]
    pub start: Option<String>,

    #[arg(long, help = "Range end override (RFC3339)")]
    pub end: Option<String>,

    #[arg(long, help = "Override load.output_path from the config file")]
    pub output_path: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Enable system monitoring")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Harvest window from the flags: explicit RFC3339 bounds win over the
    /// rolling `--days` window ending now.
    pub fn resolve_range(&self, now: DateTime<Utc>) -> Result<TimeRange> {
        let end = match &self.end {
            Some(raw) => parse_rfc3339("end", raw)?,
            None => now,
        };
        let start = match &self.start {
            Some(raw) => parse_rfc3339("start", raw)?,
            None => end - Duration::days(self.days),
        };
        TimeRange::new(start, end)
    }
}

#[cfg(feature = "cli")]
fn parse_rfc3339(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ReportError::InvalidConfigValueError {
            field: field.to_string(),
            value: raw.to_string(),
            reason: format!("Expected RFC3339 timestamp: {}", e),
        })
}
