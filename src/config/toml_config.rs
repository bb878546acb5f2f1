use crate::adapters::http::EndpointSpec;
use crate::core::harvester::DEFAULT_MIN_WINDOW_SECONDS;
use crate::core::report::FunnelSettings;
use crate::core::{metrics, resolver};
use crate::utils::error::{ReportError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_PAGE_CAP: usize = 30000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub report: ReportInfo,
    pub sources: SourcesConfig,
    pub harvest: Option<HarvestConfig>,
    pub funnel: Option<FunnelConfig>,
    pub enrichment: Option<EnrichmentConfig>,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInfo {
    pub name: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub message_status: SourceEndpointConfig,
    pub access_event: SourceEndpointConfig,
    pub proposal: SourceEndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpointConfig {
    pub endpoint: String,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_seconds: Option<u64>,
}

impl SourceEndpointConfig {
    pub fn spec(&self) -> EndpointSpec {
        EndpointSpec {
            url: self.endpoint.clone(),
            headers: self.headers.clone().unwrap_or_default(),
            timeout_seconds: self.timeout_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    pub page_cap: Option<usize>,
    pub min_window_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelConfig {
    pub unit_cost: Option<f64>,
    pub revenue_factor: Option<f64>,
    pub default_channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub endpoint: String,
    pub headers: Option<HashMap<String, String>>,
    pub timeout_seconds: Option<u64>,
    pub sequential_threshold: Option<usize>,
    pub partitions: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub query_delay_ms: Option<u64>,
    pub filters: Option<HashMap<String, String>>,
}

impl EnrichmentConfig {
    pub fn spec(&self) -> EndpointSpec {
        EndpointSpec {
            url: self.endpoint.clone(),
            headers: self.headers.clone().unwrap_or_default(),
            timeout_seconds: self.timeout_seconds,
        }
    }

    pub fn sequential_threshold(&self) -> usize {
        self.sequential_threshold
            .unwrap_or(resolver::DEFAULT_SEQUENTIAL_THRESHOLD)
    }

    pub fn partitions(&self) -> usize {
        self.partitions.unwrap_or(resolver::DEFAULT_PARTITIONS)
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.unwrap_or(resolver::DEFAULT_MAX_ATTEMPTS)
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        self.retry_delay_ms
            .map(std::time::Duration::from_millis)
            .unwrap_or(resolver::DEFAULT_RETRY_BACKOFF)
    }

    pub fn query_delay(&self) -> std::time::Duration {
        self.query_delay_ms
            .map(std::time::Duration::from_millis)
            .unwrap_or(resolver::DEFAULT_QUERY_DELAY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
}

impl ReportConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ReportError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReportError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replace `${VAR_NAME}` placeholders (API tokens and endpoints are
    /// kept out of the file). Unknown variables are left as-is so
    /// validation reports them with context.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url(
            "sources.message_status.endpoint",
            &self.sources.message_status.endpoint,
        )?;
        validation::validate_url(
            "sources.access_event.endpoint",
            &self.sources.access_event.endpoint,
        )?;
        validation::validate_url("sources.proposal.endpoint", &self.sources.proposal.endpoint)?;

        validation::validate_path("load.output_path", &self.load.output_path)?;

        validation::validate_positive_number("harvest.page_cap", self.page_cap(), 1)?;
        if let Some(harvest) = &self.harvest {
            if let Some(min_window) = harvest.min_window_seconds {
                validation::validate_range("harvest.min_window_seconds", min_window, 1, 3600)?;
            }
        }

        if let Some(funnel) = &self.funnel {
            if let Some(unit_cost) = funnel.unit_cost {
                if unit_cost < 0.0 {
                    return Err(ReportError::InvalidConfigValueError {
                        field: "funnel.unit_cost".to_string(),
                        value: unit_cost.to_string(),
                        reason: "Unit cost cannot be negative".to_string(),
                    });
                }
            }
        }

        if let Some(enrichment) = &self.enrichment {
            validation::validate_url("enrichment.endpoint", &enrichment.endpoint)?;
            validation::validate_range("enrichment.partitions", enrichment.partitions(), 1, 16)?;
            validation::validate_range(
                "enrichment.retry_attempts",
                enrichment.retry_attempts(),
                1,
                10,
            )?;
        }

        Ok(())
    }

    pub fn page_cap(&self) -> usize {
        self.harvest
            .as_ref()
            .and_then(|h| h.page_cap)
            .unwrap_or(DEFAULT_PAGE_CAP)
    }

    pub fn min_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            self.harvest
                .as_ref()
                .and_then(|h| h.min_window_seconds)
                .unwrap_or(DEFAULT_MIN_WINDOW_SECONDS),
        )
    }

    pub fn funnel_settings(&self) -> FunnelSettings {
        let defaults = FunnelSettings::default();
        match &self.funnel {
            Some(funnel) => FunnelSettings {
                unit_cost: funnel.unit_cost.unwrap_or(defaults.unit_cost),
                revenue_factor: funnel
                    .revenue_factor
                    .unwrap_or(metrics::DEFAULT_REVENUE_FACTOR),
                default_channel: funnel
                    .default_channel
                    .clone()
                    .unwrap_or(defaults.default_channel),
            },
            None => defaults,
        }
    }

    pub fn output_path(&self) -> &str {
        &self.load.output_path
    }
}

impl Validate for ReportConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
