use crate::utils::error::{ReportError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Which upstream reporting API a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    MessageStatus,
    AccessEvent,
    Proposal,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::MessageStatus => "message_status",
            SourceKind::AccessEvent => "access_event",
            SourceKind::Proposal => "proposal",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive-inclusive time window, the unit of work for harvesting.
///
/// Both endpoints belong to the window; adjacent windows produced by
/// `split` share their boundary instant, and the shared instant is
/// absorbed by harvest-level deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(ReportError::ValidationError {
                message: format!("TimeRange start {} is after end {}", start, end),
            });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Bisect at the midpoint. Returns `None` when the midpoint would
    /// coincide with an endpoint (zero-width guard).
    pub fn split(&self) -> Option<(TimeRange, TimeRange)> {
        let mid = self.start + self.duration() / 2;
        if mid <= self.start || mid >= self.end {
            return None;
        }
        Some((
            TimeRange {
                start: self.start,
                end: mid,
            },
            TimeRange {
                start: mid,
                end: self.end,
            },
        ))
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} .. {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Opaque upstream record: a free-form field map. Field names differ per
/// source and per upstream version, so all access goes through the
/// candidate-field helpers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub data: HashMap<String, serde_json::Value>,
}

impl RawRecord {
    pub fn new(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.data.get(key) {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            // Amounts frequently arrive as strings ("1234.56").
            Some(serde_json::Value::String(s)) => s.trim().replace(',', ".").parse().ok(),
            _ => None,
        }
    }

    /// First non-empty string value among candidate field names.
    pub fn first_text(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.text(k))
            .find(|s| !s.trim().is_empty())
    }

    /// First numeric value among candidate field names.
    pub fn first_number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.number(k))
    }

    /// Stable content key used for harvest deduplication. HashMap iteration
    /// order is not deterministic, so serialize through a sorted map.
    pub fn dedup_key(&self) -> String {
        let sorted: BTreeMap<&String, &serde_json::Value> = self.data.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}

/// Canonical cross-source key. Invariant: each field is either absent or
/// exactly 11 digits (enforced by the normalizers in `core::normalize`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub phone: Option<String>,
    pub national_id: Option<String>,
}

impl Identity {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.national_id.is_none()
    }
}

/// Complete, deduplicated record set for one (source, range) harvest, plus
/// audit counters. Truncation handling is internal to the harvester and
/// never surfaces here.
#[derive(Debug, Clone)]
pub struct HarvestResult {
    pub source: SourceKind,
    pub range: TimeRange,
    pub records: Vec<RawRecord>,
    pub windows_queried: usize,
    pub windows_split: usize,
    pub windows_failed: usize,
    pub duplicates_dropped: usize,
}

impl HarvestResult {
    pub fn audit(&self) -> HarvestAudit {
        HarvestAudit {
            source: self.source,
            record_count: self.records.len(),
            windows_queried: self.windows_queried,
            windows_split: self.windows_split,
            windows_failed: self.windows_failed,
            duplicates_dropped: self.duplicates_dropped,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestAudit {
    pub source: SourceKind,
    pub record_count: usize,
    pub windows_queried: usize,
    pub windows_split: usize,
    pub windows_failed: usize,
    pub duplicates_dropped: usize,
}

/// Result of filtering a named target identity set against a named
/// reference set.
#[derive(Debug, Clone, Serialize)]
pub struct JoinedIdentitySet {
    pub target_name: String,
    pub reference_name: String,
    /// Matched target entries, target order preserved, duplicates kept.
    pub identities: Vec<Identity>,
    pub pre_filter: usize,
    pub post_filter: usize,
    pub distinct: usize,
}

impl JoinedIdentitySet {
    pub fn audit(&self) -> JoinAudit {
        JoinAudit {
            target: self.target_name.clone(),
            reference: self.reference_name.clone(),
            pre_filter: self.pre_filter,
            post_filter: self.post_filter,
            distinct: self.distinct,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinAudit {
    pub target: String,
    pub reference: String,
    pub pre_filter: usize,
    pub post_filter: usize,
    pub distinct: usize,
}

/// Aggregate counts and amounts feeding the metrics calculator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FunnelInput {
    pub send_count: u64,
    pub delivered_count: u64,
    pub lead_count: u64,
    pub sale_count: u64,
    pub total_revenue: f64,
    pub unit_cost: f64,
    pub revenue_factor: f64,
}

/// Fully recomputed metrics for one channel. Never mutated incrementally;
/// every snapshot rebuilds these from current inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMetrics {
    pub channel: String,
    pub send_count: u64,
    pub delivered_count: u64,
    pub lead_count: u64,
    pub sale_count: u64,
    pub total_revenue: f64,
    pub investment: f64,
    pub forecast_revenue: f64,
    pub avg_ticket: f64,
    pub cost_per_lead: f64,
    pub cost_per_sale: f64,
    pub sends_per_sale: f64,
    pub sends_per_lead: f64,
    pub leads_per_sale: f64,
    pub conversion_rate: f64,
    pub roi: f64,
}

/// One engine run: per-channel metrics plus harvest and join audits.
#[derive(Debug, Clone, Serialize)]
pub struct FunnelSnapshot {
    pub generated_at: DateTime<Utc>,
    pub range: TimeRange,
    pub channels: Vec<ChannelMetrics>,
    pub harvests: Vec<HarvestAudit>,
    pub joins: Vec<JoinAudit>,
}
