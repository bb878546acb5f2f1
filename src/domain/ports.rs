use crate::domain::model::{Identity, RawRecord, SourceKind, TimeRange};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Upstream reporting endpoint. The harvester relies on a single contract:
/// at most `limit` records come back, `count == limit` is the only
/// truncation signal, and record ordering is unspecified.
#[async_trait]
pub trait ReportQuery: Send + Sync {
    async fn fetch(
        &self,
        source: SourceKind,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<RawRecord>>;
}

/// Per-identity enrichment endpoint used by the batch resolver.
#[async_trait]
pub trait LookupQuery: Send + Sync {
    async fn lookup(
        &self,
        identity: &Identity,
        filters: &HashMap<String, String>,
    ) -> Result<Vec<RawRecord>>;
}

/// Wall-clock seam. The harvester captures one instant per run and drops
/// sub-ranges that start at or after it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Async sleep seam so retry backoff and request throttling are testable
/// without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
