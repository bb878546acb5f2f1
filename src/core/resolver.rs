//! Bounded-concurrency batch enrichment.
//!
//! Small inputs are resolved sequentially; larger ones are partitioned into
//! a fixed number of disjoint batches, one worker task per batch. The
//! worker count is the partition count, never the input size, so outbound
//! concurrency toward the lookup API stays capped no matter how many
//! identities arrive. Partitions are disjoint, so the final merge is a
//! collision-free map union with no locking.

use crate::domain::model::{Identity, RawRecord};
use crate::domain::ports::{LookupQuery, Sleeper};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 10;
pub const DEFAULT_PARTITIONS: usize = 4;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_QUERY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct BatchCpfResolver {
    lookup: Arc<dyn LookupQuery>,
    sleeper: Arc<dyn Sleeper>,
    sequential_threshold: usize,
    partitions: usize,
    max_attempts: u32,
    retry_backoff: Duration,
    query_delay: Duration,
}

impl BatchCpfResolver {
    pub fn new(lookup: Arc<dyn LookupQuery>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            lookup,
            sleeper,
            sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
            partitions: DEFAULT_PARTITIONS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            query_delay: DEFAULT_QUERY_DELAY,
        }
    }

    pub fn with_sequential_threshold(mut self, threshold: usize) -> Self {
        self.sequential_threshold = threshold;
        self
    }

    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Resolve every identity to its matched records. Never fails and never
    /// drops an identity: lookups that exhaust their retries resolve to an
    /// empty list.
    pub async fn resolve(
        &self,
        identities: Vec<Identity>,
        filters: &HashMap<String, String>,
    ) -> HashMap<Identity, Vec<RawRecord>> {
        if identities.len() <= self.sequential_threshold {
            tracing::debug!("🔍 resolving {} identities sequentially", identities.len());
            return self.resolve_batch(identities, filters.clone()).await;
        }

        let batches = partition(identities, self.partitions);
        tracing::info!(
            "🔍 resolving {} identities across {} workers",
            batches.iter().map(Vec::len).sum::<usize>(),
            batches.len()
        );

        let mut handles = Vec::with_capacity(batches.len());
        for batch in batches {
            let worker = self.clone();
            let filters = filters.clone();
            handles.push(tokio::spawn(async move {
                worker.resolve_batch(batch, filters).await
            }));
        }

        // Single join point; partitions are disjoint so the union cannot
        // collide.
        let mut merged = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok(batch_result) => merged.extend(batch_result),
                Err(e) => tracing::error!("❌ enrichment worker panicked: {}", e),
            }
        }
        merged
    }

    async fn resolve_batch(
        &self,
        batch: Vec<Identity>,
        filters: HashMap<String, String>,
    ) -> HashMap<Identity, Vec<RawRecord>> {
        let mut results = HashMap::with_capacity(batch.len());
        for (index, identity) in batch.into_iter().enumerate() {
            // Fixed inter-query delay throttles the request rate per worker.
            if index > 0 && !self.query_delay.is_zero() {
                self.sleeper.sleep(self.query_delay).await;
            }
            let records = self.lookup_with_retry(&identity, &filters).await;
            results.insert(identity, records);
        }
        results
    }

    async fn lookup_with_retry(
        &self,
        identity: &Identity,
        filters: &HashMap<String, String>,
    ) -> Vec<RawRecord> {
        for attempt in 1..=self.max_attempts {
            match self.lookup.lookup(identity, filters).await {
                Ok(records) => return records,
                Err(e) => {
                    tracing::warn!(
                        "⚠️ lookup attempt {}/{} failed: {}",
                        attempt,
                        self.max_attempts,
                        e
                    );
                    if attempt < self.max_attempts {
                        self.sleeper.sleep(self.retry_backoff).await;
                    }
                }
            }
        }
        Vec::new()
    }
}

/// Split into at most `partitions` disjoint contiguous batches of
/// near-equal size.
fn partition(identities: Vec<Identity>, partitions: usize) -> Vec<Vec<Identity>> {
    if identities.is_empty() {
        return Vec::new();
    }
    let chunk_size = identities.len().div_ceil(partitions);
    identities
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}
