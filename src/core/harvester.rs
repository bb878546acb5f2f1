//! Complete retrieval from a record-capped, cursorless reporting endpoint.
//!
//! The upstream returns at most `page_cap` records per query with no
//! continuation cursor; `count == page_cap` is the only truncation signal.
//! Suspected-truncated windows are bisected depth-first until every window
//! comes back under the cap, falling back to fixed-width scanning once a
//! window is too small to split.
//!
//! Per-window life cycle:
//! `Pending -> {FetchedUnderCap | FetchedAtCap -> Splitting | Scanning} -> Done`.
//! Failures go straight to Done with an empty result.

use crate::domain::model::{HarvestResult, RawRecord, SourceKind, TimeRange};
use crate::domain::ports::{Clock, ReportQuery};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

pub const DEFAULT_MIN_WINDOW_SECONDS: i64 = 60;

pub struct TimeWindowHarvester<Q: ReportQuery, C: Clock> {
    query: Q,
    clock: C,
    page_cap: usize,
    min_window: Duration,
}

impl<Q: ReportQuery, C: Clock> TimeWindowHarvester<Q, C> {
    pub fn new(query: Q, clock: C, page_cap: usize) -> Self {
        Self {
            query,
            clock,
            page_cap,
            min_window: Duration::seconds(DEFAULT_MIN_WINDOW_SECONDS),
        }
    }

    pub fn with_min_window(mut self, min_window: Duration) -> Self {
        self.min_window = min_window;
        self
    }

    /// Retrieve the complete, deduplicated record set for `range`.
    ///
    /// Never fails: request errors degrade to empty sub-range results and
    /// show up only in the audit counters.
    pub async fn harvest(&self, source: SourceKind, range: TimeRange) -> HarvestResult {
        // One wall-clock capture per run; sub-ranges starting at or after
        // this instant are dropped without being queried.
        let now = self.clock.now();

        let mut windows_queried = 0usize;
        let mut windows_split = 0usize;
        let mut windows_failed = 0usize;
        // Each window contributes an immutable part; parts are folded and
        // deduplicated at the end, so traversal order never affects the
        // final set.
        let mut parts: Vec<Vec<RawRecord>> = Vec::new();

        // Depth-first, most recent half on top of the stack.
        let mut pending = vec![range];
        while let Some(window) = pending.pop() {
            if window.start >= now {
                tracing::debug!("⏭️ {}: dropping future window {}", source, window);
                continue;
            }

            windows_queried += 1;
            let records = match self.query.fetch(source, window, self.page_cap).await {
                Ok(records) => records,
                Err(e) => {
                    windows_failed += 1;
                    tracing::warn!(
                        "⚠️ {}: window {} degraded to empty result: {}",
                        source,
                        window,
                        e
                    );
                    continue;
                }
            };

            if records.len() < self.page_cap {
                parts.push(records);
                continue;
            }

            // At the cap: the window is suspected truncated. Bisect while
            // both halves stay at or above the minimum granularity,
            // otherwise scan the remaining span in fixed-width steps.
            let splittable = window.duration() >= self.min_window * 2;
            match window.split().filter(|_| splittable) {
                Some((older, newer)) => {
                    windows_split += 1;
                    tracing::debug!(
                        "✂️ {}: window {} at cap ({}), bisecting",
                        source,
                        window,
                        records.len()
                    );
                    pending.push(older);
                    pending.push(newer);
                }
                None => {
                    let (scanned, queried, failed) = self.scan(source, window, now).await;
                    windows_queried += queried;
                    windows_failed += failed;
                    parts.extend(scanned);
                }
            }
        }

        let (records, duplicates_dropped) = fold_deduplicated(parts);

        tracing::info!(
            "📥 {}: harvested {} records over {} ({} windows, {} splits, {} failed, {} duplicates)",
            source,
            records.len(),
            range,
            windows_queried,
            windows_split,
            windows_failed,
            duplicates_dropped
        );

        HarvestResult {
            source,
            range,
            records,
            windows_queried,
            windows_split,
            windows_failed,
            duplicates_dropped,
        }
    }

    /// Fixed-width sweep over a span too small to bisect. Every step result
    /// is accepted unconditionally, on the assumption that no
    /// minimum-granularity window exceeds the cap.
    async fn scan(
        &self,
        source: SourceKind,
        span: TimeRange,
        now: DateTime<Utc>,
    ) -> (Vec<Vec<RawRecord>>, usize, usize) {
        tracing::debug!("🔎 {}: scanning {} in fixed-width steps", source, span);

        let mut parts = Vec::new();
        let mut queried = 0usize;
        let mut failed = 0usize;

        let mut cursor = span.start;
        loop {
            if cursor >= now {
                break;
            }
            let step = TimeRange {
                start: cursor,
                end: (cursor + self.min_window).min(span.end),
            };

            queried += 1;
            match self.query.fetch(source, step, self.page_cap).await {
                Ok(records) => parts.push(records),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        "⚠️ {}: scan step {} degraded to empty result: {}",
                        source,
                        step,
                        e
                    );
                }
            }

            if step.end >= span.end {
                break;
            }
            cursor = step.end;
        }

        (parts, queried, failed)
    }
}

/// Fold immutable window results into one deduplicated sequence. Window
/// boundaries overlap by a single instant, so shared-boundary records are
/// expected duplicates.
fn fold_deduplicated(parts: Vec<Vec<RawRecord>>) -> (Vec<RawRecord>, usize) {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut dropped = 0usize;
    for part in parts {
        for record in part {
            if seen.insert(record.dedup_key()) {
                records.push(record);
            } else {
                dropped += 1;
            }
        }
    }
    (records, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::{ReportError, Result};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// Capped, cursorless source over a fixed dataset: returns the first
    /// `limit` records inside the window, ordered by timestamp.
    struct MockSource {
        records: Vec<(DateTime<Utc>, RawRecord)>,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl MockSource {
        fn new(timestamps: &[DateTime<Utc>]) -> Self {
            let records = timestamps
                .iter()
                .enumerate()
                .map(|(i, ts)| {
                    let mut data = HashMap::new();
                    data.insert("id".to_string(), serde_json::json!(i));
                    data.insert("ts".to_string(), serde_json::json!(ts.to_rfc3339()));
                    (*ts, RawRecord::new(data))
                })
                .collect();
            Self {
                records,
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }

        fn failing() -> Self {
            let mut source = Self::new(&[]);
            source.fail = true;
            source
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReportQuery for MockSource {
        async fn fetch(
            &self,
            _source: SourceKind,
            range: TimeRange,
            limit: usize,
        ) -> Result<Vec<RawRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReportError::UpstreamStatusError {
                    source_name: "mock".to_string(),
                    status: 503,
                });
            }
            let mut hits: Vec<_> = self
                .records
                .iter()
                .filter(|(ts, _)| *ts >= range.start && *ts <= range.end)
                .collect();
            hits.sort_by_key(|(ts, _)| *ts);
            Ok(hits.into_iter().take(limit).map(|(_, r)| r.clone()).collect())
        }
    }

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, m, s).unwrap()
    }

    fn day_range() -> TimeRange {
        TimeRange::new(ts(0, 0, 0), ts(23, 59, 59)).unwrap()
    }

    fn record_ids(result: &HarvestResult) -> Vec<i64> {
        let mut ids: Vec<i64> = result
            .records
            .iter()
            .map(|r| r.data["id"].as_i64().unwrap())
            .collect();
        ids.sort();
        ids
    }

    /// Splitting is lossless and transparent: any page cap yields the same
    /// record set as an uncapped query.
    #[tokio::test]
    async fn test_harvest_complete_for_any_page_cap() {
        // 48 records, one every 30 minutes.
        let timestamps: Vec<_> = (0..48).map(|i| ts(i / 2, (i % 2) * 30, 0)).collect();
        let expected: Vec<i64> = (0..48).collect();

        for page_cap in [2, 5, 10, 1000] {
            let source = MockSource::new(&timestamps);
            let harvester =
                TimeWindowHarvester::new(source, FixedClock(ts(23, 59, 59)), page_cap);
            let result = harvester
                .harvest(SourceKind::MessageStatus, day_range())
                .await;
            assert_eq!(record_ids(&result), expected, "page_cap={}", page_cap);
        }
    }

    /// A full day at exactly the cap with both half-days under it must be
    /// completed by a single bisection, not a minute-by-minute scan.
    #[tokio::test]
    async fn test_single_bisection_when_halves_fit() {
        let timestamps = vec![
            ts(1, 0, 0),
            ts(3, 0, 0),
            ts(5, 0, 0),
            ts(13, 0, 0),
            ts(15, 0, 0),
            ts(17, 0, 0),
        ];
        let source = MockSource::new(&timestamps);
        let calls = source.calls.clone();
        let harvester = TimeWindowHarvester::new(source, FixedClock(ts(23, 59, 59)), 4);

        let result = harvester.harvest(SourceKind::Proposal, day_range()).await;

        assert_eq!(record_ids(&result), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(result.windows_split, 1);
        // Full range plus the two halves, nothing else.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.windows_queried, 3);
    }

    #[tokio::test]
    async fn test_harvest_is_idempotent() {
        let timestamps: Vec<_> = (0..20).map(|i| ts(i, 0, 0)).collect();
        let source = MockSource::new(&timestamps);
        let harvester = TimeWindowHarvester::new(source, FixedClock(ts(23, 59, 59)), 6);

        let first = harvester
            .harvest(SourceKind::AccessEvent, day_range())
            .await;
        let second = harvester
            .harvest(SourceKind::AccessEvent, day_range())
            .await;

        assert_eq!(record_ids(&first), record_ids(&second));
        assert_eq!(first.records.len(), 20);
    }

    /// Windows too small to bisect fall back to the fixed-width scan and
    /// still recover the full set.
    #[tokio::test]
    async fn test_scan_below_split_granularity() {
        let timestamps = vec![ts(0, 0, 0), ts(0, 0, 40), ts(0, 1, 20)];
        let source = MockSource::new(&timestamps);
        let calls = source.calls.clone();
        let harvester = TimeWindowHarvester::new(source, FixedClock(ts(23, 0, 0)), 2);

        let range = TimeRange::new(ts(0, 0, 0), ts(0, 1, 30)).unwrap();
        let result = harvester.harvest(SourceKind::MessageStatus, range).await;

        assert_eq!(record_ids(&result), vec![0, 1, 2]);
        assert_eq!(result.windows_split, 0);
        // Initial at-cap fetch plus two scan steps.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Sub-ranges starting at or after "now" are dropped, never queried.
    #[tokio::test]
    async fn test_future_windows_are_dropped() {
        let timestamps = vec![
            ts(1, 0, 0),
            ts(3, 0, 0),
            ts(5, 0, 0),
            ts(7, 0, 0),
            ts(9, 0, 0),
            ts(11, 0, 0),
        ];
        let source = MockSource::new(&timestamps);
        let calls = source.calls.clone();
        // Harvest starts at noon; the 12:00-24:00 half must never be hit.
        let harvester = TimeWindowHarvester::new(source, FixedClock(ts(11, 59, 59)), 4);

        let range = TimeRange::new(ts(0, 0, 0), ts(23, 59, 58)).unwrap();
        let result = harvester.harvest(SourceKind::MessageStatus, range).await;

        assert_eq!(record_ids(&result), vec![0, 1, 2, 3, 4, 5]);
        // Full range (at cap), split; future half dropped; first half (at
        // cap), split; both quarters under cap: 4 queries total.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_entirely_future_range_is_not_queried() {
        let source = MockSource::new(&[ts(10, 0, 0)]);
        let calls = source.calls.clone();
        let harvester = TimeWindowHarvester::new(source, FixedClock(ts(1, 0, 0)), 10);

        let range = TimeRange::new(ts(2, 0, 0), ts(8, 0, 0)).unwrap();
        let result = harvester.harvest(SourceKind::Proposal, range).await;

        assert!(result.records.is_empty());
        assert_eq!(result.windows_queried, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Request failures degrade to empty sub-range results; nothing
    /// propagates out of the harvest.
    #[tokio::test]
    async fn test_failures_degrade_to_empty() {
        let source = MockSource::failing();
        let harvester = TimeWindowHarvester::new(source, FixedClock(ts(23, 0, 0)), 10);

        let result = harvester.harvest(SourceKind::AccessEvent, day_range()).await;

        assert!(result.records.is_empty());
        assert_eq!(result.windows_failed, 1);
        assert_eq!(result.windows_queried, 1);
    }

    /// Boundary instants shared by adjacent halves are deduplicated.
    #[tokio::test]
    async fn test_shared_boundary_record_deduplicated() {
        // Record 1 sits exactly at the bisection midpoint, so both halves
        // return it.
        let timestamps = vec![ts(2, 0, 0), ts(6, 0, 0), ts(10, 0, 0)];
        let source = MockSource::new(&timestamps);
        let harvester = TimeWindowHarvester::new(source, FixedClock(ts(23, 59, 59)), 3);

        let range = TimeRange::new(ts(0, 0, 0), ts(12, 0, 0)).unwrap();
        let result = harvester.harvest(SourceKind::MessageStatus, range).await;

        assert_eq!(record_ids(&result), vec![0, 1, 2]);
        assert_eq!(result.duplicates_dropped, 1);
    }
}
