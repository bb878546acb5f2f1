//! Snapshot orchestration: harvest the three sources, classify, reconcile
//! identities and recompute per-channel metrics. Every run rebuilds the
//! snapshot from scratch; nothing is cached between runs.

use crate::core::classify::{
    self, AccessRecord, DeliveryStatus, MessageRecord, ProposalRecord,
};
use crate::core::harvester::TimeWindowHarvester;
use crate::core::join::{self, NamedIdentitySet};
use crate::core::metrics;
use crate::core::resolver::BatchCpfResolver;
use crate::domain::model::{
    FunnelInput, FunnelSnapshot, HarvestResult, Identity, SourceKind, TimeRange,
};
use crate::domain::ports::{Clock, ReportQuery};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct FunnelSettings {
    /// Cost charged per sent message.
    pub unit_cost: f64,
    /// Calibration factor applied to raw proposal revenue.
    pub revenue_factor: f64,
    /// Channel bucket for messages that carry no channel label.
    pub default_channel: String,
}

impl Default for FunnelSettings {
    fn default() -> Self {
        Self {
            unit_cost: 0.08,
            revenue_factor: metrics::DEFAULT_REVENUE_FACTOR,
            default_channel: "default".to_string(),
        }
    }
}

/// Optional per-identity enrichment wired into the run.
pub struct Enrichment {
    pub resolver: BatchCpfResolver,
    pub filters: HashMap<String, String>,
}

pub struct FunnelReportEngine<Q: ReportQuery, C: Clock + Clone> {
    harvester: TimeWindowHarvester<Q, C>,
    clock: C,
    settings: FunnelSettings,
    enrichment: Option<Enrichment>,
}

impl<Q: ReportQuery, C: Clock + Clone> FunnelReportEngine<Q, C> {
    pub fn new(query: Q, clock: C, page_cap: usize, settings: FunnelSettings) -> Self {
        Self {
            harvester: TimeWindowHarvester::new(query, clock.clone(), page_cap),
            clock,
            settings,
            enrichment: None,
        }
    }

    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn with_min_window(mut self, min_window: chrono::Duration) -> Self {
        self.harvester = self.harvester.with_min_window(min_window);
        self
    }

    /// Produce one best-effort snapshot for `range`. Upstream failures
    /// surface only as smaller harvests and audit counters, never as an
    /// error from this method.
    pub async fn run(&self, range: TimeRange) -> FunnelSnapshot {
        tracing::info!("🚀 Building funnel snapshot for {}", range);

        let messages = self
            .harvester
            .harvest(SourceKind::MessageStatus, range)
            .await;
        let accesses = self.harvester.harvest(SourceKind::AccessEvent, range).await;
        let proposals = self.harvester.harvest(SourceKind::Proposal, range).await;

        let message_records: Vec<MessageRecord> =
            messages.records.iter().map(classify::classify_message).collect();
        let access_records: Vec<AccessRecord> =
            accesses.records.iter().map(classify::classify_access).collect();
        let proposal_records: Vec<ProposalRecord> =
            proposals.records.iter().map(classify::classify_proposal).collect();

        let enriched = match &self.enrichment {
            Some(enrichment) => {
                let sale_identities: Vec<Identity> = proposal_records
                    .iter()
                    .filter(|p| p.outcome.is_sale() && !p.identity.is_empty())
                    .map(|p| p.identity.clone())
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                let resolved = enrichment
                    .resolver
                    .resolve(sale_identities, &enrichment.filters)
                    .await;
                enriched_amounts(resolved)
            }
            None => HashMap::new(),
        };

        let snapshot = build_snapshot(
            self.clock.now(),
            range,
            &[&messages, &accesses, &proposals],
            &message_records,
            &access_records,
            &proposal_records,
            &enriched,
            &self.settings,
        );

        for channel in &snapshot.channels {
            tracing::info!(
                "📈 {}: {} sends, {} leads, {} sales, revenue {:.2}, roi {:.2}",
                channel.channel,
                channel.send_count,
                channel.lead_count,
                channel.sale_count,
                channel.total_revenue,
                channel.roi
            );
        }

        snapshot
    }
}

/// Collapse resolved lookup records into one enriched amount per identity.
fn enriched_amounts(
    resolved: HashMap<Identity, Vec<crate::domain::model::RawRecord>>,
) -> HashMap<Identity, f64> {
    resolved
        .into_iter()
        .map(|(identity, records)| {
            let amount = records
                .iter()
                .filter_map(classify::record_amount)
                .sum::<f64>();
            (identity, amount)
        })
        .collect()
}

/// Pure snapshot assembly from classified records. Channel attribution
/// follows the message report; leads are access identities seen by a
/// channel's messages, sales are paid proposals among that channel's leads.
#[allow(clippy::too_many_arguments)]
fn build_snapshot(
    generated_at: DateTime<Utc>,
    range: TimeRange,
    harvests: &[&HarvestResult; 3],
    message_records: &[MessageRecord],
    access_records: &[AccessRecord],
    proposal_records: &[ProposalRecord],
    enriched: &HashMap<Identity, f64>,
    settings: &FunnelSettings,
) -> FunnelSnapshot {
    // BTreeMap keeps channel output order stable across runs.
    let mut by_channel: BTreeMap<String, Vec<&MessageRecord>> = BTreeMap::new();
    for message in message_records {
        let channel = message
            .channel
            .clone()
            .unwrap_or_else(|| settings.default_channel.clone());
        by_channel.entry(channel).or_default().push(message);
    }

    let access_set = NamedIdentitySet::new(
        "accesses",
        access_records
            .iter()
            .map(|a| a.identity.clone())
            .filter(|i| !i.is_empty())
            .collect(),
    );
    let sale_records: Vec<&ProposalRecord> = proposal_records
        .iter()
        .filter(|p| p.outcome.is_sale())
        .collect();

    let mut channels = Vec::with_capacity(by_channel.len());
    let mut joins = Vec::new();
    for (channel, channel_messages) in &by_channel {
        let send_count = channel_messages.len() as u64;
        let delivered_count = channel_messages
            .iter()
            .filter(|m| m.status == DeliveryStatus::Delivered)
            .count() as u64;

        let message_set = NamedIdentitySet::new(
            format!("messages/{}", channel),
            channel_messages
                .iter()
                .map(|m| m.identity.clone())
                .filter(|i| !i.is_empty())
                .collect(),
        );
        let leads = join::join(&access_set, &message_set);

        let lead_set = NamedIdentitySet::new(
            format!("leads/{}", channel),
            leads.identities.clone(),
        );
        let sale_targets = NamedIdentitySet::new(
            "proposals/sales",
            sale_records.iter().map(|p| p.identity.clone()).collect(),
        );
        let sales = join::join(&sale_targets, &lead_set);

        let matched: HashSet<&Identity> = sales.identities.iter().collect();
        let mut total_revenue: f64 = sale_records
            .iter()
            .filter(|p| matched.contains(&p.identity))
            .map(|p| p.amount)
            .sum();
        for identity in &matched {
            total_revenue += enriched.get(*identity).copied().unwrap_or(0.0);
        }

        let input = FunnelInput {
            send_count,
            delivered_count,
            lead_count: leads.distinct as u64,
            sale_count: sales.post_filter as u64,
            total_revenue,
            unit_cost: settings.unit_cost,
            revenue_factor: settings.revenue_factor,
        };
        channels.push(metrics::calculate(channel, &input));
        joins.push(leads.audit());
        joins.push(sales.audit());
    }

    FunnelSnapshot {
        generated_at,
        range,
        channels,
        harvests: harvests.iter().map(|h| h.audit()).collect(),
        joins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::ProposalOutcome;
    use chrono::TimeZone;

    fn phone_identity(phone: &str) -> Identity {
        Identity {
            phone: Some(phone.to_string()),
            national_id: None,
        }
    }

    fn message(phone: &str, channel: Option<&str>, status: DeliveryStatus) -> MessageRecord {
        MessageRecord {
            identity: phone_identity(phone),
            channel: channel.map(str::to_string),
            status,
        }
    }

    fn access(phone: &str) -> AccessRecord {
        AccessRecord {
            identity: phone_identity(phone),
            link: None,
        }
    }

    fn proposal(phone: &str, outcome: ProposalOutcome, amount: f64) -> ProposalRecord {
        ProposalRecord {
            identity: phone_identity(phone),
            outcome,
            amount,
        }
    }

    fn empty_harvest(source: SourceKind, range: TimeRange) -> HarvestResult {
        HarvestResult {
            source,
            range,
            records: Vec::new(),
            windows_queried: 1,
            windows_split: 0,
            windows_failed: 0,
            duplicates_dropped: 0,
        }
    }

    fn snapshot_for(
        messages: &[MessageRecord],
        accesses: &[AccessRecord],
        proposals: &[ProposalRecord],
        enriched: &HashMap<Identity, f64>,
    ) -> FunnelSnapshot {
        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 7, 23, 59, 59).unwrap(),
        )
        .unwrap();
        let harvests = [
            empty_harvest(SourceKind::MessageStatus, range),
            empty_harvest(SourceKind::AccessEvent, range),
            empty_harvest(SourceKind::Proposal, range),
        ];
        build_snapshot(
            Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap(),
            range,
            &[&harvests[0], &harvests[1], &harvests[2]],
            messages,
            accesses,
            proposals,
            enriched,
            &FunnelSettings::default(),
        )
    }

    const A: &str = "11900000001";
    const B: &str = "11900000002";
    const C: &str = "11900000003";
    const D: &str = "11900000004";

    #[test]
    fn test_funnel_counts_per_channel() {
        let messages = vec![
            message(A, Some("whatsapp"), DeliveryStatus::Delivered),
            message(B, Some("whatsapp"), DeliveryStatus::Delivered),
            message(C, Some("whatsapp"), DeliveryStatus::Sent),
        ];
        // D accessed but was never messaged; A and C engaged.
        let accesses = vec![access(A), access(C), access(D)];
        let proposals = vec![
            proposal(A, ProposalOutcome::Paid, 10_000.0),
            proposal(B, ProposalOutcome::Paid, 5_000.0), // not a lead
            proposal(C, ProposalOutcome::Cancelled, 7_000.0),
        ];

        let snapshot = snapshot_for(&messages, &accesses, &proposals, &HashMap::new());

        assert_eq!(snapshot.channels.len(), 1);
        let channel = &snapshot.channels[0];
        assert_eq!(channel.channel, "whatsapp");
        assert_eq!(channel.send_count, 3);
        assert_eq!(channel.delivered_count, 2);
        assert_eq!(channel.lead_count, 2);
        assert_eq!(channel.sale_count, 1);
        assert_eq!(channel.total_revenue, 10_000.0);
        assert_eq!(snapshot.joins.len(), 2);
        assert_eq!(snapshot.joins[0].pre_filter, 3);
        assert_eq!(snapshot.joins[0].post_filter, 2);
    }

    #[test]
    fn test_unlabeled_messages_fall_into_default_channel() {
        let messages = vec![
            message(A, Some("sms"), DeliveryStatus::Delivered),
            message(B, None, DeliveryStatus::Delivered),
        ];
        let snapshot = snapshot_for(&messages, &[], &[], &HashMap::new());

        let names: Vec<&str> = snapshot
            .channels
            .iter()
            .map(|c| c.channel.as_str())
            .collect();
        assert_eq!(names, vec!["default", "sms"]);
    }

    #[test]
    fn test_enriched_amounts_add_to_revenue() {
        let messages = vec![message(A, Some("sms"), DeliveryStatus::Delivered)];
        let accesses = vec![access(A)];
        let proposals = vec![proposal(A, ProposalOutcome::Paid, 1_000.0)];
        let mut enriched = HashMap::new();
        enriched.insert(phone_identity(A), 500.0);

        let snapshot = snapshot_for(&messages, &accesses, &proposals, &enriched);

        assert_eq!(snapshot.channels[0].total_revenue, 1_500.0);
    }

    #[test]
    fn test_empty_inputs_produce_empty_snapshot() {
        let snapshot = snapshot_for(&[], &[], &[], &HashMap::new());
        assert!(snapshot.channels.is_empty());
        assert!(snapshot.joins.is_empty());
        assert_eq!(snapshot.harvests.len(), 3);
    }
}
