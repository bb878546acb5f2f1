//! Typed views over the free-form upstream records.
//!
//! The upstream APIs report near-duplicate field names per source and per
//! version ("telefone"/"celular"/"msisdn", "status"/"situacao"...). Each
//! record is decoded once into a small tagged struct with explicit optional
//! fields and an `Unclassified` fallback, instead of ad-hoc substring checks
//! scattered over the pipeline.

use crate::core::normalize;
use crate::domain::model::{Identity, RawRecord};
use serde::{Deserialize, Serialize};

const PHONE_FIELDS: &[&str] = &["phone", "telefone", "celular", "msisdn", "destination"];
const NATIONAL_ID_FIELDS: &[&str] = &["cpf", "document", "documento", "national_id"];
const STATUS_FIELDS: &[&str] = &["status", "delivery_status", "situacao", "situation"];
const PROPOSAL_STATUS_FIELDS: &[&str] = &["status", "situacao", "situation", "fase", "phase"];
const CHANNEL_FIELDS: &[&str] = &["channel", "canal", "campaign", "campanha"];
const LINK_FIELDS: &[&str] = &["url", "link", "short_url"];
const AMOUNT_FIELDS: &[&str] = &["amount", "valor", "value", "net_value", "valor_liquido"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Delivered,
    Sent,
    Failed,
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalOutcome {
    Paid,
    Contracted,
    InProgress,
    Cancelled,
    Unclassified,
}

impl ProposalOutcome {
    /// The single sale decision: one classification per record. The
    /// upstream reports the same outcome across several overlapping text
    /// fields; counting them independently overcounts sales.
    pub fn is_sale(&self) -> bool {
        matches!(self, ProposalOutcome::Paid | ProposalOutcome::Contracted)
    }
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub identity: Identity,
    pub channel: Option<String>,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub identity: Identity,
    pub link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProposalRecord {
    pub identity: Identity,
    pub outcome: ProposalOutcome,
    pub amount: f64,
}

fn identity_of(record: &RawRecord) -> Identity {
    normalize::identity(
        record.first_text(PHONE_FIELDS),
        record.first_text(NATIONAL_ID_FIELDS),
    )
}

fn delivery_status(value: &str) -> DeliveryStatus {
    let value = value.trim().to_lowercase();
    // Failure keywords first: "not delivered" must not classify as Delivered.
    if ["failed", "error", "erro", "undelivered", "not delivered", "falha"]
        .iter()
        .any(|k| value.contains(k))
    {
        DeliveryStatus::Failed
    } else if ["delivered", "entregue"].iter().any(|k| value.contains(k)) {
        DeliveryStatus::Delivered
    } else if ["sent", "enviado", "enviada"].iter().any(|k| value.contains(k)) {
        DeliveryStatus::Sent
    } else {
        DeliveryStatus::Unclassified
    }
}

fn proposal_outcome(value: &str) -> ProposalOutcome {
    let value = value.trim().to_lowercase();
    if ["cancel", "reprov", "recus"].iter().any(|k| value.contains(k)) {
        ProposalOutcome::Cancelled
    } else if ["pago", "paid", "integrado"].iter().any(|k| value.contains(k)) {
        ProposalOutcome::Paid
    } else if ["contratado", "contracted", "financiado", "financed"]
        .iter()
        .any(|k| value.contains(k))
    {
        ProposalOutcome::Contracted
    } else if ["andamento", "analise", "progress", "pendente", "pending"]
        .iter()
        .any(|k| value.contains(k))
    {
        ProposalOutcome::InProgress
    } else {
        ProposalOutcome::Unclassified
    }
}

pub fn classify_message(record: &RawRecord) -> MessageRecord {
    MessageRecord {
        identity: identity_of(record),
        channel: record
            .first_text(CHANNEL_FIELDS)
            .map(|c| c.trim().to_lowercase()),
        status: record
            .first_text(STATUS_FIELDS)
            .map(delivery_status)
            .unwrap_or(DeliveryStatus::Unclassified),
    }
}

pub fn classify_access(record: &RawRecord) -> AccessRecord {
    AccessRecord {
        identity: identity_of(record),
        link: record.first_text(LINK_FIELDS).map(str::to_string),
    }
}

pub fn classify_proposal(record: &RawRecord) -> ProposalRecord {
    ProposalRecord {
        identity: identity_of(record),
        outcome: record
            .first_text(PROPOSAL_STATUS_FIELDS)
            .map(proposal_outcome)
            .unwrap_or(ProposalOutcome::Unclassified),
        amount: record_amount(record).unwrap_or(0.0),
    }
}

/// Monetary amount of a record, wherever the upstream put it. Shared with
/// the enrichment pipeline, which sums amounts from lookup responses.
pub fn record_amount(record: &RawRecord) -> Option<f64> {
    record.first_number(AMOUNT_FIELDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(fields: &[(&str, serde_json::Value)]) -> RawRecord {
        let mut data = HashMap::new();
        for (k, v) in fields {
            data.insert(k.to_string(), v.clone());
        }
        RawRecord::new(data)
    }

    #[test]
    fn test_message_record_from_variant_fields() {
        let msg = classify_message(&record(&[
            ("celular", serde_json::json!("(11) 98765-4321")),
            ("situacao", serde_json::json!("ENTREGUE")),
            ("canal", serde_json::json!("WhatsApp")),
        ]));
        assert_eq!(msg.identity.phone.as_deref(), Some("11987654321"));
        assert_eq!(msg.status, DeliveryStatus::Delivered);
        assert_eq!(msg.channel.as_deref(), Some("whatsapp"));
    }

    #[test]
    fn test_message_not_delivered_is_failed() {
        let msg = classify_message(&record(&[(
            "status",
            serde_json::json!("NOT DELIVERED"),
        )]));
        assert_eq!(msg.status, DeliveryStatus::Failed);
    }

    #[test]
    fn test_message_without_status_is_unclassified() {
        let msg = classify_message(&record(&[("phone", serde_json::json!("11987654321"))]));
        assert_eq!(msg.status, DeliveryStatus::Unclassified);
    }

    #[test]
    fn test_proposal_single_decision_across_overlapping_fields() {
        // Upstream repeats the outcome in several fields; only the first
        // present status field decides, so this is one sale, not two.
        let proposal = classify_proposal(&record(&[
            ("cpf", serde_json::json!("123.456.789-09")),
            ("status", serde_json::json!("PAGO - INTEGRADO")),
            ("situacao", serde_json::json!("CONTRATO PAGO")),
            ("valor", serde_json::json!(12500.0)),
        ]));
        assert_eq!(proposal.outcome, ProposalOutcome::Paid);
        assert!(proposal.outcome.is_sale());
        assert_eq!(proposal.amount, 12500.0);
        assert_eq!(proposal.identity.national_id.as_deref(), Some("12345678909"));
    }

    #[test]
    fn test_proposal_cancelled_wins_over_paid_keyword() {
        // "PAGAMENTO CANCELADO" mentions payment but is not a sale.
        let proposal = classify_proposal(&record(&[(
            "status",
            serde_json::json!("PAGAMENTO CANCELADO"),
        )]));
        assert_eq!(proposal.outcome, ProposalOutcome::Cancelled);
        assert!(!proposal.outcome.is_sale());
    }

    #[test]
    fn test_proposal_in_progress_and_unclassified() {
        let in_progress = classify_proposal(&record(&[(
            "situacao",
            serde_json::json!("EM ANDAMENTO"),
        )]));
        assert_eq!(in_progress.outcome, ProposalOutcome::InProgress);

        let unknown = classify_proposal(&record(&[("status", serde_json::json!("???"))]));
        assert_eq!(unknown.outcome, ProposalOutcome::Unclassified);
    }

    #[test]
    fn test_access_record_keeps_both_keys() {
        let access = classify_access(&record(&[
            ("telefone", serde_json::json!("5511987654321")),
            ("documento", serde_json::json!("98765432100")),
            ("link", serde_json::json!("https://l.example/abc")),
        ]));
        assert_eq!(access.identity.phone.as_deref(), Some("11987654321"));
        assert_eq!(access.identity.national_id.as_deref(), Some("98765432100"));
        assert_eq!(access.link.as_deref(), Some("https://l.example/abc"));
    }
}
