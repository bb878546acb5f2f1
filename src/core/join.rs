//! Cross-source identity reconciliation.
//!
//! Sources key their records differently (proposals by national id,
//! message/access events by phone), so membership checks prefer the
//! national id and fall back to the phone. Two absent values never match.

use crate::domain::model::{Identity, JoinedIdentitySet};
use std::collections::HashSet;

/// An identity set with a label used in join audits and logs, e.g.
/// "accesses" or "proposals/paid".
#[derive(Debug, Clone)]
pub struct NamedIdentitySet {
    pub name: String,
    pub identities: Vec<Identity>,
}

impl NamedIdentitySet {
    pub fn new(name: impl Into<String>, identities: Vec<Identity>) -> Self {
        Self {
            name: name.into(),
            identities,
        }
    }
}

/// Filter `target` down to the entries whose identity also appears in
/// `reference`. The reference collapses to set semantics; target order and
/// duplicates are preserved so callers can count matched records as well as
/// distinct identities.
pub fn join(target: &NamedIdentitySet, reference: &NamedIdentitySet) -> JoinedIdentitySet {
    let mut reference_national_ids: HashSet<&str> = HashSet::new();
    let mut reference_phones: HashSet<&str> = HashSet::new();
    for identity in &reference.identities {
        if let Some(national_id) = &identity.national_id {
            reference_national_ids.insert(national_id);
        }
        if let Some(phone) = &identity.phone {
            reference_phones.insert(phone);
        }
    }

    let matched: Vec<Identity> = target
        .identities
        .iter()
        .filter(|identity| {
            // National id is the stable key; phone is the fallback.
            if let Some(national_id) = &identity.national_id {
                if reference_national_ids.contains(national_id.as_str()) {
                    return true;
                }
            }
            if let Some(phone) = &identity.phone {
                if reference_phones.contains(phone.as_str()) {
                    return true;
                }
            }
            false
        })
        .cloned()
        .collect();

    let distinct = matched.iter().collect::<HashSet<_>>().len();
    let joined = JoinedIdentitySet {
        target_name: target.name.clone(),
        reference_name: reference.name.clone(),
        pre_filter: target.identities.len(),
        post_filter: matched.len(),
        distinct,
        identities: matched,
    };

    tracing::debug!(
        "🔗 join {} ∩ {}: {} -> {} ({} distinct)",
        joined.target_name,
        joined.reference_name,
        joined.pre_filter,
        joined.post_filter,
        joined.distinct
    );

    joined
}
