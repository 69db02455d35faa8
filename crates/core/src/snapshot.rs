//! The singleton aggregate metrics document and its merge rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::Tally;

/// Running totals across every event the worker has aggregated.
///
/// Exactly one logical snapshot exists; stores upsert into a fixed key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_events: u64,
    #[serde(default)]
    pub events_by_action: BTreeMap<String, u64>,
    #[serde(default)]
    pub events_by_user: BTreeMap<String, u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// A zero-valued snapshot, used when none has been persisted yet.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            total_events: 0,
            events_by_action: BTreeMap::new(),
            events_by_user: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a batch tally to this snapshot.
    ///
    /// Keys missing from the tally are carried through unchanged. `created_at`
    /// is preserved and `updated_at` is set to `now`.
    pub fn merged(&self, tally: &Tally, now: DateTime<Utc>) -> Self {
        let mut merged = self.clone();
        merged.total_events += tally.count;
        for (action, n) in &tally.by_action {
            *merged.events_by_action.entry(action.clone()).or_insert(0) += n;
        }
        for (user, n) in &tally.by_user {
            *merged.events_by_user.entry(user.clone()).or_insert(0) += n;
        }
        merged.updated_at = now;
        merged
    }

    /// Merges into an optional persisted snapshot, treating absence as zero.
    pub fn merge_into(existing: Option<&Self>, tally: &Tally, now: DateTime<Utc>) -> Self {
        match existing {
            Some(snapshot) => snapshot.merged(tally, now),
            None => Self::empty(now).merged(tally, now),
        }
    }

    /// `total_events` equals the sum of both per-key maps.
    pub fn is_consistent(&self) -> bool {
        let by_action: u64 = self.events_by_action.values().sum();
        let by_user: u64 = self.events_by_user.values().sum();
        self.total_events == by_action && self.total_events == by_user
    }

    pub fn count_for_action(&self, action: &str) -> u64 {
        self.events_by_action.get(action).copied().unwrap_or(0)
    }

    pub fn count_for_user(&self, user_id: &str) -> u64 {
        self.events_by_user.get(user_id).copied().unwrap_or(0)
    }
}
