//! Local per-batch tally of valid events.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::RawEvent;

/// Counts folded from one batch: total, per action and per user.
///
/// Counters are commutative, so the fold order of events never matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub count: u64,
    pub by_action: BTreeMap<String, u64>,
    pub by_user: BTreeMap<String, u64>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a sequence of already-validated events.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a RawEvent>) -> Self {
        let mut tally = Self::new();
        for event in events {
            tally.add(event);
        }
        tally
    }

    pub fn add(&mut self, event: &RawEvent) {
        self.count += 1;
        *self.by_action.entry(event.action.clone()).or_insert(0) += 1;
        *self.by_user.entry(event.user_id.clone()).or_insert(0) += 1;
    }

    /// Componentwise sum with another tally.
    pub fn combine(&mut self, other: &Tally) {
        self.count += other.count;
        for (action, n) in &other.by_action {
            *self.by_action.entry(action.clone()).or_insert(0) += n;
        }
        for (user, n) in &other.by_user {
            *self.by_user.entry(user.clone()).or_insert(0) += n;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn action_types(&self) -> usize {
        self.by_action.len()
    }

    pub fn unique_users(&self) -> usize {
        self.by_user.len()
    }
}
