//! Due Set Selection
//!
//! Picks the cards a user should review next: due at `now`, oldest due date
//! first (ties by item id), optionally restricted to a set of topics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::{CardState, LearningState};
use crate::catalog::Item;
use crate::error::Result;
use crate::scheduler::MemoryScheduler;
use crate::storage::Storage;

/// Over-fetch factor applied before an in-memory topic filter
const TOPIC_FILTER_OVERFETCH: usize = 2;

/// Reference to a due item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueItem {
    pub item_id: String,
    pub topic: String,
    pub due_date: DateTime<Utc>,
    pub state: LearningState,
}

/// A due card together with its item and current recall probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardContext {
    pub card: CardState,
    pub item: Item,
    pub retrievability: f64,
}

/// Due and due-in-Review counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueCount {
    pub due_count: i64,
    pub review_count: i64,
}

/// Selects due items for a user
pub struct DueSetSelector {
    storage: Arc<Storage>,
    scheduler: Arc<dyn MemoryScheduler>,
}

impl DueSetSelector {
    pub fn new(storage: Arc<Storage>, scheduler: Arc<dyn MemoryScheduler>) -> Self {
        Self { storage, scheduler }
    }

    /// Up to `limit` due items, in due order.
    ///
    /// With a topic filter, `2 * limit` due cards are fetched and filtered by
    /// topic (case-insensitive), so a heavily skewed backlog may yield fewer
    /// than `limit` matches. `include_learning = false` keeps only cards in
    /// the Review state.
    pub fn select(
        &self,
        user_id: &str,
        topics: Option<&[String]>,
        limit: usize,
        include_learning: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let review_only = !include_learning;

        let wanted: Vec<String> = topics
            .unwrap_or_default()
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let fetch = if wanted.is_empty() {
            limit
        } else {
            limit.saturating_mul(TOPIC_FILTER_OVERFETCH)
        };

        let due = self
            .storage
            .due_cards_with_items(user_id, now, fetch, review_only)?
            .into_iter()
            .filter(|(_, item)| wanted.is_empty() || wanted.contains(&item.topic.to_lowercase()))
            .take(limit)
            .map(|(card, item)| DueItem {
                item_id: card.item_id,
                topic: item.topic,
                due_date: card.due_date,
                state: card.state,
            })
            .collect::<Vec<_>>();

        tracing::debug!("Selected {} due items for {}", due.len(), user_id);
        Ok(due)
    }

    /// Due cards with item metadata and retrievability at `now`
    pub fn with_item_context(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CardContext>> {
        Ok(self
            .storage
            .due_cards_with_items(user_id, now, limit, false)?
            .into_iter()
            .map(|(card, item)| {
                let retrievability = self.scheduler.retrievability(&card.memory_state(), now);
                CardContext {
                    card,
                    item,
                    retrievability,
                }
            })
            .collect())
    }

    /// Number of due cards, and how many of them are in Review
    pub fn count(&self, user_id: &str, now: DateTime<Utc>) -> Result<DueCount> {
        Ok(DueCount {
            due_count: self.storage.count_due(user_id, now, false)?,
            review_count: self.storage.count_due(user_id, now, true)?,
        })
    }
}
