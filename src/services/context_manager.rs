//! Per-agent tiered context memory (C3): HOT/WARM/COLD, importance scoring,
//! eviction, and flash-save.
//!
//! Mutations take a per-agent write lock; `retier`/`rescore` read the whole
//! agent's item set and write it back atomically so concurrent readers see
//! either the pre- or post-retier state, never a mix (§5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::error::{CoreError, CoreResult};
use crate::domain::models::{ImportanceWeights, MemoryItem, MemoryTier};
use crate::domain::ports::MemoryRepository;

/// Outcome of a successful flash-save.
#[derive(Debug, Clone)]
pub struct FlashSaveOutcome {
    pub summary_item: MemoryItem,
    pub items_archived: usize,
}

pub struct ContextManager {
    repository: Arc<dyn MemoryRepository>,
    weights: ImportanceWeights,
    hot_budget_tokens: u64,
    warm_budget_tokens: u64,
    flash_save_headroom_ratio: f64,
    agent_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
    last_flash_save: Mutex<HashMap<(Uuid, String), DateTime<Utc>>>,
    flash_save_dead_time: ChronoDuration,
}

impl ContextManager {
    pub fn new(
        repository: Arc<dyn MemoryRepository>,
        hot_budget_tokens: u64,
        warm_budget_tokens: u64,
        flash_save_headroom_ratio: f64,
    ) -> Self {
        Self {
            repository,
            weights: ImportanceWeights::default(),
            hot_budget_tokens,
            warm_budget_tokens,
            flash_save_headroom_ratio,
            agent_locks: RwLock::new(HashMap::new()),
            last_flash_save: Mutex::new(HashMap::new()),
            flash_save_dead_time: ChronoDuration::seconds(60),
        }
    }

    async fn lock_for(&self, agent_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.agent_locks.read().await.get(&agent_id) {
            return lock.clone();
        }
        let mut locks = self.agent_locks.write().await;
        locks.entry(agent_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Records a new HOT item. Returns the stored item.
    pub async fn record(
        &self,
        agent_id: Uuid,
        project_id: Uuid,
        key: impl Into<String>,
        value: impl Into<String>,
        token_count: u64,
        initial_importance: f64,
    ) -> CoreResult<MemoryItem> {
        let lock = self.lock_for(agent_id).await;
        let _guard = lock.lock().await;

        let mut item = MemoryItem::new(agent_id, project_id, key, value, token_count);
        item.importance = initial_importance;
        self.repository.create(&item).await?;
        Ok(item)
    }

    /// HOT items first, then WARM; COLD is excluded unless the caller
    /// explicitly rehydrates an item first. `query` filters by substring
    /// match against `key` or `value` when present.
    pub async fn retrieve(&self, agent_id: Uuid, query: Option<&str>) -> CoreResult<Vec<MemoryItem>> {
        let mut hot = self.repository.list_by_tier(agent_id, MemoryTier::Hot).await?;
        let mut warm = self.repository.list_by_tier(agent_id, MemoryTier::Warm).await?;
        hot.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));
        warm.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));

        let matches = |item: &MemoryItem| match query {
            Some(q) => item.key.contains(q) || item.value.contains(q),
            None => true,
        };

        let mut out: Vec<MemoryItem> = hot.into_iter().filter(&matches).collect();
        out.extend(warm.into_iter().filter(&matches));
        Ok(out)
    }

    /// Recomputes `importance` for every item an agent owns (all three
    /// tiers), relative to `now` and the agent's current max usage_count.
    pub async fn rescore(&self, agent_id: Uuid) -> CoreResult<()> {
        let lock = self.lock_for(agent_id).await;
        let _guard = lock.lock().await;

        let mut items = self.all_tiers(agent_id).await?;
        let max_usage = items.iter().map(|i| i.usage_count).max().unwrap_or(0);
        let now = Utc::now();
        for item in items.iter_mut() {
            item.recompute_importance(&self.weights, now, max_usage);
            self.repository.update(item).await?;
        }
        Ok(())
    }

    async fn all_tiers(&self, agent_id: Uuid) -> CoreResult<Vec<MemoryItem>> {
        let mut items = self.repository.list_by_tier(agent_id, MemoryTier::Hot).await?;
        items.extend(self.repository.list_by_tier(agent_id, MemoryTier::Warm).await?);
        items.extend(self.repository.list_by_tier(agent_id, MemoryTier::Cold).await?);
        Ok(items)
    }

    /// Reassigns HOT/WARM tiers top-down by importance until the HOT and
    /// WARM budgets are exhausted; the remainder targets COLD. Per the
    /// state machine, a single call only steps a tier adjacent to its
    /// current one (HOT->WARM, WARM->HOT, WARM->COLD); COLD items never
    /// move here (only an explicit rehydrate promotes COLD->WARM), so an
    /// item destined for COLD from HOT takes two `retier` calls to get
    /// there. Atomic: either every changed item is persisted, or none are.
    pub async fn retier(&self, agent_id: Uuid) -> CoreResult<()> {
        let lock = self.lock_for(agent_id).await;
        let _guard = lock.lock().await;

        let mut items = self.all_tiers(agent_id).await?;
        items.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));

        let mut cumulative = 0u64;
        let mut target: HashMap<Uuid, MemoryTier> = HashMap::new();
        for item in &items {
            let next = cumulative + item.token_count;
            let tier = if next <= self.hot_budget_tokens {
                MemoryTier::Hot
            } else if next <= self.hot_budget_tokens + self.warm_budget_tokens {
                MemoryTier::Warm
            } else {
                MemoryTier::Cold
            };
            cumulative = next;
            target.insert(item.id, tier);
        }

        let mut changed: Vec<MemoryItem> = Vec::new();
        for item in items.iter_mut() {
            let target_tier = target[&item.id];
            match (item.tier, target_tier) {
                (MemoryTier::Hot, MemoryTier::Warm) | (MemoryTier::Hot, MemoryTier::Cold) => {
                    item.retier_down();
                    changed.push(item.clone());
                }
                (MemoryTier::Warm, MemoryTier::Hot) => {
                    item.retier_up();
                    changed.push(item.clone());
                }
                (MemoryTier::Warm, MemoryTier::Cold) => {
                    item.retier_down();
                    changed.push(item.clone());
                }
                _ => {}
            }
        }

        let hot_tokens: u64 = items
            .iter()
            .filter(|i| i.tier == MemoryTier::Hot)
            .map(|i| i.token_count)
            .sum();
        if hot_tokens > self.hot_budget_tokens {
            return Err(CoreError::ContextBudgetViolation {
                agent_id,
                hot_tokens,
                budget: self.hot_budget_tokens,
            });
        }

        for item in &changed {
            self.repository.update(item).await?;
        }
        Ok(())
    }

    /// Explicit rehydrate: promotes one item exactly one tier
    /// (COLD->WARM or WARM->HOT), bypassing the budget-driven `retier` pass.
    pub async fn rehydrate(&self, agent_id: Uuid, item_id: Uuid) -> CoreResult<MemoryItem> {
        let lock = self.lock_for(agent_id).await;
        let _guard = lock.lock().await;

        let mut item = self.repository.get(item_id).await?;
        if item.agent_id != agent_id {
            return Err(CoreError::validation("item does not belong to agent"));
        }
        item.retier_up();
        item.touch();
        self.repository.update(&item).await?;
        Ok(item)
    }

    /// When HOT usage is within `flash_save_headroom_ratio` of the HOT
    /// budget, archives all COLD items into a single compact WARM summary
    /// item. Idempotent per `reason` within a dead time window; returns
    /// `None` if the headroom isn't breached or the call is a duplicate.
    pub async fn flash_save(&self, agent_id: Uuid, project_id: Uuid, reason: &str) -> CoreResult<Option<FlashSaveOutcome>> {
        let hot_tokens = self.repository.sum_hot_tokens(agent_id).await?;
        let threshold = (self.hot_budget_tokens as f64 * (1.0 - self.flash_save_headroom_ratio)) as u64;
        if hot_tokens < threshold {
            return Ok(None);
        }

        {
            let mut last = self.last_flash_save.lock().await;
            let key = (agent_id, reason.to_string());
            let now = Utc::now();
            if let Some(previous) = last.get(&key) {
                if now - *previous < self.flash_save_dead_time {
                    return Ok(None);
                }
            }
            last.insert(key, now);
        }

        let lock = self.lock_for(agent_id).await;
        let _guard = lock.lock().await;

        let cold_items = self.repository.list_by_tier(agent_id, MemoryTier::Cold).await?;
        if cold_items.is_empty() {
            return Ok(None);
        }

        let archive = serde_json::json!(cold_items
            .iter()
            .map(|i| serde_json::json!({ "key": i.key, "value": i.value }))
            .collect::<Vec<_>>());
        let summary_value = format!(
            "flash-save ({reason}): archived {} cold items: {archive}",
            cold_items.len()
        );
        let mut summary = MemoryItem::new(
            agent_id,
            project_id,
            format!("flash_save:{reason}"),
            summary_value,
            cold_items.iter().map(|i| i.token_count).sum::<u64>().min(256),
        );
        summary.tier = MemoryTier::Warm;
        self.repository.create(&summary).await?;

        for item in &cold_items {
            self.repository.delete(item.id).await?;
        }

        Ok(Some(FlashSaveOutcome { summary_item: summary, items_archived: cold_items.len() }))
    }

    pub fn flash_save_dead_time(&self) -> StdDuration {
        self.flash_save_dead_time
            .to_std()
            .unwrap_or(StdDuration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_test_pool, Migrator, SqliteMemoryRepository};

    async fn manager(hot_budget: u64, warm_budget: u64) -> ContextManager {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        ContextManager::new(Arc::new(SqliteMemoryRepository::new(pool)), hot_budget, warm_budget, 0.1)
    }

    #[tokio::test]
    async fn retier_demotes_lowest_importance_items_out_of_hot() {
        let cm = manager(10, 10).await;
        let agent_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();

        let high = cm.record(agent_id, project_id, "high", "v", 6, 0.9).await.unwrap();
        let low = cm.record(agent_id, project_id, "low", "v", 6, 0.1).await.unwrap();

        cm.retier(agent_id).await.unwrap();

        let refreshed_high = cm.repository.get(high.id).await.unwrap();
        let refreshed_low = cm.repository.get(low.id).await.unwrap();
        assert_eq!(refreshed_high.tier, MemoryTier::Hot);
        assert_eq!(refreshed_low.tier, MemoryTier::Warm);
    }

    #[tokio::test]
    async fn retier_never_skips_cold_directly_from_hot_in_one_call() {
        let cm = manager(4, 0).await;
        let agent_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();
        let item = cm.record(agent_id, project_id, "k", "v", 20, 0.5).await.unwrap();

        cm.retier(agent_id).await.unwrap();
        let after_first = cm.repository.get(item.id).await.unwrap();
        assert_eq!(after_first.tier, MemoryTier::Warm);

        cm.retier(agent_id).await.unwrap();
        let after_second = cm.repository.get(item.id).await.unwrap();
        assert_eq!(after_second.tier, MemoryTier::Cold);
    }

    #[tokio::test]
    async fn rehydrate_promotes_cold_item_one_step() {
        let cm = manager(100, 100).await;
        let agent_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();
        let mut item = MemoryItem::new(agent_id, project_id, "k", "v", 5);
        item.tier = MemoryTier::Cold;
        cm.repository.create(&item).await.unwrap();

        let rehydrated = cm.rehydrate(agent_id, item.id).await.unwrap();
        assert_eq!(rehydrated.tier, MemoryTier::Warm);
    }

    #[tokio::test]
    async fn flash_save_is_idempotent_within_dead_time() {
        let cm = manager(10, 10).await;
        let agent_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();
        let mut cold = MemoryItem::new(agent_id, project_id, "c", "v", 3);
        cold.tier = MemoryTier::Cold;
        cm.repository.create(&cold).await.unwrap();
        let mut hot = MemoryItem::new(agent_id, project_id, "h", "v", 9);
        hot.tier = MemoryTier::Hot;
        cm.repository.create(&hot).await.unwrap();

        let first = cm.flash_save(agent_id, project_id, "near-limit").await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().items_archived, 1);

        let mut another_cold = MemoryItem::new(agent_id, project_id, "c2", "v", 3);
        another_cold.tier = MemoryTier::Cold;
        cm.repository.create(&another_cold).await.unwrap();
        let second = cm.flash_save(agent_id, project_id, "near-limit").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn flash_save_no_op_below_headroom_threshold() {
        let cm = manager(100, 100).await;
        let agent_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();
        let mut cold = MemoryItem::new(agent_id, project_id, "c", "v", 3);
        cold.tier = MemoryTier::Cold;
        cm.repository.create(&cold).await.unwrap();

        let result = cm.flash_save(agent_id, project_id, "reason").await.unwrap();
        assert!(result.is_none());
    }
}
