//! Memory domain model: per-agent context items tiered by recency and use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage tier. Retier moves exactly one step at a time; no tier-skipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    Hot,
    Warm,
    Cold,
}

impl MemoryTier {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "hot" => Some(Self::Hot),
            "warm" => Some(Self::Warm),
            "cold" => Some(Self::Cold),
            _ => None,
        }
    }

    pub const fn demote(&self) -> Option<Self> {
        match self {
            Self::Hot => Some(Self::Warm),
            Self::Warm => Some(Self::Cold),
            Self::Cold => None,
        }
    }

    pub const fn promote(&self) -> Option<Self> {
        match self {
            Self::Cold => Some(Self::Warm),
            Self::Warm => Some(Self::Hot),
            Self::Hot => None,
        }
    }
}

/// A single fact or artifact an agent has accumulated, subject to tiering
/// under the context budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub project_id: Uuid,
    pub tier: MemoryTier,
    pub key: String,
    pub value: String,
    pub token_count: u64,
    pub usage_count: u64,
    pub pinned: bool,
    pub importance: f64,
    pub accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

/// Weights for the importance formula: `w1*recency + w2*usage + w3*pin`.
pub struct ImportanceWeights {
    pub recency: f64,
    pub usage: f64,
    pub pin: f64,
    /// `tau` in `recency = exp(-delta_t / tau)`, in seconds.
    pub recency_tau_seconds: f64,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            recency: 0.5,
            usage: 0.3,
            pin: 0.2,
            recency_tau_seconds: 3600.0,
        }
    }
}

impl MemoryItem {
    pub fn new(
        agent_id: Uuid,
        project_id: Uuid,
        key: impl Into<String>,
        value: impl Into<String>,
        token_count: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_id,
            project_id,
            tier: MemoryTier::Hot,
            key: key.into(),
            value: value.into(),
            token_count,
            usage_count: 0,
            pinned: false,
            importance: 0.0,
            accessed_at: now,
            created_at: now,
            version: 0,
        }
    }

    pub fn pin(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub fn touch(&mut self) {
        self.usage_count += 1;
        self.accessed_at = Utc::now();
        self.version += 1;
    }

    /// Recomputes `importance` from recency decay, usage, and pin bonus.
    /// Normalizes usage_count against `max_usage` (the max across the
    /// agent's live items) so the usage term stays in `[0, 1]`.
    pub fn recompute_importance(&mut self, weights: &ImportanceWeights, now: DateTime<Utc>, max_usage: u64) {
        let delta_t = (now - self.accessed_at).num_seconds().max(0) as f64;
        let recency = (-delta_t / weights.recency_tau_seconds).exp();
        let usage = if max_usage == 0 {
            0.0
        } else {
            self.usage_count as f64 / max_usage as f64
        };
        let pin = if self.pinned { 1.0 } else { 0.0 };
        self.importance = weights.recency * recency + weights.usage * usage + weights.pin * pin;
    }

    /// One-step demotion (HOT -> WARM -> COLD). No-op at COLD.
    pub fn retier_down(&mut self) {
        if let Some(next) = self.tier.demote() {
            self.tier = next;
            self.version += 1;
        }
    }

    /// One-step promotion (COLD -> WARM -> HOT). No-op at HOT.
    pub fn retier_up(&mut self) {
        if let Some(next) = self.tier.promote() {
            self.tier = next;
            self.version += 1;
        }
    }
}
