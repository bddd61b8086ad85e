use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::scoring::{Thresholds, apply_decay, score_message};
use crate::chaos::collaborators::{CollaboratorError, ProvocationSource};
use crate::config::{ConfigError, HonkCfg};
use crate::types::{GuildId, ProvocationEvent, ProvocationRecord, Severity, UserId};

/// Decayed scores below this are forgotten on prune.
const PRUNE_EPSILON: f32 = 0.05;

/// Result of recording one scored message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredProvocation {
    /// Score of this message alone.
    pub added: f32,
    /// Decayed prior score plus `added`.
    pub total: f32,
    pub severity: Severity,
}

/// Per-(guild, user) provocation records with bounded retention.
#[derive(Debug)]
pub struct ProvocationLedger {
    records: Mutex<HashMap<(GuildId, UserId), ProvocationRecord>>,
    thresholds: Thresholds,
    half_life_secs: f64,
    max_records: usize,
}

impl ProvocationLedger {
    pub fn new(thresholds: Thresholds, half_life_secs: f64, max_records: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            thresholds,
            half_life_secs,
            max_records: max_records.max(1),
        }
    }

    pub fn from_cfg(cfg: &HonkCfg) -> Result<Self, ConfigError> {
        Ok(Self::new(
            Thresholds::from_cfg(cfg)?,
            cfg.provocation_half_life_secs,
            cfg.provocation_max_records,
        ))
    }

    fn records(&self) -> MutexGuard<'_, HashMap<(GuildId, UserId), ProvocationRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn decayed(&self, record: &ProvocationRecord, now: DateTime<Utc>) -> f32 {
        apply_decay(record.score, record.last_updated, now, self.half_life_secs)
    }

    /// Score `event`, fold it into the author's record and classify the total.
    pub fn record(
        &self,
        guild: GuildId,
        event: &ProvocationEvent,
        history: &[ProvocationEvent],
        now: DateTime<Utc>,
    ) -> ScoredProvocation {
        let added = score_message(event, history, now);
        let key = (guild, event.author);

        let mut records = self.records();
        let (prior, last_updated) = match records.get(&key) {
            Some(r) => (self.decayed(r, now), r.last_updated.max(now)),
            None => (0.0, now),
        };
        let total = prior + added;
        records.insert(key, ProvocationRecord { score: total, last_updated });

        if records.len() > self.max_records {
            self.evict_weakest(&mut records, key, now);
        }

        ScoredProvocation {
            added,
            total,
            severity: self.thresholds.classify(total),
        }
    }

    /// Current decayed score, 0 when unknown.
    pub fn score_of(&self, guild: GuildId, user: UserId, now: DateTime<Utc>) -> f32 {
        self.records()
            .get(&(guild, user))
            .map(|r| self.decayed(r, now))
            .unwrap_or(0.0)
    }

    /// Highest decayed score in the guild relative to the severe threshold.
    pub fn guild_level(&self, guild: GuildId, now: DateTime<Utc>) -> f32 {
        let peak = self
            .records()
            .iter()
            .filter(|((g, _), _)| *g == guild)
            .map(|(_, r)| self.decayed(r, now))
            .fold(0.0f32, f32::max);
        (peak / self.thresholds.severe()).clamp(0.0, 1.0)
    }

    /// Forget a user's record, e.g. after an admin pardon.
    pub fn forgive(&self, guild: GuildId, user: UserId) -> bool {
        self.records().remove(&(guild, user)).is_some()
    }

    /// Drop records whose decayed score fell below the retention floor.
    /// Returns the number removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, r| self.decayed(r, now) >= PRUNE_EPSILON);
        let removed = before - records.len();
        if removed > 0 {
            tracing::debug!(removed, kept = records.len(), "pruned provocation records");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    fn evict_weakest(
        &self,
        records: &mut HashMap<(GuildId, UserId), ProvocationRecord>,
        keep: (GuildId, UserId),
        now: DateTime<Utc>,
    ) {
        let victim = records
            .iter()
            .filter(|(k, _)| **k != keep)
            .min_by(|(_, a), (_, b)| {
                self.decayed(a, now)
                    .partial_cmp(&self.decayed(b, now))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(k, _)| *k);
        if let Some(key) = victim {
            records.remove(&key);
        }
    }
}

#[async_trait::async_trait]
impl ProvocationSource for ProvocationLedger {
    async fn provocation_level(&self, guild: GuildId) -> Result<f32, CollaboratorError> {
        Ok(self.guild_level(guild, Utc::now()))
    }
}
