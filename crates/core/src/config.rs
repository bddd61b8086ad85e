use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;

/// Upper bound on a scheduler cycle delay: one day.
pub const MAX_CYCLE_SECS: f64 = 86_400.0;

/// Invalid configuration input. Raised eagerly at construction time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid delay bounds: min={min}, max={max}")]
    InvalidDelayBounds { min: f64, max: f64 },
    #[error("{field} must be positive")]
    NonPositive { field: &'static str },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("thresholds must be strictly ordered: warn={warn} < retaliate={retaliate} < severe={severe}")]
    ThresholdOrder { warn: f32, retaliate: f32, severe: f32 },
    #[error("invalid rate limit: {max_events} events per {window_secs}s")]
    InvalidRateLimit { max_events: usize, window_secs: u64 },
}

/// All engine parameters. Loaded from the `honk_config` table at startup.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HonkCfg {
    // scheduler cycle (seconds)
    pub min_cycle_secs: f64,
    pub max_cycle_secs: f64,

    // per-guild pacing
    pub guild_cooldown_secs: u64,
    pub max_actions_per_hour: usize,

    // activity signals
    pub target_messages: u32,
    pub activity_floor: f32,

    // takeover
    pub takeover_threshold: u64,
    pub takeover_cooldown_secs: u64,
    pub channel_decay_step: u64,

    // action chance
    pub chance_base: f32,
    pub chance_chaos_weight: f32,
    pub chance_activity_weight: f32,
    pub chance_density_weight: f32,
    pub chance_provocation_weight: f32,

    // mood
    pub mood_decay_secs: f64,

    // provocation
    pub provocation_half_life_secs: f64,
    pub warn_threshold: f32,
    pub retaliate_threshold: f32,
    pub severe_threshold: f32,
    pub provocation_max_records: usize,

    // honkify
    pub honkify_chance: f32,
    pub double_honk_chance: f32,

    // persistence
    pub state_flush_interval_secs: u64,
}

impl Default for HonkCfg {
    fn default() -> Self {
        Self {
            min_cycle_secs: 45.0,
            max_cycle_secs: 120.0,
            guild_cooldown_secs: 300,
            max_actions_per_hour: 6,
            target_messages: 30,
            activity_floor: 0.05,
            takeover_threshold: 25,
            takeover_cooldown_secs: 900,
            channel_decay_step: 1,
            chance_base: 0.08,
            chance_chaos_weight: 0.25,
            chance_activity_weight: 0.20,
            chance_density_weight: 0.25,
            chance_provocation_weight: 0.20,
            mood_decay_secs: 600.0,
            provocation_half_life_secs: 300.0,
            warn_threshold: 3.0,
            retaliate_threshold: 6.0,
            severe_threshold: 10.0,
            provocation_max_records: 4096,
            honkify_chance: 0.12,
            double_honk_chance: 0.65,
            state_flush_interval_secs: 60,
        }
    }
}

impl HonkCfg {
    /// Load config from `honk_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM honk_config")
                .fetch_all(pool)
                .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `honk_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        let entries = self.to_entries();
        for (key, value, desc) in &entries {
            sqlx::query(
                "INSERT INTO honk_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Build from key/value strings; missing or unparsable keys keep their default.
    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            min_cycle_secs: get_or(m, "min_cycle_secs", d.min_cycle_secs),
            max_cycle_secs: get_or(m, "max_cycle_secs", d.max_cycle_secs),
            guild_cooldown_secs: get_or(m, "guild_cooldown_secs", d.guild_cooldown_secs),
            max_actions_per_hour: get_or(m, "max_actions_per_hour", d.max_actions_per_hour),
            target_messages: get_or(m, "target_messages", d.target_messages),
            activity_floor: get_or(m, "activity_floor", d.activity_floor),
            takeover_threshold: get_or(m, "takeover_threshold", d.takeover_threshold),
            takeover_cooldown_secs: get_or(m, "takeover_cooldown_secs", d.takeover_cooldown_secs),
            channel_decay_step: get_or(m, "channel_decay_step", d.channel_decay_step),
            chance_base: get_or(m, "chance_base", d.chance_base),
            chance_chaos_weight: get_or(m, "chance_chaos_weight", d.chance_chaos_weight),
            chance_activity_weight: get_or(m, "chance_activity_weight", d.chance_activity_weight),
            chance_density_weight: get_or(m, "chance_density_weight", d.chance_density_weight),
            chance_provocation_weight: get_or(m, "chance_provocation_weight", d.chance_provocation_weight),
            mood_decay_secs: get_or(m, "mood_decay_secs", d.mood_decay_secs),
            provocation_half_life_secs: get_or(m, "provocation_half_life_secs", d.provocation_half_life_secs),
            warn_threshold: get_or(m, "warn_threshold", d.warn_threshold),
            retaliate_threshold: get_or(m, "retaliate_threshold", d.retaliate_threshold),
            severe_threshold: get_or(m, "severe_threshold", d.severe_threshold),
            provocation_max_records: get_or(m, "provocation_max_records", d.provocation_max_records),
            honkify_chance: get_or(m, "honkify_chance", d.honkify_chance),
            double_honk_chance: get_or(m, "double_honk_chance", d.double_honk_chance),
            state_flush_interval_secs: get_or(m, "state_flush_interval_secs", d.state_flush_interval_secs),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("min_cycle_secs", self.min_cycle_secs.to_string(), "Minimum seconds between chaos cycles"),
            ("max_cycle_secs", self.max_cycle_secs.to_string(), "Maximum seconds between chaos cycles"),
            ("guild_cooldown_secs", self.guild_cooldown_secs.to_string(), "Guild cooldown after an autonomous action"),
            ("max_actions_per_hour", self.max_actions_per_hour.to_string(), "Autonomous actions allowed per guild per hour"),
            ("target_messages", self.target_messages.to_string(), "Recent messages that count as full activity"),
            ("activity_floor", self.activity_floor.to_string(), "Minimum activity score"),
            ("takeover_threshold", self.takeover_threshold.to_string(), "Channel honk count that arms a takeover"),
            ("takeover_cooldown_secs", self.takeover_cooldown_secs.to_string(), "Per-channel takeover cooldown seconds"),
            ("channel_decay_step", self.channel_decay_step.to_string(), "Channel honk decay per cycle"),
            ("chance_base", self.chance_base.to_string(), "Base action chance per cycle"),
            ("chance_chaos_weight", self.chance_chaos_weight.to_string(), "Action chance weight of mood chaos"),
            ("chance_activity_weight", self.chance_activity_weight.to_string(), "Action chance weight of activity"),
            ("chance_density_weight", self.chance_density_weight.to_string(), "Action chance weight of honk density"),
            ("chance_provocation_weight", self.chance_provocation_weight.to_string(), "Action chance weight of provocation"),
            ("mood_decay_secs", self.mood_decay_secs.to_string(), "Seconds for a full mood decay step"),
            ("provocation_half_life_secs", self.provocation_half_life_secs.to_string(), "Provocation score half-life seconds"),
            ("warn_threshold", self.warn_threshold.to_string(), "Provocation warn threshold"),
            ("retaliate_threshold", self.retaliate_threshold.to_string(), "Provocation retaliate threshold"),
            ("severe_threshold", self.severe_threshold.to_string(), "Provocation severe threshold"),
            ("provocation_max_records", self.provocation_max_records.to_string(), "Max retained provocation records"),
            ("honkify_chance", self.honkify_chance.to_string(), "Chance to honkify an ordinary message"),
            ("double_honk_chance", self.double_honk_chance.to_string(), "Chance to amplify a message containing honk"),
            ("state_flush_interval_secs", self.state_flush_interval_secs.to_string(), "State snapshot flush interval"),
        ]
    }

    /// Reject values that indicate programmer error rather than runtime conditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (self.min_cycle_secs, self.max_cycle_secs);
        let finite = min.is_finite() && max.is_finite();
        if !finite || min < 0.0 || max < min || max > MAX_CYCLE_SECS {
            return Err(ConfigError::InvalidDelayBounds { min, max });
        }
        if self.target_messages == 0 {
            return Err(ConfigError::NonPositive { field: "target_messages" });
        }
        if self.takeover_threshold == 0 {
            return Err(ConfigError::NonPositive { field: "takeover_threshold" });
        }
        if self.max_actions_per_hour == 0 {
            return Err(ConfigError::InvalidRateLimit {
                max_events: self.max_actions_per_hour,
                window_secs: 3600,
            });
        }
        if self.mood_decay_secs.is_nan() || self.mood_decay_secs <= 0.0 {
            return Err(ConfigError::NonPositive { field: "mood_decay_secs" });
        }
        if self.provocation_max_records == 0 {
            return Err(ConfigError::NonPositive { field: "provocation_max_records" });
        }
        for (field, value) in [
            ("activity_floor", self.activity_floor),
            ("chance_base", self.chance_base),
            ("honkify_chance", self.honkify_chance),
            ("double_honk_chance", self.double_honk_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value: f64::from(value) });
            }
        }
        for (field, value) in [
            ("chance_chaos_weight", self.chance_chaos_weight),
            ("chance_activity_weight", self.chance_activity_weight),
            ("chance_density_weight", self.chance_density_weight),
            ("chance_provocation_weight", self.chance_provocation_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::OutOfRange { field, value: f64::from(value) });
            }
        }
        crate::provocation::scoring::Thresholds::new(
            self.warn_threshold,
            self.retaliate_threshold,
            self.severe_threshold,
        )?;
        Ok(())
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(HonkCfg::default().validate().is_ok());
    }

    #[test]
    fn from_map_overrides_and_falls_back() {
        let mut m = HashMap::new();
        m.insert("takeover_threshold".to_string(), "40".to_string());
        m.insert("chance_base".to_string(), "not-a-number".to_string());
        let cfg = HonkCfg::from_map(&m);
        assert_eq!(cfg.takeover_threshold, 40);
        assert!((cfg.chance_base - 0.08).abs() < f32::EPSILON);
    }

    #[test]
    fn inverted_cycle_bounds_rejected() {
        let cfg = HonkCfg { min_cycle_secs: 90.0, max_cycle_secs: 30.0, ..HonkCfg::default() };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidDelayBounds { min: 90.0, max: 30.0 })
        );
    }

    #[test]
    fn huge_cycle_bound_rejected() {
        let cfg = HonkCfg { min_cycle_secs: 1.0, max_cycle_secs: 1e20, ..HonkCfg::default() };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidDelayBounds { min: 1.0, max: 1e20 })
        );
        let day = HonkCfg { max_cycle_secs: MAX_CYCLE_SECS, ..HonkCfg::default() };
        assert!(day.validate().is_ok());
    }

    #[test]
    fn negative_cycle_bound_rejected() {
        let cfg = HonkCfg { min_cycle_secs: -1.0, ..HonkCfg::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDelayBounds { .. })));
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let cfg = HonkCfg { max_actions_per_hour: 0, ..HonkCfg::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRateLimit { .. })));
    }

    #[test]
    fn unordered_thresholds_rejected() {
        let cfg = HonkCfg { warn_threshold: 8.0, ..HonkCfg::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::ThresholdOrder { .. })));
    }

    #[test]
    fn every_field_has_an_entry() {
        let cfg = HonkCfg::default();
        let entries = cfg.to_entries();
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(k, v, _)| (k.to_string(), v.clone()))
            .collect();
        assert_eq!(map.len(), 23);
        let round = HonkCfg::from_map(&map);
        assert_eq!(round.guild_cooldown_secs, cfg.guild_cooldown_secs);
        assert_eq!(round.provocation_max_records, cfg.provocation_max_records);
    }
}
