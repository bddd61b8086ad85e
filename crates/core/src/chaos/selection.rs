//! Pure signal math for one guild evaluation: activity, hot channel,
//! action chance and the weighted action draw.

use std::collections::HashMap;

use rand::Rng;

use crate::config::HonkCfg;
use crate::sampling::weighted_index;
use crate::types::{ActionCategory, ChannelId, Mood, VoiceAction, unit};

/// Base weight per action category before mood and density multipliers.
fn base_weight(category: ActionCategory) -> f32 {
    match category {
        ActionCategory::Voice => 0.25,
        ActionCategory::Takeover => 0.15,
        ActionCategory::HonkBurst => 0.35,
        ActionCategory::MessageFlood => 0.25,
    }
}

/// No category ever drops below this weight.
const CATEGORY_FLOOR: f32 = 0.01;

const MOVE_CHANCE: f32 = 0.15;
const MOVE_CHANCE_HIGH_CHAOS: f32 = 0.20;
const MOVE_CHANCE_LOW_CHAOS: f32 = 0.10;
const LINGER_ACTIVE_CHANCE: f32 = 0.55;

/// Normalized inputs to the action chance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Signals {
    pub chaos: f32,
    pub activity: f32,
    pub density: f32,
    pub provocation: f32,
}

/// Linear weights that turn [`Signals`] into a probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChanceWeights {
    pub base: f32,
    pub chaos: f32,
    pub activity: f32,
    pub density: f32,
    pub provocation: f32,
}

impl Default for ChanceWeights {
    fn default() -> Self {
        Self::from_cfg(&HonkCfg::default())
    }
}

impl ChanceWeights {
    pub fn from_cfg(cfg: &HonkCfg) -> Self {
        Self {
            base: cfg.chance_base,
            chaos: cfg.chance_chaos_weight,
            activity: cfg.chance_activity_weight,
            density: cfg.chance_density_weight,
            provocation: cfg.chance_provocation_weight,
        }
    }

    /// `base + Σ weight·signal`, clamped to `[0, 1]`.
    pub fn action_chance(&self, s: &Signals) -> f32 {
        unit(
            self.base
                + s.chaos * self.chaos
                + s.activity * self.activity
                + s.density * self.density
                + s.provocation * self.provocation,
        )
    }
}

/// Total recent messages over the target, clamped to `[floor, 1]`.
pub fn activity_score(counts: &HashMap<ChannelId, u32>, target: u32, floor: f32) -> f32 {
    let floor = unit(floor);
    if target == 0 {
        return floor;
    }
    let total: u64 = counts.values().map(|c| u64::from(*c)).sum();
    (total as f32 / target as f32).clamp(floor, 1.0)
}

/// Weighted pick of a channel by message count. Silent channels never win.
pub fn pick_hot_channel<R: Rng + ?Sized>(
    counts: &HashMap<ChannelId, u32>,
    rng: &mut R,
) -> Option<ChannelId> {
    // HashMap order is random; sort so seeded draws repeat.
    let mut ranked: Vec<(ChannelId, u32)> = counts
        .iter()
        .filter(|(_, c)| **c > 0)
        .map(|(ch, c)| (*ch, *c))
        .collect();
    ranked.sort_unstable_by_key(|(ch, _)| *ch);
    let weights: Vec<f32> = ranked.iter().map(|(_, c)| *c as f32).collect();
    weighted_index(&weights, rng).map(|i| ranked[i].0)
}

/// Channel honk counter relative to the takeover threshold, clamped.
pub fn honk_density(count: u64, threshold: u64) -> f32 {
    if threshold == 0 {
        return 0.0;
    }
    unit(count as f32 / threshold as f32)
}

/// Category weights after mood and density multipliers.
pub fn category_weights(mood: Mood, density: f32) -> [(ActionCategory, f32); 4] {
    let mut out = ActionCategory::ALL.map(|c| (c, base_weight(c)));
    for (category, weight) in out.iter_mut() {
        let mut m = 1.0;
        match (mood, *category) {
            (Mood::Ferocious | Mood::Chaotic, ActionCategory::Takeover) => m *= 1.5,
            (Mood::Ferocious | Mood::Chaotic, ActionCategory::MessageFlood) => m *= 1.3,
            (Mood::Serene, ActionCategory::Voice) => m *= 1.2,
            (Mood::Serene, ActionCategory::Takeover) => m *= 0.5,
            _ => {}
        }
        match *category {
            ActionCategory::Takeover if density >= 1.0 => m *= 2.0,
            ActionCategory::Takeover => m *= 0.25,
            ActionCategory::HonkBurst if density >= 0.5 => m *= 1.5,
            _ => {}
        }
        *weight = (*weight * m).max(CATEGORY_FLOOR);
    }
    out
}

/// Weighted draw over [`category_weights`].
pub fn choose_action<R: Rng + ?Sized>(mood: Mood, density: f32, rng: &mut R) -> ActionCategory {
    let table = category_weights(mood, density);
    let weights = table.map(|(_, w)| w);
    weighted_index(&weights, rng)
        .map(|i| table[i].0)
        .unwrap_or(ActionCategory::HonkBurst)
}

/// Voice behaviour for a uniform `roll` in `[0, 1)`.
pub fn select_voice_action(chaos: f32, roll: f32) -> VoiceAction {
    let move_chance = if chaos >= 0.75 {
        MOVE_CHANCE_HIGH_CHAOS
    } else if chaos <= 0.25 {
        MOVE_CHANCE_LOW_CHAOS
    } else {
        MOVE_CHANCE
    };
    if roll < move_chance {
        VoiceAction::MoveMember
    } else if roll < move_chance + LINGER_ACTIVE_CHANCE {
        VoiceAction::LingerActive
    } else {
        VoiceAction::LingerIdle
    }
}

/// Whether a roll wins against the chance. Only `roll > chance` loses.
pub fn should_act(roll: f32, chance: f32) -> bool {
    roll <= chance
}
