use rand::Rng;

use crate::sampling::weighted_index;
use crate::types::{Intent, Mood, MoodState};

/// Base weight and `[aggression, boredom, curiosity, chaos]` drivers per intent.
const INTENT_PROFILE: [(Intent, f32, [f32; 4]); 7] = [
    (Intent::Lurk, 0.30, [0.0, -0.10, -0.10, -0.15]),
    (Intent::Honkify, 0.20, [0.05, 0.20, 0.05, 0.20]),
    (Intent::Echo, 0.10, [0.15, 0.05, 0.20, 0.05]),
    (Intent::Takeover, 0.05, [0.10, 0.15, 0.0, 0.40]),
    (Intent::MediaBurst, 0.10, [0.0, 0.25, 0.15, 0.15]),
    (Intent::VoiceChaos, 0.05, [0.05, 0.20, 0.15, 0.10]),
    (Intent::Retaliate, 0.02, [0.60, 0.0, 0.0, 0.10]),
];

fn mood_bonus(mood: Mood, intent: Intent) -> f32 {
    use Intent::*;
    match (mood, intent) {
        (Mood::Serene, Lurk) => 0.20,
        (Mood::Serene, Honkify) => 0.05,
        (Mood::Alert, Echo | MediaBurst) => 0.05,
        (Mood::Agitated, Retaliate) => 0.10,
        (Mood::Agitated, Echo) => 0.05,
        (Mood::Agitated, Lurk) => -0.10,
        (Mood::Ferocious, Retaliate) => 0.25,
        (Mood::Ferocious, Takeover) => 0.10,
        (Mood::Ferocious, Lurk) => -0.20,
        (Mood::Chaotic, Takeover) => 0.25,
        (Mood::Chaotic, VoiceChaos) => 0.10,
        (Mood::Chaotic, Lurk) => -0.30,
        _ => 0.0,
    }
}

/// Unnormalized, non-negative weight per intent.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentWeights {
    entries: Vec<(Intent, f32)>,
}

impl IntentWeights {
    pub fn get(&self, intent: Intent) -> f32 {
        self.entries
            .iter()
            .find(|(i, _)| *i == intent)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Intent, f32)> + '_ {
        self.entries.iter().copied()
    }

    /// Sum of the positive weights.
    pub fn total(&self) -> f32 {
        self.entries.iter().map(|(_, w)| w.max(0.0)).sum()
    }

    /// Probability distribution. A zero total yields all zeroes.
    pub fn normalized(&self) -> IntentWeights {
        let total = self.total();
        let entries = self
            .entries
            .iter()
            .map(|(i, w)| {
                let p = if total > 0.0 { w.max(0.0) / total } else { 0.0 };
                (*i, p)
            })
            .collect();
        IntentWeights { entries }
    }

    /// Highest-weighted intent; ties go to the earlier intent.
    pub fn strongest(&self) -> Option<Intent> {
        self.entries
            .iter()
            .filter(|(_, w)| *w > 0.0)
            .fold(None, |best: Option<(Intent, f32)>, (i, w)| match best {
                Some((_, bw)) if bw >= *w => best,
                _ => Some((*i, *w)),
            })
            .map(|(i, _)| i)
    }
}

/// `base + Σ driver·field + mood bonus` per intent, floored at zero.
pub fn decision_weights(state: &MoodState) -> IntentWeights {
    let fields = [state.aggression, state.boredom, state.curiosity, state.chaos];
    let entries = INTENT_PROFILE
        .iter()
        .map(|(intent, base, drivers)| {
            let driven: f32 = drivers.iter().zip(fields).map(|(d, f)| d * f).sum();
            let w = base + driven + mood_bonus(state.mood, *intent);
            (*intent, w.max(0.0))
        })
        .collect();
    IntentWeights { entries }
}

/// Weighted draw over [`decision_weights`]. The degenerate all-zero
/// distribution resolves to [`Intent::Lurk`].
pub fn get_intent<R: Rng + ?Sized>(state: &MoodState, rng: &mut R) -> Intent {
    let dist = decision_weights(state).normalized();
    let weights: Vec<f32> = dist.iter().map(|(_, w)| w).collect();
    weighted_index(&weights, rng)
        .and_then(|i| dist.entries.get(i).map(|(intent, _)| *intent))
        .unwrap_or(Intent::Lurk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn state(aggression: f32, boredom: f32, curiosity: f32, chaos: f32) -> MoodState {
        let mut s = MoodState::initial(Utc::now());
        s.aggression = aggression;
        s.boredom = boredom;
        s.curiosity = curiosity;
        s.chaos = chaos;
        s.mood = s.derived_mood();
        s
    }

    #[test]
    fn normalized_sums_to_one() {
        let w = decision_weights(&state(0.3, 0.5, 0.2, 0.4)).normalized();
        assert!((w.total() - 1.0).abs() < 1e-5);
        assert!(w.iter().all(|(_, p)| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn zero_total_normalizes_to_zeroes() {
        let w = IntentWeights { entries: vec![(Intent::Lurk, 0.0), (Intent::Echo, 0.0)] };
        let n = w.normalized();
        assert_eq!(n.total(), 0.0);
        assert_eq!(n.get(Intent::Echo), 0.0);
        assert_eq!(n.strongest(), None);
    }

    #[test]
    fn calm_goose_prefers_lurking() {
        let w = decision_weights(&state(0.0, 0.0, 0.0, 0.0));
        assert_eq!(w.strongest(), Some(Intent::Lurk));
    }

    #[test]
    fn angry_goose_prefers_retaliation() {
        let s = state(1.0, 0.1, 0.1, 0.4);
        assert_eq!(s.mood, Mood::Chaotic);
        let w = decision_weights(&s);
        assert_eq!(w.strongest(), Some(Intent::Retaliate));
        assert_eq!(w.get(Intent::Lurk), 0.0);
    }

    #[test]
    fn bored_chaotic_goose_favors_takeover_over_lurk() {
        let w = decision_weights(&state(0.2, 1.0, 0.2, 1.0));
        assert!(w.get(Intent::Takeover) > w.get(Intent::Lurk));
    }

    #[test]
    fn get_intent_is_deterministic_with_seed() {
        let s = state(0.4, 0.6, 0.3, 0.5);
        let a: Vec<Intent> = {
            let mut rng = StdRng::seed_from_u64(5);
            (0..20).map(|_| get_intent(&s, &mut rng)).collect()
        };
        let b: Vec<Intent> = {
            let mut rng = StdRng::seed_from_u64(5);
            (0..20).map(|_| get_intent(&s, &mut rng)).collect()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn get_intent_never_picks_zero_weight() {
        let s = state(1.0, 0.1, 0.1, 0.4); // Lurk weight floors to zero
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            assert_ne!(get_intent(&s, &mut rng), Intent::Lurk);
        }
    }
}
