use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::state::store::expiry_after;
use crate::types::{Mood, MoodState};

/// Resting values each dimension drifts back to.
const AGGRESSION_BASELINE: f32 = 0.0;
const BOREDOM_BASELINE: f32 = MoodState::DEFAULT_BOREDOM;
const CURIOSITY_BASELINE: f32 = MoodState::DEFAULT_CURIOSITY;
const CHAOS_BASELINE: f32 = MoodState::DEFAULT_CHAOS;

/// Fraction of the distance to baseline recovered per full decay period.
const AGGRESSION_DECAY: f32 = 0.50;
const BOREDOM_DECAY: f32 = 0.20;
const CURIOSITY_DECAY: f32 = 0.25;
const CHAOS_DECAY: f32 = 0.35;

/// Upper bound on event intensity multipliers.
const MAX_EVENT_INTENSITY: f32 = 3.0;

/// Contiguous `[low, high)` intensity bands; the last one is open upward.
const MOOD_BANDS: [(f32, f32, Mood); 5] = [
    (0.0, 0.2, Mood::Serene),
    (0.2, 0.4, Mood::Alert),
    (0.4, 0.6, Mood::Agitated),
    (0.6, 0.8, Mood::Ferocious),
    (0.8, f32::INFINITY, Mood::Chaotic),
];

/// Map a `[0, 1]` intensity to its mood band.
pub fn mood_for_intensity(intensity: f32) -> Mood {
    MOOD_BANDS
        .iter()
        .find(|(low, high, _)| *low <= intensity && intensity < *high)
        .map(|(_, _, mood)| *mood)
        .unwrap_or(Mood::Serene)
}

/// Named stimuli that push the mood around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoodEvent {
    Provoked,
    Insulted,
    Honk,
    Mentioned,
    Ignored,
    Quiet,
    Retaliated,
    Takeover,
    Calm,
}

/// Per-field delta at intensity 1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoodDelta {
    pub aggression: f32,
    pub boredom: f32,
    pub curiosity: f32,
    pub chaos: f32,
}

impl MoodEvent {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "provoked" => Self::Provoked,
            "insulted" => Self::Insulted,
            "honk" => Self::Honk,
            "mentioned" => Self::Mentioned,
            "ignored" => Self::Ignored,
            "quiet" => Self::Quiet,
            "retaliated" => Self::Retaliated,
            "takeover" => Self::Takeover,
            "calm" => Self::Calm,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provoked => "provoked",
            Self::Insulted => "insulted",
            Self::Honk => "honk",
            Self::Mentioned => "mentioned",
            Self::Ignored => "ignored",
            Self::Quiet => "quiet",
            Self::Retaliated => "retaliated",
            Self::Takeover => "takeover",
            Self::Calm => "calm",
        }
    }

    pub fn effect(&self) -> MoodDelta {
        let d = |aggression, boredom, curiosity, chaos| MoodDelta { aggression, boredom, curiosity, chaos };
        match self {
            Self::Provoked => d(0.25, -0.10, 0.0, 0.10),
            Self::Insulted => d(0.35, 0.0, 0.0, 0.05),
            Self::Honk => d(0.0, -0.05, 0.02, 0.05),
            Self::Mentioned => d(0.0, -0.10, 0.10, 0.0),
            Self::Ignored => d(0.0, 0.12, -0.03, 0.0),
            Self::Quiet => d(0.0, 0.15, 0.05, 0.0),
            Self::Retaliated => d(-0.20, 0.0, 0.0, 0.10),
            Self::Takeover => d(0.0, -0.25, 0.0, 0.20),
            Self::Calm => d(-0.15, 0.0, 0.0, -0.10),
        }
    }
}

/// Owner of the single authoritative mood state.
///
/// Every mutation goes through `watch::Sender::send_modify`, which
/// serialises read-modify-write and notifies subscribers.
#[derive(Debug)]
pub struct MoodEngine {
    tx: watch::Sender<MoodState>,
    decay_secs: f64,
}

impl MoodEngine {
    /// Engine with default state stamped at `now`.
    pub fn new(decay_secs: f64, now: DateTime<Utc>) -> Self {
        let (tx, _) = watch::channel(MoodState::initial(now));
        Self {
            tx,
            decay_secs: if decay_secs > 0.0 { decay_secs } else { 1.0 },
        }
    }

    pub fn from_cfg(cfg: &crate::config::HonkCfg) -> Self {
        Self::new(cfg.mood_decay_secs, Utc::now())
    }

    /// Receiver notified after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<MoodState> {
        self.tx.subscribe()
    }

    /// Current state without applying decay.
    pub fn current(&self) -> MoodState {
        *self.tx.borrow()
    }

    /// Apply decay since the last update and re-derive the mood.
    pub fn tick(&self, now: DateTime<Utc>) -> MoodState {
        self.update(now, |_| {})
    }

    /// Decay, then apply the named event scaled by `intensity`.
    /// Unknown names only decay.
    pub fn apply_event(&self, event: &str, intensity: f32, now: DateTime<Utc>) -> MoodState {
        match MoodEvent::parse(event) {
            Some(event) => self.apply(event, intensity, now),
            None => {
                tracing::debug!(event, "unknown mood event, decay only");
                self.tick(now)
            }
        }
    }

    /// Typed form of [`apply_event`](Self::apply_event).
    pub fn apply(&self, event: MoodEvent, intensity: f32, now: DateTime<Utc>) -> MoodState {
        let scale = if intensity.is_finite() {
            intensity.clamp(0.0, MAX_EVENT_INTENSITY)
        } else {
            0.0
        };
        let delta = event.effect();
        self.update(now, |state| {
            state.aggression += delta.aggression * scale;
            state.boredom += delta.boredom * scale;
            state.curiosity += delta.curiosity * scale;
            state.chaos += delta.chaos * scale;
        })
    }

    /// Pin the mood label until `now + hold`, regardless of the numeric fields.
    pub fn force_mood(&self, mood: Mood, hold: Duration, now: DateTime<Utc>) -> MoodState {
        let until = expiry_after(now, hold);
        let mut out = self.current();
        self.tx.send_modify(|state| {
            state.mood = mood;
            state.override_until = Some(until);
            out = *state;
        });
        tracing::info!(%mood, %until, "mood override set");
        out
    }

    /// Drop any override and re-derive the mood right away.
    pub fn clear_override(&self) -> MoodState {
        let mut out = self.current();
        self.tx.send_modify(|state| {
            state.override_until = None;
            state.mood = state.derived_mood();
            out = *state;
        });
        out
    }

    /// Back to the fixed defaults.
    pub fn reset(&self, now: DateTime<Utc>) -> MoodState {
        let fresh = MoodState::initial(now);
        self.tx.send_replace(fresh);
        fresh
    }

    fn update(&self, now: DateTime<Utc>, apply: impl FnOnce(&mut MoodState)) -> MoodState {
        let decay_secs = self.decay_secs;
        let mut out = self.current();
        self.tx.send_modify(|state| {
            decay(state, now, decay_secs);
            apply(state);
            state.clamp();
            if !state.is_overridden(now) {
                state.override_until = None;
                state.mood = state.derived_mood();
            }
            state.last_updated = state.last_updated.max(now);
            out = *state;
        });
        out
    }
}

/// Move every field toward its baseline, proportional to elapsed time.
fn decay(state: &mut MoodState, now: DateTime<Utc>, decay_secs: f64) {
    let elapsed = (now - state.last_updated).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return;
    }
    let factor = (elapsed / decay_secs).min(1.0) as f32;
    let toward = |value: f32, baseline: f32, rate: f32| value + (baseline - value) * rate * factor;
    state.aggression = toward(state.aggression, AGGRESSION_BASELINE, AGGRESSION_DECAY);
    state.boredom = toward(state.boredom, BOREDOM_BASELINE, BOREDOM_DECAY);
    state.curiosity = toward(state.curiosity, CURIOSITY_BASELINE, CURIOSITY_DECAY);
    state.chaos = toward(state.chaos, CHAOS_BASELINE, CHAOS_DECAY);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    fn in_unit(state: &MoodState) -> bool {
        [state.aggression, state.boredom, state.curiosity, state.chaos]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    #[test]
    fn band_edges_resolve_upward() {
        assert_eq!(mood_for_intensity(0.0), Mood::Serene);
        assert_eq!(mood_for_intensity(0.19), Mood::Serene);
        assert_eq!(mood_for_intensity(0.2), Mood::Alert);
        assert_eq!(mood_for_intensity(0.4), Mood::Agitated);
        assert_eq!(mood_for_intensity(0.6), Mood::Ferocious);
        assert_eq!(mood_for_intensity(0.8), Mood::Chaotic);
        assert_eq!(mood_for_intensity(1.0), Mood::Chaotic);
        assert_eq!(mood_for_intensity(7.5), Mood::Chaotic);
    }

    #[test]
    fn tick_with_no_elapsed_time_is_stable() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        let before = engine.current();
        let after = engine.tick(now);
        assert_eq!(before, after);
    }

    #[test]
    fn aggression_decays_toward_zero() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        engine.apply(MoodEvent::Insulted, 2.0, now);
        let hot = engine.current().aggression;
        let cooled = engine.tick(now + secs(300)).aggression;
        assert!(cooled < hot);
        // half a period at rate 0.5 removes a quarter of the distance
        assert!((cooled - hot * 0.75).abs() < 1e-4);
    }

    #[test]
    fn decay_factor_caps_at_one_period() {
        let now = Utc::now();
        let a = MoodEngine::new(600.0, now);
        let b = MoodEngine::new(600.0, now);
        a.apply(MoodEvent::Takeover, 2.0, now);
        b.apply(MoodEvent::Takeover, 2.0, now);
        let one = a.tick(now + secs(600));
        let ten = b.tick(now + secs(6000));
        assert!((one.chaos - ten.chaos).abs() < 1e-6);
    }

    #[test]
    fn unknown_event_only_decays() {
        let now = Utc::now();
        let by_name = MoodEngine::new(600.0, now);
        let by_tick = MoodEngine::new(600.0, now);
        let a = by_name.apply_event("moonwalk", 1.0, now + secs(120));
        let b = by_tick.tick(now + secs(120));
        assert_eq!(a, b);
    }

    #[test]
    fn insults_escalate_mood() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        let mut state = engine.current();
        for i in 0..4 {
            state = engine.apply_event("insulted", 1.0, now + secs(i));
        }
        assert!(state.mood.is_hostile(), "mood was {}", state.mood);
        assert_eq!(state.mood, state.derived_mood());
    }

    #[test]
    fn fields_stay_in_unit_range() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        let mut rng = StdRng::seed_from_u64(99);
        let names = ["provoked", "insulted", "honk", "mentioned", "ignored", "quiet",
                     "retaliated", "takeover", "calm", "bogus"];
        let mut t = now;
        for _ in 0..2_000 {
            t += chrono::Duration::milliseconds(rng.random_range(0..120_000));
            let state = if rng.random_bool(0.2) {
                engine.tick(t)
            } else {
                let name = names[rng.random_range(0..names.len())];
                engine.apply_event(name, rng.random_range(-2.0..5.0), t)
            };
            assert!(in_unit(&state), "{state:?}");
        }
    }

    #[test]
    fn override_pins_label_until_expiry() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        engine.force_mood(Mood::Chaotic, Duration::from_secs(60), now);
        assert_eq!(engine.tick(now + secs(30)).mood, Mood::Chaotic);
        let after = engine.tick(now + secs(61));
        assert_eq!(after.mood, Mood::Serene);
        assert_eq!(after.override_until, None);
    }

    #[test]
    fn clear_override_rederives() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        engine.force_mood(Mood::Ferocious, Duration::from_secs(600), now);
        assert_eq!(engine.clear_override().mood, Mood::Serene);
    }

    #[test]
    fn reset_restores_defaults() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        engine.apply(MoodEvent::Provoked, 3.0, now);
        let fresh = engine.reset(now + secs(5));
        assert_eq!(fresh, MoodState::initial(now + secs(5)));
    }

    #[test]
    fn subscribers_see_updates() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        let rx = engine.subscribe();
        engine.apply(MoodEvent::Insulted, 1.0, now);
        assert!((rx.borrow().aggression - 0.45).abs() < 1e-6);
    }

    #[test]
    fn clock_going_backwards_does_not_rewind() {
        let now = Utc::now();
        let engine = MoodEngine::new(600.0, now);
        let state = engine.tick(now - secs(30));
        assert_eq!(state.last_updated, now);
    }
}
