use chrono::{DateTime, Utc};

use crate::config::{ConfigError, HonkCfg};
use crate::types::{ProvocationEvent, Severity};

const INSULT_WORDS: &[&str] = &[
    "stupid", "idiot", "dumb", "moron", "loser", "clown", "trash", "pathetic",
    "useless", "lame", "ugly", "birdbrain",
];
const PROFANITY_WORDS: &[&str] = &[
    "damn", "hell", "crap", "shit", "fuck", "fucking", "ass", "bitch", "bastard",
];
const THREAT_WORDS: &[&str] = &[
    "kill", "destroy", "hurt", "punch", "fight", "roast", "pluck", "smash", "ban",
];

const INSULT_WEIGHT: f32 = 1.5;
const PROFANITY_WEIGHT: f32 = 1.0;
const THREAT_WEIGHT: f32 = 2.5;
const CAPS_MULTIPLIER: f32 = 1.5;
const EXCLAMATION_MULTIPLIER: f32 = 1.25;

const MENTION_WEIGHT: f32 = 0.75;
const GROUP_MENTION_BONUS: f32 = 1.5;

/// History entries inspected for repetition.
pub const REPETITION_WINDOW: usize = 5;
const REPETITION_WEIGHT: f32 = 0.8;

/// Max age of history entries counted toward escalation.
pub const ESCALATION_WINDOW_SECS: i64 = 120;
const ESCALATION_BONUS: f32 = 2.0;
const RAPID_FIRE_MIN: usize = 3;
const RAPID_FIRE_BONUS: f32 = 1.0;

pub const DEFAULT_HALF_LIFE_SECS: f64 = 300.0;

/// Per-category keyword hits in one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexicalHits {
    pub insult: usize,
    pub profanity: usize,
    pub threat: usize,
}

impl LexicalHits {
    pub fn scan(text: &str) -> Self {
        let mut hits = Self::default();
        for token in tokens(text) {
            let token = token.as_str();
            if INSULT_WORDS.contains(&token) {
                hits.insult += 1;
            } else if PROFANITY_WORDS.contains(&token) {
                hits.profanity += 1;
            } else if THREAT_WORDS.contains(&token) {
                hits.threat += 1;
            }
        }
        hits
    }

    pub fn any(&self) -> bool {
        self.insult + self.profanity + self.threat > 0
    }
}

/// Lowercased runs of alphanumerics and apostrophes.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// At least one letter, and every letter uppercase.
fn is_all_caps(text: &str) -> bool {
    let mut saw_letter = false;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        if !c.is_uppercase() {
            return false;
        }
        saw_letter = true;
    }
    saw_letter
}

/// Breakdown of a message score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub content: f32,
    pub mentions: f32,
    pub repetition: f32,
    pub escalation: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        (self.content + self.mentions + self.repetition + self.escalation).max(0.0)
    }
}

/// Score one message. `history` holds the same author's earlier messages,
/// most recent first.
pub fn score_message(event: &ProvocationEvent, history: &[ProvocationEvent], now: DateTime<Utc>) -> f32 {
    breakdown(event, history, now).total()
}

pub fn breakdown(event: &ProvocationEvent, history: &[ProvocationEvent], now: DateTime<Utc>) -> ScoreBreakdown {
    let hits = LexicalHits::scan(&event.content);
    ScoreBreakdown {
        content: content_score(&event.content, hits),
        mentions: mention_score(event),
        repetition: repetition_score(event, history),
        escalation: escalation_score(hits, history, now),
    }
}

fn content_score(text: &str, hits: LexicalHits) -> f32 {
    let mut score = hits.insult as f32 * INSULT_WEIGHT
        + hits.profanity as f32 * PROFANITY_WEIGHT
        + hits.threat as f32 * THREAT_WEIGHT;
    if is_all_caps(text) {
        score *= CAPS_MULTIPLIER;
    }
    if text.contains('!') {
        score *= EXCLAMATION_MULTIPLIER;
    }
    score
}

fn mention_score(event: &ProvocationEvent) -> f32 {
    let group = if event.mentions_everyone { GROUP_MENTION_BONUS } else { 0.0 };
    event.mentions.len() as f32 * MENTION_WEIGHT + group
}

fn repetition_score(event: &ProvocationEvent, history: &[ProvocationEvent]) -> f32 {
    let content = event.content.to_lowercase();
    let mut duplicates = 0usize;
    let mut shared_targets = 0usize;
    for prior in history.iter().take(REPETITION_WINDOW) {
        if prior.content.to_lowercase() == content {
            duplicates += 1;
        }
        if prior.mentions.iter().any(|m| event.mentions.contains(m)) {
            shared_targets += 1;
        }
    }
    (duplicates + shared_targets) as f32 * REPETITION_WEIGHT
}

fn escalation_score(hits: LexicalHits, history: &[ProvocationEvent], now: DateTime<Utc>) -> f32 {
    let recent: Vec<&ProvocationEvent> = history
        .iter()
        .filter(|prior| {
            let age = now - prior.timestamp;
            age >= chrono::Duration::zero() && age <= chrono::Duration::seconds(ESCALATION_WINDOW_SECS)
        })
        .collect();

    let mut score = 0.0;
    if hits.any() && recent.iter().any(|prior| LexicalHits::scan(&prior.content).any()) {
        score += ESCALATION_BONUS;
    }
    if recent.len() >= RAPID_FIRE_MIN {
        score += RAPID_FIRE_BONUS;
    }
    score
}

/// Exponential half-life decay. Non-positive half-life or elapsed time
/// leaves the score untouched.
pub fn apply_decay(score: f32, last_updated: DateTime<Utc>, now: DateTime<Utc>, half_life_secs: f64) -> f32 {
    if half_life_secs <= 0.0 || half_life_secs.is_nan() {
        return score;
    }
    let elapsed = (now - last_updated).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return score;
    }
    (f64::from(score) * 0.5f64.powf(elapsed / half_life_secs)) as f32
}

/// Strictly ordered severity thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    warn: f32,
    retaliate: f32,
    severe: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { warn: 3.0, retaliate: 6.0, severe: 10.0 }
    }
}

impl Thresholds {
    pub fn new(warn: f32, retaliate: f32, severe: f32) -> Result<Self, ConfigError> {
        let ordered = warn.is_finite() && severe.is_finite() && warn < retaliate && retaliate < severe;
        if !ordered {
            return Err(ConfigError::ThresholdOrder { warn, retaliate, severe });
        }
        Ok(Self { warn, retaliate, severe })
    }

    pub fn from_cfg(cfg: &HonkCfg) -> Result<Self, ConfigError> {
        Self::new(cfg.warn_threshold, cfg.retaliate_threshold, cfg.severe_threshold)
    }

    pub fn severe(&self) -> f32 {
        self.severe
    }

    /// Eligible for retaliation.
    pub fn meets_threshold(&self, score: f32) -> bool {
        score >= self.retaliate
    }

    /// Highest tier first, so boundary values land in the higher tier.
    pub fn classify(&self, score: f32) -> Severity {
        if score >= self.severe {
            Severity::Severe
        } else if score >= self.retaliate {
            Severity::Retaliate
        } else if score >= self.warn {
            Severity::Warn
        } else {
            Severity::None
        }
    }
}

/// [`Thresholds::classify`] with the default thresholds.
pub fn classify(score: f32) -> Severity {
    Thresholds::default().classify(score)
}

/// [`Thresholds::meets_threshold`] with the default thresholds.
pub fn meets_threshold(score: f32) -> bool {
    Thresholds::default().meets_threshold(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    fn msg(content: &str, at: DateTime<Utc>) -> ProvocationEvent {
        ProvocationEvent::new(UserId(1), content, at)
    }

    #[test]
    fn caps_and_exclamation_compound() {
        let now = Utc::now();
        let loud = score_message(&msg("YOU ARE SO STUPID!!!", now), &[], now);
        let quiet = score_message(&msg("you are so stupid", now), &[], now);
        let clean = score_message(&msg("lovely weather today", now), &[], now);
        assert!((quiet - 1.5).abs() < 1e-6);
        assert!((loud - 1.5 * 1.5 * 1.25).abs() < 1e-6);
        assert!(loud > quiet);
        assert!(quiet > clean);
        assert_eq!(clean, 0.0);
    }

    #[test]
    fn caps_need_letters() {
        assert!(!is_all_caps("1234 !!!"));
        assert!(is_all_caps("HONK 123!"));
        assert!(!is_all_caps("HONK honk"));
    }

    #[test]
    fn lexicon_categories_are_weighted() {
        let hits = LexicalHits::scan("I will KILL you, stupid damn goose");
        assert_eq!(hits, LexicalHits { insult: 1, profanity: 1, threat: 1 });
        let now = Utc::now();
        let score = score_message(&msg("kill stupid damn", now), &[], now);
        assert!((score - (2.5 + 1.5 + 1.0)).abs() < 1e-6);
    }

    #[test]
    fn mentions_and_group_bonus() {
        let now = Utc::now();
        let e = msg("hi", now).with_mentions([UserId(2), UserId(3)]).with_everyone();
        assert!((score_message(&e, &[], now) - (2.0 * 0.75 + 1.5)).abs() < 1e-6);
    }

    #[test]
    fn repetition_increases_score() {
        let now = Utc::now();
        let event = msg("honk honk", now);
        let alone = score_message(&event, &[], now);
        let history = vec![msg("HONK HONK", now - secs(600))];
        let repeated = score_message(&event, &history, now);
        assert!(repeated > alone);
        assert!((repeated - alone - 0.8).abs() < 1e-6);
    }

    #[test]
    fn repetition_only_scans_five_entries() {
        let now = Utc::now();
        let event = msg("same", now);
        let mut history: Vec<_> = (0..5).map(|i| msg(&format!("other {i}"), now - secs(600))).collect();
        history.push(msg("same", now - secs(600)));
        assert_eq!(breakdown(&event, &history, now).repetition, 0.0);
    }

    #[test]
    fn shared_mention_targets_count() {
        let now = Utc::now();
        let event = msg("look", now).with_mentions([UserId(9)]);
        let history = vec![msg("again", now - secs(600)).with_mentions([UserId(9), UserId(4)])];
        assert!((breakdown(&event, &history, now).repetition - 0.8).abs() < 1e-6);
    }

    #[test]
    fn escalation_needs_recent_hostility() {
        let now = Utc::now();
        let event = msg("you clown", now);
        let old = vec![msg("idiot", now - secs(300))];
        let fresh = vec![msg("idiot", now - secs(30))];
        assert_eq!(breakdown(&event, &old, now).escalation, 0.0);
        assert!((breakdown(&event, &fresh, now).escalation - 2.0).abs() < 1e-6);
    }

    #[test]
    fn escalation_window_edges_are_exact() {
        let now = Utc::now();
        let event = msg("you clown", now);
        let ms = chrono::Duration::milliseconds;
        let at = |age: chrono::Duration| breakdown(&event, &[msg("idiot", now - age)], now).escalation;
        assert!((at(secs(ESCALATION_WINDOW_SECS)) - 2.0).abs() < 1e-6);
        assert_eq!(at(ms(120_500)), 0.0);
        assert_eq!(at(ms(120_900)), 0.0);
        assert_eq!(at(ms(-500)), 0.0);
    }

    #[test]
    fn rapid_fire_is_independent() {
        let now = Utc::now();
        let event = msg("hello", now);
        let burst: Vec<_> = (1..=3).map(|i| msg(&format!("line {i}"), now - secs(i))).collect();
        let b = breakdown(&event, &burst, now);
        assert!((b.escalation - 1.0).abs() < 1e-6);

        let hostile_burst: Vec<_> = (1..=3).map(|i| msg("trash", now - secs(i * 10))).collect();
        let b = breakdown(&msg("loser", now), &hostile_burst, now);
        assert!((b.escalation - 3.0).abs() < 1e-6);
    }

    #[test]
    fn decay_is_identity_at_zero_elapsed() {
        let now = Utc::now();
        assert_eq!(apply_decay(7.5, now, now, 300.0), 7.5);
    }

    #[test]
    fn decay_halves_each_half_life() {
        let now = Utc::now();
        let s = apply_decay(8.0, now, now + secs(300), 300.0);
        assert!((s - 4.0).abs() < 1e-4);
        let s = apply_decay(8.0, now, now + secs(600), 300.0);
        assert!((s - 2.0).abs() < 1e-4);
    }

    #[test]
    fn non_positive_half_life_skips_decay() {
        let now = Utc::now();
        assert_eq!(apply_decay(5.0, now, now + secs(900), 0.0), 5.0);
        assert_eq!(apply_decay(5.0, now, now + secs(900), -10.0), 5.0);
    }

    #[test]
    fn classify_boundaries_resolve_upward() {
        assert_eq!(classify(0.0), Severity::None);
        assert_eq!(classify(2.99), Severity::None);
        assert_eq!(classify(3.0), Severity::Warn);
        assert_eq!(classify(6.0), Severity::Retaliate);
        assert_eq!(classify(10.0), Severity::Severe);
        assert!(meets_threshold(6.0));
        assert!(!meets_threshold(5.99));
    }

    #[test]
    fn classify_is_monotonic() {
        let mut prev = Severity::None;
        for i in 0..=300 {
            let tier = classify(i as f32 * 0.05);
            assert!(tier >= prev);
            prev = tier;
        }
    }

    #[test]
    fn thresholds_must_be_ordered() {
        assert!(Thresholds::new(1.0, 2.0, 3.0).is_ok());
        assert!(Thresholds::new(2.0, 2.0, 3.0).is_err());
        assert!(Thresholds::new(1.0, 4.0, 3.0).is_err());
        assert!(Thresholds::new(f32::NAN, 2.0, 3.0).is_err());
    }
}
