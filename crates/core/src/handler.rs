use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::honk::{HonkifyOptions, HonkifyOutcome, honkify_message};
use crate::mood::{MoodEngine, MoodEvent};
use crate::provocation::{ProvocationLedger, ScoredProvocation};
use crate::state::{LockKind, StateStore};
use crate::types::{ChannelId, GuildId, Mood, ProvocationEvent, Severity, UserId};

/// Everything the platform layer should do in response to one message.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutcome {
    pub provocation: ScoredProvocation,
    /// Reply text when the message was honkified.
    pub honk: Option<HonkifyOutcome>,
    /// Content to repeat back when the author is echo-locked.
    pub echo: Option<String>,
    /// Retaliation tier when a scoring message leaves the author at or above
    /// the retaliate threshold.
    pub retaliate: Option<Severity>,
    pub mood: Mood,
}

/// Inbound message path. Synchronous, so any number of platform tasks
/// may call it next to the running scheduler.
#[derive(Debug, Clone)]
pub struct MessageHandler {
    store: Arc<StateStore>,
    mood: Arc<MoodEngine>,
    ledger: Arc<ProvocationLedger>,
    honkify: HonkifyOptions,
    bot: Option<UserId>,
}

impl MessageHandler {
    pub fn new(
        store: Arc<StateStore>,
        mood: Arc<MoodEngine>,
        ledger: Arc<ProvocationLedger>,
        honkify: HonkifyOptions,
    ) -> Self {
        Self { store, mood, ledger, honkify, bot: None }
    }

    /// Our own user id, so mentions of the bot register as attention.
    pub fn with_bot_id(mut self, bot: UserId) -> Self {
        self.bot = Some(bot);
        self
    }

    pub fn handle(
        &self,
        guild: GuildId,
        channel: ChannelId,
        event: &ProvocationEvent,
        history: &[ProvocationEvent],
        now: DateTime<Utc>,
    ) -> HandlerOutcome {
        self.handle_with_rng(guild, channel, event, history, now, &mut rand::rng())
    }

    pub fn handle_with_rng<R: Rng + ?Sized>(
        &self,
        guild: GuildId,
        channel: ChannelId,
        event: &ProvocationEvent,
        history: &[ProvocationEvent],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> HandlerOutcome {
        let provocation = self.ledger.record(guild, event, history, now);
        // Only a message that itself scored can react to the running total.
        let hostile = provocation.added > 0.0;

        let mood_event = match provocation.severity {
            _ if !hostile => None,
            Severity::None => None,
            Severity::Warn => Some((MoodEvent::Provoked, 1.0)),
            Severity::Retaliate => Some((MoodEvent::Insulted, 1.0)),
            Severity::Severe => Some((MoodEvent::Insulted, 2.0)),
        };
        if let Some((kind, intensity)) = mood_event {
            self.mood.apply(kind, intensity, now);
        }
        if self.bot.is_some_and(|bot| event.mentions.contains(&bot)) {
            self.mood.apply(MoodEvent::Mentioned, 1.0, now);
        }

        let opts = if self.store.is_locked(LockKind::Honk, event.author) {
            self.honkify.forced()
        } else {
            self.honkify
        };
        let honk = honkify_message(&event.content, event.author, channel, &self.store, rng, &opts, now);

        let echo = self
            .store
            .is_locked(LockKind::Echo, event.author)
            .then(|| event.content.clone())
            .filter(|c| !c.trim().is_empty());

        let thresholds = self.ledger.thresholds();
        let retaliate = (hostile && thresholds.meets_threshold(provocation.total))
            .then_some(provocation.severity);
        if let Some(tier) = retaliate {
            tracing::info!(
                guild = %guild,
                user = %event.author,
                score = provocation.total,
                tier = tier.as_str(),
                "retaliation threshold crossed"
            );
        }

        HandlerOutcome {
            provocation,
            honk,
            echo,
            retaliate,
            mood: self.mood.current().mood,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provocation::Thresholds;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn handler() -> MessageHandler {
        let now = Utc::now();
        let mut honkify = HonkifyOptions::default();
        honkify.chance = 0.0;
        MessageHandler::new(
            Arc::new(StateStore::new()),
            Arc::new(MoodEngine::new(600.0, now)),
            Arc::new(ProvocationLedger::new(Thresholds::default(), 300.0, 64)),
            honkify,
        )
        .with_bot_id(UserId(99))
    }

    #[test]
    fn friendly_message_is_quiet() {
        let h = handler();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        let ev = ProvocationEvent::new(UserId(1), "good morning", now);
        let out = h.handle_with_rng(GuildId(1), ChannelId(1), &ev, &[], now, &mut rng);
        assert_eq!(out.provocation.severity, Severity::None);
        assert!(out.honk.is_none() && out.echo.is_none() && out.retaliate.is_none());
    }

    #[test]
    fn harmless_follow_up_does_not_retaliate_again() {
        let h = handler();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        let insult = ProvocationEvent::new(UserId(1), "YOU STUPID IDIOT LOSER!!!", now);
        let out = h.handle_with_rng(GuildId(1), ChannelId(1), &insult, &[], now, &mut rng);
        assert!(out.retaliate.is_some());
        let aggression = h.mood.current().aggression;

        let polite = ProvocationEvent::new(UserId(1), "good morning", now);
        let out = h.handle_with_rng(GuildId(1), ChannelId(1), &polite, &[], now, &mut rng);
        assert_eq!(out.provocation.added, 0.0);
        assert!(out.provocation.total >= 6.0);
        assert!(out.retaliate.is_none());
        assert_eq!(h.mood.current().aggression, aggression);
    }

    #[test]
    fn insults_raise_aggression_and_trigger_retaliation() {
        let h = handler();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        let before = h.mood.current().aggression;
        let ev = ProvocationEvent::new(UserId(1), "YOU STUPID IDIOT LOSER!!!", now);
        let out = h.handle_with_rng(GuildId(1), ChannelId(1), &ev, &[], now, &mut rng);
        assert!(out.provocation.total >= 6.0);
        assert!(out.retaliate.is_some());
        assert!(h.mood.current().aggression > before);
    }

    #[test]
    fn honk_lock_forces_honkify() {
        let h = handler();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        h.store.lock(LockKind::Honk, UserId(5), now);
        let ev = ProvocationEvent::new(UserId(5), "let me speak", now);
        let out = h.handle_with_rng(GuildId(1), ChannelId(3), &ev, &[], now, &mut rng);
        assert_eq!(out.honk.map(|o| o.text), Some("honk honk honk".to_string()));
        assert_eq!(h.store.user_honk_count(UserId(5)), 1);
    }

    #[test]
    fn echo_lock_repeats_content() {
        let h = handler();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        h.store.lock(LockKind::Echo, UserId(6), now);
        let ev = ProvocationEvent::new(UserId(6), "copy me", now);
        let out = h.handle_with_rng(GuildId(1), ChannelId(3), &ev, &[], now, &mut rng);
        assert_eq!(out.echo.as_deref(), Some("copy me"));
    }

    #[test]
    fn bot_mention_sparks_curiosity() {
        let h = handler();
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc::now();
        let before = h.mood.current().curiosity;
        let ev = ProvocationEvent::new(UserId(2), "hey goose", now).with_mentions([UserId(99)]);
        h.handle_with_rng(GuildId(1), ChannelId(1), &ev, &[], now, &mut rng);
        assert!(h.mood.current().curiosity > before);
    }
}
