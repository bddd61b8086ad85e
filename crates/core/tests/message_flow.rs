//! Inbound message path wired the way the daemon wires it: handler,
//! ledger, mood engine and state store sharing one set of `Arc`s.

use std::sync::Arc;

use chrono::{Duration, Utc};
use honk_core::config::HonkCfg;
use honk_core::handler::MessageHandler;
use honk_core::honk::{HonkifyAction, HonkifyOptions};
use honk_core::mood::MoodEngine;
use honk_core::provocation::{ProvocationLedger, classify, score_message};
use honk_core::state::{LockKind, StateStore};
use honk_core::types::{ChannelId, GuildId, Mood, ProvocationEvent, Severity, UserId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Wiring {
    handler: MessageHandler,
    store: Arc<StateStore>,
    mood: Arc<MoodEngine>,
    ledger: Arc<ProvocationLedger>,
}

fn wiring(cfg: &HonkCfg) -> Wiring {
    let store = Arc::new(StateStore::new());
    let mood = Arc::new(MoodEngine::from_cfg(cfg));
    let ledger = Arc::new(ProvocationLedger::from_cfg(cfg).unwrap());
    let mut opts = HonkifyOptions::from_cfg(cfg);
    opts.chance = 0.0;
    let handler = MessageHandler::new(store.clone(), mood.clone(), ledger.clone(), opts);
    Wiring { handler, store, mood, ledger }
}

#[test]
fn shouting_outscores_plain_insult() {
    let now = Utc::now();
    let loud = score_message(&ProvocationEvent::new(UserId(1), "YOU ARE SO STUPID!!!", now), &[], now);
    let plain = score_message(&ProvocationEvent::new(UserId(1), "you are so stupid", now), &[], now);
    let clean = score_message(&ProvocationEvent::new(UserId(1), "you are so kind", now), &[], now);
    assert!(loud > plain);
    assert!(plain > clean);
    assert_eq!(clean, 0.0);
}

#[test]
fn repeated_abuse_escalates_to_retaliation() {
    let cfg = HonkCfg::default();
    let w = wiring(&cfg);
    let mut rng = StdRng::seed_from_u64(2);
    let start = Utc::now();
    let mut history: Vec<ProvocationEvent> = Vec::new();
    let mut last = None;

    for i in 0..4 {
        let now = start + Duration::seconds(i * 10);
        let ev = ProvocationEvent::new(UserId(7), "stupid goose", now);
        let out = w.handler.handle_with_rng(GuildId(1), ChannelId(2), &ev, &history, now, &mut rng);
        history.insert(0, ev);
        last = Some(out);
    }

    let out = last.unwrap();
    assert!(out.retaliate.is_some());
    assert!(out.provocation.severity >= Severity::Retaliate);
    assert!(w.ledger.score_of(GuildId(1), UserId(7), start + Duration::seconds(30)) >= cfg.retaliate_threshold);
    assert!(w.mood.current().aggression > 0.10);
}

#[test]
fn honk_replies_heat_channel_until_takeover_ready() {
    let cfg = HonkCfg {
        takeover_threshold: 4,
        double_honk_chance: 0.0,
        ..HonkCfg::default()
    };
    let w = wiring(&cfg);
    let mut rng = StdRng::seed_from_u64(5);
    let now = Utc::now();
    let mut ready = false;

    for i in 0..4 {
        let ev = ProvocationEvent::new(UserId(10 + i), "honk", now);
        let out = w.handler.handle_with_rng(GuildId(1), ChannelId(9), &ev, &[], now, &mut rng);
        let honk = out.honk.unwrap();
        assert_eq!(honk.action, HonkifyAction::LoneHonkReply);
        ready = honk.takeover_ready;
    }

    assert!(ready);
    assert_eq!(w.store.channel_honk_activity(ChannelId(9)), 4);
    assert!(w.store.try_claim_takeover(ChannelId(9), 4, now, std::time::Duration::from_secs(900)));
    assert!(!w.store.try_claim_takeover(ChannelId(9), 4, now, std::time::Duration::from_secs(900)));
}

#[test]
fn locks_shape_replies() {
    let w = wiring(&HonkCfg::default());
    let mut rng = StdRng::seed_from_u64(1);
    let now = Utc::now();
    w.store.lock(LockKind::Honk, UserId(3), now);
    w.store.lock(LockKind::Echo, UserId(3), now);

    let ev = ProvocationEvent::new(UserId(3), "please stop", now);
    let out = w.handler.handle_with_rng(GuildId(1), ChannelId(1), &ev, &[], now, &mut rng);
    assert_eq!(out.honk.map(|h| h.text).as_deref(), Some("honk honk"));
    assert_eq!(out.echo.as_deref(), Some("please stop"));

    w.store.unlock(LockKind::Honk, UserId(3));
    let out = w.handler.handle_with_rng(GuildId(1), ChannelId(1), &ev, &[], now, &mut rng);
    assert!(out.honk.is_none());
}

#[test]
fn mood_stays_bounded_under_random_events() {
    let mood = MoodEngine::new(600.0, Utc::now());
    let mut rng = StdRng::seed_from_u64(99);
    let names = [
        "provoked", "insulted", "honk", "mentioned", "ignored", "quiet", "retaliated", "takeover",
        "calm", "bogus",
    ];
    let mut now = Utc::now();
    for _ in 0..2000 {
        now += Duration::seconds(rng.random_range(0..120));
        let name = names[rng.random_range(0..names.len())];
        let state = mood.apply_event(name, rng.random_range(-1.0..5.0), now);
        for v in [state.aggression, state.boredom, state.curiosity, state.chaos] {
            assert!((0.0..=1.0).contains(&v), "{name} pushed a field to {v}");
        }
        assert_eq!(state.mood, state.derived_mood());
    }
}

#[test]
fn classify_is_monotonic() {
    let mut prev = Severity::None;
    for i in 0..400 {
        let sev = classify(i as f32 * 0.05);
        assert!(sev >= prev);
        prev = sev;
    }
    assert_eq!(prev, Severity::Severe);
}

#[test]
fn forced_mood_holds_until_expiry() {
    let now = Utc::now();
    let mood = MoodEngine::new(600.0, now);
    mood.force_mood(Mood::Chaotic, std::time::Duration::from_secs(60), now);
    assert_eq!(mood.tick(now + Duration::seconds(30)).mood, Mood::Chaotic);
    assert_eq!(mood.tick(now + Duration::seconds(61)).mood, Mood::Serene);
}
