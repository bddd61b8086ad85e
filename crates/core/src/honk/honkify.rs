use chrono::{DateTime, Utc};
use rand::Rng;

use crate::config::HonkCfg;
use crate::state::StateStore;
use crate::types::{ChannelId, UserId};

pub const HONK: &str = "honk";

/// Replies are cut to fit a single platform message.
pub const MAX_REPLY_CHARS: usize = 1900;

/// Which transformation produced the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HonkifyAction {
    LoneHonkReply,
    DoubleHonk,
    Honkified,
}

impl HonkifyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoneHonkReply => "lone_honk_reply",
            Self::DoubleHonk => "double_honk_amplify",
            Self::Honkified => "honkified",
        }
    }

    fn delta(&self) -> u64 {
        match self {
            Self::DoubleHonk => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HonkifyOutcome {
    pub text: String,
    pub action: HonkifyAction,
    /// Added to both the user and the channel counter.
    pub honk_delta: u64,
    pub takeover_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HonkifyOptions {
    /// Skip the random trigger roll (admin command, honk lock).
    pub force: bool,
    pub chance: f32,
    pub double_honk_chance: f32,
    pub takeover_threshold: u64,
}

impl Default for HonkifyOptions {
    fn default() -> Self {
        Self::from_cfg(&HonkCfg::default())
    }
}

impl HonkifyOptions {
    pub fn from_cfg(cfg: &HonkCfg) -> Self {
        Self {
            force: false,
            chance: cfg.honkify_chance,
            double_honk_chance: cfg.double_honk_chance,
            takeover_threshold: cfg.takeover_threshold,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-word, case-insensitive occurrences of "honk".
pub fn count_honks(text: &str) -> usize {
    text.split(|c: char| !is_word_char(c))
        .filter(|w| w.eq_ignore_ascii_case(HONK))
        .count()
}

fn is_lone_honk(text: &str) -> bool {
    let mut words = text.split_whitespace();
    matches!((words.next(), words.next()), (Some(w), None) if w.eq_ignore_ascii_case(HONK))
}

/// Replace every word with "honk", keeping spacing and punctuation.
/// Apostrophes inside a word belong to it ("don't" is one word).
pub fn word_honkify(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if !is_word_char(chars[i]) {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let mut end = i;
        while end < chars.len() && (is_word_char(chars[end]) || chars[end] == '\'') {
            end += 1;
        }
        // trailing apostrophes are punctuation, not part of the word
        let mut word_end = end;
        while word_end > i && chars[word_end - 1] == '\'' {
            word_end -= 1;
        }
        out.push_str(HONK);
        out.extend(&chars[word_end..end]);
        i = end;
    }
    out
}

fn truncate(text: String) -> String {
    match text.char_indices().nth(MAX_REPLY_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}

/// Possibly transform a message into honks and feed the honk counters.
///
/// Empty text never triggers. Text already containing "honk" always does;
/// anything else needs `opts.force` or a roll under `opts.chance`.
pub fn honkify_message<R: Rng + ?Sized>(
    text: &str,
    user: UserId,
    channel: ChannelId,
    store: &StateStore,
    rng: &mut R,
    opts: &HonkifyOptions,
    now: DateTime<Utc>,
) -> Option<HonkifyOutcome> {
    if text.trim().is_empty() {
        return None;
    }

    let has_honk = count_honks(text) > 0;
    let triggered = opts.force || has_honk || rng.random::<f32>() < opts.chance;
    if !triggered {
        return None;
    }

    let (action, reply) = if is_lone_honk(text) {
        (HonkifyAction::LoneHonkReply, HONK.to_string())
    } else if has_honk && rng.random::<f32>() < opts.double_honk_chance {
        let loud = HONK.to_uppercase();
        (HonkifyAction::DoubleHonk, format!("{loud} {loud}!"))
    } else {
        (HonkifyAction::Honkified, word_honkify(text))
    };

    let delta = action.delta();
    store.increment_user_honks(user, delta);
    let channel_count = store.increment_channel_honks(channel, delta);
    let takeover_ready = store.is_takeover_ready(channel, channel_count, opts.takeover_threshold, now);

    tracing::debug!(
        user = %user,
        channel = %channel,
        action = action.as_str(),
        channel_count,
        takeover_ready,
        "message honkified"
    );

    Some(HonkifyOutcome {
        text: truncate(reply),
        action,
        honk_delta: delta,
        takeover_ready,
    })
}
