use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifiers ───────────────────────────────────────────────

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake_id!(
    /// One independent group context evaluated by the scheduler.
    GuildId
);
snowflake_id!(
    /// Text channel inside a guild.
    ChannelId
);
snowflake_id!(UserId);

// ── Mood ──────────────────────────────────────────────────────

/// Discrete mood label derived from aggression and chaos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mood {
    Serene,
    Alert,
    Agitated,
    Ferocious,
    Chaotic,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serene => "serene",
            Self::Alert => "alert",
            Self::Agitated => "agitated",
            Self::Ferocious => "ferocious",
            Self::Chaotic => "chaotic",
        }
    }

    /// Ferocious or Chaotic.
    pub fn is_hostile(&self) -> bool {
        matches!(self, Self::Ferocious | Self::Chaotic)
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Continuous mood state. All four numeric dimensions live in [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodState {
    pub aggression: f32,
    pub boredom: f32,
    pub curiosity: f32,
    pub chaos: f32,
    pub mood: Mood,
    pub last_updated: DateTime<Utc>,
    /// While set and in the future, `mood` is pinned and not re-derived.
    pub override_until: Option<DateTime<Utc>>,
}

impl MoodState {
    pub const DEFAULT_AGGRESSION: f32 = 0.10;
    pub const DEFAULT_BOREDOM: f32 = 0.30;
    pub const DEFAULT_CURIOSITY: f32 = 0.40;
    pub const DEFAULT_CHAOS: f32 = 0.20;

    /// Fresh state with the fixed defaults, stamped at `now`.
    pub fn initial(now: DateTime<Utc>) -> Self {
        let mut state = Self {
            aggression: Self::DEFAULT_AGGRESSION,
            boredom: Self::DEFAULT_BOREDOM,
            curiosity: Self::DEFAULT_CURIOSITY,
            chaos: Self::DEFAULT_CHAOS,
            mood: Mood::Serene,
            last_updated: now,
            override_until: None,
        };
        state.mood = state.derived_mood();
        state
    }

    /// Clamp all dimensions to [0.0, 1.0]. NaN collapses to 0.
    pub fn clamp(&mut self) {
        self.aggression = unit(self.aggression);
        self.boredom = unit(self.boredom);
        self.curiosity = unit(self.curiosity);
        self.chaos = unit(self.chaos);
    }

    /// `clamp(0.7 * aggression + 0.3 * chaos)`.
    pub fn intensity(&self) -> f32 {
        unit(0.7 * self.aggression + 0.3 * self.chaos)
    }

    /// Mood label implied by the numeric fields, ignoring any override.
    pub fn derived_mood(&self) -> Mood {
        crate::mood::engine::mood_for_intensity(self.intensity())
    }

    pub fn is_overridden(&self, now: DateTime<Utc>) -> bool {
        self.override_until.is_some_and(|until| now < until)
    }
}

/// Clamp to [0.0, 1.0], mapping NaN to 0.
pub fn unit(x: f32) -> f32 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

// ── Intents & actions ─────────────────────────────────────────

/// Candidate autonomous action category ranked by the mood engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Intent {
    Lurk,
    Honkify,
    Echo,
    Takeover,
    MediaBurst,
    VoiceChaos,
    Retaliate,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lurk => "lurk",
            Self::Honkify => "honkify",
            Self::Echo => "echo",
            Self::Takeover => "takeover",
            Self::MediaBurst => "media_burst",
            Self::VoiceChaos => "voice_chaos",
            Self::Retaliate => "retaliate",
        }
    }
}

/// Action category the scheduler dispatches to an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionCategory {
    Voice,
    Takeover,
    HonkBurst,
    MessageFlood,
}

impl ActionCategory {
    pub const ALL: [ActionCategory; 4] = [
        ActionCategory::Voice,
        ActionCategory::Takeover,
        ActionCategory::HonkBurst,
        ActionCategory::MessageFlood,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Takeover => "takeover",
            Self::HonkBurst => "honk_burst",
            Self::MessageFlood => "message_flood",
        }
    }

    /// Whether the action targets a text channel.
    pub fn needs_channel(&self) -> bool {
        !matches!(self, Self::Voice)
    }
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice behaviour suggested to the voice executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceAction {
    /// Join an occupied channel, drag a random member elsewhere, leave.
    MoveMember,
    /// Join an occupied channel and idle for a while.
    LingerActive,
    /// Join an empty channel and idle until someone shows up.
    LingerIdle,
}

/// Signals computed for one guild during a scheduler cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    pub guild: GuildId,
    pub channel: Option<ChannelId>,
    pub activity_score: f32,
    pub honk_density: f32,
    pub provocation: f32,
    pub chance: f32,
    pub mood: Mood,
    pub chaos: f32,
    pub voice_action: VoiceAction,
}

// ── Provocation ───────────────────────────────────────────────

/// Immutable message-like value consumed by the provocation scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvocationEvent {
    pub author: UserId,
    pub content: String,
    pub mentions: Vec<UserId>,
    /// `@everyone` / `@here` style broadcast mention.
    pub mentions_everyone: bool,
    pub timestamp: DateTime<Utc>,
}

impl ProvocationEvent {
    pub fn new(author: UserId, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            author,
            content: content.into(),
            mentions: Vec::new(),
            mentions_everyone: false,
            timestamp,
        }
    }

    pub fn with_mentions(mut self, mentions: impl IntoIterator<Item = UserId>) -> Self {
        self.mentions = mentions.into_iter().collect();
        self
    }

    pub fn with_everyone(mut self) -> Self {
        self.mentions_everyone = true;
        self
    }
}

/// Severity tier. Ordered `None < Warn < Retaliate < Severe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    None,
    Warn,
    Retaliate,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warn => "warn",
            Self::Retaliate => "retaliate",
            Self::Severe => "severe",
        }
    }
}

/// Per-user decaying provocation score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProvocationRecord {
    pub score: f32,
    pub last_updated: DateTime<Utc>,
}
