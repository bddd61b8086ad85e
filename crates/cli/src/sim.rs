//! In-process stand-in for a chat platform: fake guilds, channels and
//! members, an executor that only logs, and a synthetic message pump.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use honk_core::chaos::{ActionExecutor, ActivitySource, CollaboratorError};
use honk_core::handler::MessageHandler;
use honk_core::provocation::scoring::REPETITION_WINDOW;
use honk_core::timers::burst_pause;
use honk_core::types::{ActionContext, ChannelId, GuildId, ProvocationEvent, UserId};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

pub const BOT_ID: UserId = UserId(1);

const CHANNELS_PER_GUILD: u64 = 3;
const MEMBERS_PER_GUILD: u64 = 6;
const BURST_LINES: usize = 3;

const CHATTER: &[&str] = &[
    "good morning everyone",
    "anyone up for a game later?",
    "honk",
    "did you see the pond today",
    "honk honk",
    "this goose is so stupid",
    "WHO LET THE GOOSE IN HERE!!!",
    "shut up you useless birdbrain",
    "lol",
    "i will pluck that goose",
];

#[derive(Debug)]
pub struct SimWorld {
    guilds: Vec<GuildId>,
    /// Messages seen per channel since the last activity snapshot.
    recent: Mutex<HashMap<ChannelId, u32>>,
}

impl SimWorld {
    pub fn new(guild_count: u64) -> Self {
        Self {
            guilds: (1..=guild_count.max(1)).map(GuildId).collect(),
            recent: Mutex::new(HashMap::new()),
        }
    }

    fn recent(&self) -> MutexGuard<'_, HashMap<ChannelId, u32>> {
        self.recent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn channels(guild: GuildId) -> impl Iterator<Item = ChannelId> {
        (1..=CHANNELS_PER_GUILD).map(move |k| ChannelId(guild.0 * 100 + k))
    }

    fn members(guild: GuildId) -> impl Iterator<Item = UserId> {
        (1..=MEMBERS_PER_GUILD).map(move |k| UserId(guild.0 * 1000 + k))
    }

    fn note_message(&self, channel: ChannelId) {
        *self.recent().entry(channel).or_default() += 1;
    }
}

#[async_trait::async_trait]
impl ActivitySource for SimWorld {
    async fn active_guilds(&self) -> Result<Vec<GuildId>, CollaboratorError> {
        Ok(self.guilds.clone())
    }

    async fn activity_snapshot(
        &self,
        guild: GuildId,
    ) -> Result<HashMap<ChannelId, u32>, CollaboratorError> {
        if !self.guilds.contains(&guild) {
            return Err(CollaboratorError::Rejected(format!("unknown guild {guild}")));
        }
        let mut recent = self.recent();
        Ok(Self::channels(guild)
            .map(|c| (c, recent.remove(&c).unwrap_or(0)))
            .collect())
    }

    async fn recent_members(
        &self,
        guild: GuildId,
        _channel: ChannelId,
    ) -> Result<Vec<UserId>, CollaboratorError> {
        Ok(Self::members(guild).collect())
    }
}

#[async_trait::async_trait]
impl ActionExecutor for SimWorld {
    async fn run_voice_action(
        &self,
        guild: GuildId,
        context: &ActionContext,
    ) -> Result<bool, CollaboratorError> {
        tracing::info!(guild = %guild, voice_action = ?context.voice_action, mood = %context.mood, "sim: voice chaos");
        Ok(true)
    }

    async fn run_channel_takeover(&self, channel: ChannelId) -> Result<bool, CollaboratorError> {
        tracing::info!(channel = %channel, "sim: channel takeover, HONK HONK HONK");
        Ok(true)
    }

    async fn run_honk_burst(
        &self,
        channel: ChannelId,
        members: &[UserId],
    ) -> Result<bool, CollaboratorError> {
        for line in 0..BURST_LINES {
            let target = members.get(line % members.len().max(1));
            tracing::info!(channel = %channel, target = ?target, line, "sim: honk");
            let pause = burst_pause(&mut rand::rng(), 100, 400);
            pause.await;
        }
        Ok(true)
    }

    async fn run_message_flood(&self, channel: ChannelId) -> Result<bool, CollaboratorError> {
        tracing::info!(channel = %channel, "sim: message flood");
        Ok(true)
    }
}

/// Feed synthetic messages through the handler until cancelled.
pub async fn pump_messages(
    world: std::sync::Arc<SimWorld>,
    handler: MessageHandler,
    interval: Duration,
    seed: Option<u64>,
    cancel: CancellationToken,
) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ 0x9e37_79b9),
        None => StdRng::from_os_rng(),
    };
    let mut history: HashMap<UserId, VecDeque<ProvocationEvent>> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(guild) = world.guilds.choose(&mut rng).copied() else {
            continue;
        };
        let channel = ChannelId(guild.0 * 100 + rng.random_range(1..=CHANNELS_PER_GUILD));
        let author = UserId(guild.0 * 1000 + rng.random_range(1..=MEMBERS_PER_GUILD));
        let content = CHATTER.choose(&mut rng).copied().unwrap_or("honk");

        let now = Utc::now();
        let mut event = ProvocationEvent::new(author, content, now);
        if rng.random_bool(0.1) {
            event = event.with_mentions([BOT_ID]);
        }

        let past = history.entry(author).or_default();
        let earlier: Vec<ProvocationEvent> = past.iter().cloned().collect();
        let outcome = handler.handle(guild, channel, &event, &earlier, now);
        past.push_front(event);
        past.truncate(REPETITION_WINDOW);
        world.note_message(channel);

        if let Some(honk) = &outcome.honk {
            tracing::info!(channel = %channel, reply = %honk.text, takeover_ready = honk.takeover_ready, "sim: honkified reply");
        }
        if let Some(tier) = outcome.retaliate {
            tracing::info!(guild = %guild, user = %author, tier = tier.as_str(), "sim: would retaliate");
        }
    }
    tracing::info!("message pump stopped");
}
