use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::collaborators::{CollaboratorError, Collaborators};
use super::selection::{
    ChanceWeights, Signals, activity_score, choose_action, honk_density, pick_hot_channel,
    select_voice_action, should_act,
};
use crate::config::{ConfigError, HonkCfg};
use crate::mood::{MoodEngine, MoodEvent};
use crate::state::StateStore;
use crate::state::store::{GUILD_COOLDOWN, TAKEOVER_COOLDOWN, expiry_after};
use crate::timers::{RateLimiter, randomized_delay};
use crate::types::{ActionCategory, ActionContext, ChannelId, GuildId, unit};

const RATE_WINDOW: Duration = Duration::from_secs(3600);

/// Used only if the configured cycle bounds were somehow rejected.
const FALLBACK_CYCLE_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("activity snapshot failed for guild {guild}: {source}")]
    Activity {
        guild: GuildId,
        #[source]
        source: CollaboratorError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("chaos loop task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What happened to one guild in one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuildOutcome {
    Cooldown,
    RateLimited,
    Vetoed,
    NoAction { chance: f32, roll: f32 },
    NotPerformed { action: ActionCategory },
    Performed { action: ActionCategory, channel: Option<ChannelId> },
}

/// Tally of a single cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub evaluated: usize,
    pub performed: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// Totals returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub cycles: u64,
    pub actions: u64,
}

/// One decision pass over every active guild. Owns the RNG and the
/// per-guild rate limiters; shared state lives behind `Arc`s.
pub struct DecisionCycle {
    cfg: Arc<HonkCfg>,
    store: Arc<StateStore>,
    mood: Arc<MoodEngine>,
    deps: Collaborators,
    chance: ChanceWeights,
    rng: StdRng,
    rate_limits: HashMap<GuildId, RateLimiter>,
    cycles: u64,
    actions: u64,
}

impl DecisionCycle {
    pub fn new(
        cfg: Arc<HonkCfg>,
        store: Arc<StateStore>,
        mood: Arc<MoodEngine>,
        deps: Collaborators,
        rng: StdRng,
    ) -> Self {
        let chance = ChanceWeights::from_cfg(&cfg);
        Self {
            cfg,
            store,
            mood,
            deps,
            chance,
            rng,
            rate_limits: HashMap::new(),
            cycles: 0,
            actions: 0,
        }
    }

    pub fn report(&self) -> LoopReport {
        LoopReport { cycles: self.cycles, actions: self.actions }
    }

    /// Random sleep before the next cycle.
    pub fn next_delay(&mut self) -> Duration {
        randomized_delay(&mut self.rng, self.cfg.min_cycle_secs, self.cfg.max_cycle_secs)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "invalid cycle bounds, using fallback delay");
                FALLBACK_CYCLE_DELAY
            })
    }

    /// Evaluate every active guild at `now`, then decay channel counters.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>, cancel: &CancellationToken) -> CycleSummary {
        self.cycles += 1;
        let span = tracing::info_span!("chaos_cycle", n = self.cycles);
        async move {
            let mut summary = CycleSummary::default();
            let guilds = match self.deps.activity.active_guilds().await {
                Ok(g) => g,
                Err(e) => {
                    tracing::warn!(error = %e, "could not list active guilds");
                    Vec::new()
                }
            };

            for guild in guilds {
                if cancel.is_cancelled() {
                    tracing::info!("stop requested, ending cycle early");
                    summary.interrupted = true;
                    break;
                }
                summary.evaluated += 1;
                match AssertUnwindSafe(self.evaluate_guild(guild, now)).catch_unwind().await {
                    Ok(Ok(outcome)) => {
                        if matches!(outcome, GuildOutcome::Performed { .. }) {
                            summary.performed += 1;
                        }
                        tracing::debug!(guild = %guild, ?outcome, "guild evaluated");
                    }
                    Ok(Err(e)) => {
                        summary.failed += 1;
                        tracing::warn!(guild = %guild, error = %e, "guild evaluation failed");
                    }
                    Err(_) => {
                        summary.failed += 1;
                        tracing::error!(guild = %guild, "guild evaluation panicked");
                    }
                }
            }

            self.store.decay_all_channel_honks(self.cfg.channel_decay_step);
            summary
        }
        .instrument(span)
        .await
    }

    /// Run the decision pipeline for one guild.
    pub async fn evaluate_guild(
        &mut self,
        guild: GuildId,
        now: DateTime<Utc>,
    ) -> Result<GuildOutcome, CycleError> {
        if self.store.is_on_cooldown(GUILD_COOLDOWN, guild.0, now) {
            return Ok(GuildOutcome::Cooldown);
        }
        if self.limiter(guild)?.remaining(now) == 0 {
            return Ok(GuildOutcome::RateLimited);
        }

        let snapshot = self
            .deps
            .activity
            .activity_snapshot(guild)
            .await
            .map_err(|source| CycleError::Activity { guild, source })?;
        let activity = activity_score(&snapshot, self.cfg.target_messages, self.cfg.activity_floor);
        let channel = pick_hot_channel(&snapshot, &mut self.rng);
        let density = channel
            .map(|c| honk_density(self.store.channel_honk_activity(c), self.cfg.takeover_threshold))
            .unwrap_or(0.0);

        let provocation = match self.deps.provocation.provocation_level(guild).await {
            Ok(level) => unit(level),
            Err(e) => {
                tracing::warn!(guild = %guild, error = %e, "provocation source failed, assuming calm");
                0.0
            }
        };

        let mood = self.mood.tick(now);

        let admissible = match self.deps.safety.is_admissible(guild, channel).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(guild = %guild, error = %e, "safety gate failed, allowing");
                true
            }
        };
        if !admissible {
            tracing::info!(guild = %guild, channel = ?channel, "safety gate vetoed autonomous action");
            return Ok(GuildOutcome::Vetoed);
        }

        let chance = self.chance.action_chance(&Signals {
            chaos: mood.chaos,
            activity,
            density,
            provocation,
        });
        let roll: f32 = self.rng.random();
        if !should_act(roll, chance) {
            return Ok(GuildOutcome::NoAction { chance, roll });
        }

        let action = choose_action(mood.mood, density, &mut self.rng);
        let ctx = ActionContext {
            guild,
            channel,
            activity_score: activity,
            honk_density: density,
            provocation,
            chance,
            mood: mood.mood,
            chaos: mood.chaos,
            voice_action: select_voice_action(mood.chaos, self.rng.random()),
        };

        if !self.dispatch(action, &ctx, now).await {
            return Ok(GuildOutcome::NotPerformed { action });
        }

        // Executors may pause for a while; stamp from when the action finished.
        let done_at = now.max(Utc::now());
        self.store.set_cooldown(
            GUILD_COOLDOWN,
            guild.0,
            expiry_after(done_at, Duration::from_secs(self.cfg.guild_cooldown_secs)),
        );
        self.limiter(guild)?.try_acquire(done_at);
        let event = match action {
            ActionCategory::Takeover => MoodEvent::Takeover,
            _ => MoodEvent::Honk,
        };
        self.mood.apply(event, 1.0, done_at);
        self.actions += 1;
        tracing::info!(
            guild = %guild,
            action = %action,
            channel = ?channel,
            chance,
            mood = %mood.mood,
            "autonomous action performed"
        );
        Ok(GuildOutcome::Performed { action, channel })
    }

    fn limiter(&mut self, guild: GuildId) -> Result<&mut RateLimiter, ConfigError> {
        use std::collections::hash_map::Entry;
        match self.rate_limits.entry(guild) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let limiter = RateLimiter::new(self.cfg.max_actions_per_hour, RATE_WINDOW)?;
                Ok(e.insert(limiter))
            }
        }
    }

    async fn dispatch(&mut self, action: ActionCategory, ctx: &ActionContext, now: DateTime<Utc>) -> bool {
        let executor = Arc::clone(&self.deps.executor);
        if action.needs_channel() && ctx.channel.is_none() {
            tracing::debug!(guild = %ctx.guild, action = %action, "no hot channel for action");
            return false;
        }
        let result = match (action, ctx.channel) {
            (ActionCategory::Voice, _) => executor.run_voice_action(ctx.guild, ctx).await,
            (_, None) => return false,
            (ActionCategory::Takeover, Some(channel)) => {
                let cooldown = Duration::from_secs(self.cfg.takeover_cooldown_secs);
                if !self
                    .store
                    .try_claim_takeover(channel, self.cfg.takeover_threshold, now, cooldown)
                {
                    tracing::debug!(channel = %channel, "takeover not ready");
                    return false;
                }
                let result = executor.run_channel_takeover(channel).await;
                if !matches!(result, Ok(true)) {
                    self.store.clear_cooldown(TAKEOVER_COOLDOWN, channel.0);
                }
                result
            }
            (ActionCategory::HonkBurst, Some(channel)) => {
                let members = match self.deps.activity.recent_members(ctx.guild, channel).await {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(channel = %channel, error = %e, "recent members unavailable");
                        Vec::new()
                    }
                };
                executor.run_honk_burst(channel, &members).await
            }
            (ActionCategory::MessageFlood, Some(channel)) => executor.run_message_flood(channel).await,
        };

        match result {
            Ok(performed) => performed,
            Err(e) => {
                tracing::warn!(guild = %ctx.guild, action = %action, error = %e, "action executor failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for DecisionCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionCycle")
            .field("cycles", &self.cycles)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

async fn run_loop(mut cycle: DecisionCycle, cancel: CancellationToken) -> LoopReport {
    tracing::info!("chaos loop running");
    while !cancel.is_cancelled() {
        let delay = cycle.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        cycle.run_cycle(Utc::now(), &cancel).await;
    }
    let report = cycle.report();
    tracing::info!(cycles = report.cycles, actions = report.actions, "chaos loop stopped");
    report
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<LoopReport>,
}

/// Owner of the background decision loop.
pub struct ChaosScheduler {
    cfg: Arc<HonkCfg>,
    store: Arc<StateStore>,
    mood: Arc<MoodEngine>,
    deps: Collaborators,
    seed: Option<u64>,
    running: Mutex<Option<RunningLoop>>,
}

impl ChaosScheduler {
    /// Rejects invalid configuration up front.
    pub fn new(
        cfg: Arc<HonkCfg>,
        store: Arc<StateStore>,
        mood: Arc<MoodEngine>,
        deps: Collaborators,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            store,
            mood,
            deps,
            seed: None,
            running: Mutex::new(None),
        })
    }

    /// Deterministic RNG for every loop started afterwards.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cycle(&self) -> DecisionCycle {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        DecisionCycle::new(
            Arc::clone(&self.cfg),
            Arc::clone(&self.store),
            Arc::clone(&self.mood),
            self.deps.clone(),
            rng,
        )
    }

    pub fn is_running(&self) -> bool {
        self.running().as_ref().is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawn the loop. Returns false if one is already running.
    pub fn start(&self) -> bool {
        let mut running = self.running();
        if let Some(current) = running.as_ref()
            && !current.handle.is_finished()
        {
            return false;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(self.cycle(), cancel.clone()));
        *running = Some(RunningLoop { cancel, handle });
        tracing::info!(
            min_secs = self.cfg.min_cycle_secs,
            max_secs = self.cfg.max_cycle_secs,
            "chaos scheduler started"
        );
        true
    }

    /// Cancel the loop and wait for it. `None` if it was not running.
    pub async fn stop(&self) -> Result<Option<LoopReport>, SchedulerError> {
        let current = self.running().take();
        let Some(current) = current else {
            return Ok(None);
        };
        current.cancel.cancel();
        let report = current.handle.await?;
        Ok(Some(report))
    }
}

impl std::fmt::Debug for ChaosScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosScheduler")
            .field("seed", &self.seed)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
