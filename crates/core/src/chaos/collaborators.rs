use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{ActionContext, ChannelId, GuildId, UserId};

/// Transient failure of an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("collaborator failed: {0}")]
    Failed(String),
}

/// Safety/admission gate. Callers treat errors as "allow".
#[async_trait::async_trait]
pub trait SafetyGate: Send + Sync {
    async fn is_admissible(
        &self,
        guild: GuildId,
        channel: Option<ChannelId>,
    ) -> Result<bool, CollaboratorError>;
}

/// Guild-wide provocation level in `[0, 1]`. Callers treat errors as 0.
#[async_trait::async_trait]
pub trait ProvocationSource: Send + Sync {
    async fn provocation_level(&self, guild: GuildId) -> Result<f32, CollaboratorError>;
}

/// Read-only view of platform activity.
#[async_trait::async_trait]
pub trait ActivitySource: Send + Sync {
    /// Guilds the scheduler should evaluate this cycle.
    async fn active_guilds(&self) -> Result<Vec<GuildId>, CollaboratorError>;

    /// Recent short-window message counts per channel. Empty is valid.
    async fn activity_snapshot(
        &self,
        guild: GuildId,
    ) -> Result<HashMap<ChannelId, u32>, CollaboratorError>;

    /// Members recently active in `channel`, used as honk burst targets.
    async fn recent_members(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Vec<UserId>, CollaboratorError>;
}

/// Platform side effects. Each call returns whether work was actually
/// performed; only performed actions arm cooldowns.
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn run_voice_action(
        &self,
        guild: GuildId,
        context: &ActionContext,
    ) -> Result<bool, CollaboratorError>;

    async fn run_channel_takeover(&self, channel: ChannelId) -> Result<bool, CollaboratorError>;

    async fn run_honk_burst(
        &self,
        channel: ChannelId,
        members: &[UserId],
    ) -> Result<bool, CollaboratorError>;

    async fn run_message_flood(&self, channel: ChannelId) -> Result<bool, CollaboratorError>;
}

/// Gate that never vetoes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait::async_trait]
impl SafetyGate for AllowAll {
    async fn is_admissible(
        &self,
        _guild: GuildId,
        _channel: Option<ChannelId>,
    ) -> Result<bool, CollaboratorError> {
        Ok(true)
    }
}

/// Provocation source that always reports calm.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProvocation;

#[async_trait::async_trait]
impl ProvocationSource for NoProvocation {
    async fn provocation_level(&self, _guild: GuildId) -> Result<f32, CollaboratorError> {
        Ok(0.0)
    }
}

/// Everything the scheduler talks to outside the core.
#[derive(Clone)]
pub struct Collaborators {
    pub activity: Arc<dyn ActivitySource>,
    pub safety: Arc<dyn SafetyGate>,
    pub provocation: Arc<dyn ProvocationSource>,
    pub executor: Arc<dyn ActionExecutor>,
}

impl Collaborators {
    /// Defaults to [`AllowAll`] and [`NoProvocation`].
    pub fn new(activity: Arc<dyn ActivitySource>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            activity,
            safety: Arc::new(AllowAll),
            provocation: Arc::new(NoProvocation),
            executor,
        }
    }

    pub fn with_safety(mut self, safety: Arc<dyn SafetyGate>) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_provocation(mut self, provocation: Arc<dyn ProvocationSource>) -> Self {
        self.provocation = provocation;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
