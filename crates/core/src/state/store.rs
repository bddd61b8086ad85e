use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, UserId};

/// Cooldown purpose for the per-guild autonomous action gate.
pub const GUILD_COOLDOWN: &str = "chaos_guild";
/// Cooldown purpose for per-channel takeovers.
pub const TAKEOVER_COOLDOWN: &str = "takeover";

/// The two independent lock flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockKind {
    /// Persistent honk transform of every message.
    Honk,
    /// Mocking repeat of every message.
    Echo,
}

type CooldownMap = HashMap<String, HashMap<u64, DateTime<Utc>>>;

/// Process-wide counters, cooldowns and lock flags.
///
/// One mutex per logical map; every published operation touches a single
/// key under that map's lock, so concurrent callers never lose updates.
/// Locks are never held across an `.await`.
#[derive(Debug, Default)]
pub struct StateStore {
    user_honks: Mutex<HashMap<UserId, u64>>,
    channel_honks: Mutex<HashMap<ChannelId, u64>>,
    cooldowns: Mutex<CooldownMap>,
    honk_locks: Mutex<HashMap<UserId, DateTime<Utc>>>,
    echo_locks: Mutex<HashMap<UserId, DateTime<Utc>>>,
}

/// Recover the guard from a poisoned lock: every critical section leaves the
/// map consistent, so the data is still valid.
fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── user counters ─────────────────────────────────────────

    pub fn user_honk_count(&self, user: UserId) -> u64 {
        guard(&self.user_honks).get(&user).copied().unwrap_or(0)
    }

    /// Add `delta` and return the new count.
    pub fn increment_user_honks(&self, user: UserId, delta: u64) -> u64 {
        let mut map = guard(&self.user_honks);
        let count = map.entry(user).or_insert(0);
        *count = count.saturating_add(delta);
        *count
    }

    /// Subtract `step` (saturating) and return the new count.
    pub fn decay_user_honks(&self, user: UserId, step: u64) -> u64 {
        decay_key(&mut guard(&self.user_honks), user, step)
    }

    pub fn reset_user_honks(&self, user: UserId) {
        guard(&self.user_honks).remove(&user);
    }

    pub fn clear_user_honks(&self) {
        guard(&self.user_honks).clear();
    }

    /// Top `limit` users by honk count, ties broken by id.
    pub fn top_honkers(&self, limit: usize) -> Vec<(UserId, u64)> {
        let mut rows: Vec<(UserId, u64)> = guard(&self.user_honks)
            .iter()
            .map(|(user, count)| (*user, *count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        rows.truncate(limit);
        rows
    }

    // ── channel counters ──────────────────────────────────────

    pub fn channel_honk_activity(&self, channel: ChannelId) -> u64 {
        guard(&self.channel_honks).get(&channel).copied().unwrap_or(0)
    }

    pub fn increment_channel_honks(&self, channel: ChannelId, delta: u64) -> u64 {
        let mut map = guard(&self.channel_honks);
        let count = map.entry(channel).or_insert(0);
        *count = count.saturating_add(delta);
        *count
    }

    pub fn decay_channel_honks(&self, channel: ChannelId, step: u64) -> u64 {
        decay_key(&mut guard(&self.channel_honks), channel, step)
    }

    /// Decay every channel counter by `step`, dropping those that reach zero.
    pub fn decay_all_channel_honks(&self, step: u64) {
        if step == 0 {
            return;
        }
        guard(&self.channel_honks).retain(|_, count| {
            *count = count.saturating_sub(step);
            *count > 0
        });
    }

    pub fn reset_channel_honks(&self, channel: ChannelId) {
        guard(&self.channel_honks).remove(&channel);
    }

    pub fn clear_channel_honks(&self) {
        guard(&self.channel_honks).clear();
    }

    // ── cooldowns ─────────────────────────────────────────────

    /// True iff `now < expiry` for `(purpose, id)`.
    pub fn is_on_cooldown(&self, purpose: &str, id: u64, now: DateTime<Utc>) -> bool {
        guard(&self.cooldowns)
            .get(purpose)
            .and_then(|entries| entries.get(&id))
            .is_some_and(|expiry| now < *expiry)
    }

    /// Create or overwrite the expiry for `(purpose, id)`.
    pub fn set_cooldown(&self, purpose: &str, id: u64, expiry: DateTime<Utc>) {
        let mut map = guard(&self.cooldowns);
        set_expiry(&mut map, purpose, id, expiry);
    }

    /// Time left on the cooldown, `None` when not on cooldown.
    pub fn cooldown_remaining(&self, purpose: &str, id: u64, now: DateTime<Utc>) -> Option<Duration> {
        let expiry = guard(&self.cooldowns).get(purpose)?.get(&id).copied()?;
        (expiry - now).to_std().ok().filter(|d| !d.is_zero())
    }

    pub fn clear_cooldown(&self, purpose: &str, id: u64) {
        let mut map = guard(&self.cooldowns);
        if let Some(entries) = map.get_mut(purpose) {
            entries.remove(&id);
        }
    }

    pub fn clear_cooldowns(&self) {
        guard(&self.cooldowns).clear();
    }

    // ── takeover gate ─────────────────────────────────────────

    /// Count at or above threshold and channel not on takeover cooldown.
    pub fn is_takeover_ready(
        &self,
        channel: ChannelId,
        count: u64,
        threshold: u64,
        now: DateTime<Utc>,
    ) -> bool {
        count >= threshold && !self.is_on_cooldown(TAKEOVER_COOLDOWN, channel.0, now)
    }

    /// Check readiness and arm the takeover cooldown in one step.
    ///
    /// Returns true for exactly one caller per cooldown window, no matter
    /// how long the channel counter stays above the threshold.
    pub fn try_claim_takeover(
        &self,
        channel: ChannelId,
        threshold: u64,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> bool {
        if self.channel_honk_activity(channel) < threshold {
            return false;
        }
        let mut map = guard(&self.cooldowns);
        let active = map
            .get(TAKEOVER_COOLDOWN)
            .and_then(|entries| entries.get(&channel.0))
            .is_some_and(|expiry| now < *expiry);
        if active {
            return false;
        }
        let expiry = expiry_after(now, cooldown);
        set_expiry(&mut map, TAKEOVER_COOLDOWN, channel.0, expiry);
        true
    }

    // ── lock flags ────────────────────────────────────────────

    fn locks(&self, kind: LockKind) -> &Mutex<HashMap<UserId, DateTime<Utc>>> {
        match kind {
            LockKind::Honk => &self.honk_locks,
            LockKind::Echo => &self.echo_locks,
        }
    }

    /// Lock `user`. Returns true if the user was not already locked;
    /// an existing lock keeps its original timestamp.
    pub fn lock(&self, kind: LockKind, user: UserId, now: DateTime<Utc>) -> bool {
        let mut map = guard(self.locks(kind));
        if map.contains_key(&user) {
            return false;
        }
        map.insert(user, now);
        true
    }

    /// Returns true if a lock was removed.
    pub fn unlock(&self, kind: LockKind, user: UserId) -> bool {
        guard(self.locks(kind)).remove(&user).is_some()
    }

    pub fn is_locked(&self, kind: LockKind, user: UserId) -> bool {
        guard(self.locks(kind)).contains_key(&user)
    }

    pub fn locked_since(&self, kind: LockKind, user: UserId) -> Option<DateTime<Utc>> {
        guard(self.locks(kind)).get(&user).copied()
    }

    /// Locked users sorted by id.
    pub fn locked_users(&self, kind: LockKind) -> Vec<UserId> {
        let mut users: Vec<UserId> = guard(self.locks(kind)).keys().copied().collect();
        users.sort();
        users
    }

    pub fn clear_locks(&self, kind: LockKind) {
        guard(self.locks(kind)).clear();
    }

    /// Drop every counter, cooldown and lock.
    pub fn clear_all(&self) {
        self.clear_user_honks();
        self.clear_channel_honks();
        self.clear_cooldowns();
        self.clear_locks(LockKind::Honk);
        self.clear_locks(LockKind::Echo);
    }

    // ── snapshots ─────────────────────────────────────────────

    /// Copy of every map. Each map is read under its own lock, so the
    /// snapshot is per-map consistent, not globally consistent.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut cooldowns: Vec<CooldownRow> = guard(&self.cooldowns)
            .iter()
            .flat_map(|(purpose, entries)| {
                entries.iter().map(move |(id, expiry)| CooldownRow {
                    purpose: purpose.clone(),
                    id: *id,
                    expiry: *expiry,
                })
            })
            .collect();
        cooldowns.sort_by(|a, b| a.purpose.cmp(&b.purpose).then(a.id.cmp(&b.id)));

        StoreSnapshot {
            user_honks: sorted_pairs(&guard(&self.user_honks)),
            channel_honks: sorted_pairs(&guard(&self.channel_honks)),
            cooldowns,
            honk_locks: sorted_pairs(&guard(&self.honk_locks)),
            echo_locks: sorted_pairs(&guard(&self.echo_locks)),
        }
    }

    /// Replace every map with the snapshot's contents.
    pub fn restore(&self, snapshot: StoreSnapshot) {
        *guard(&self.user_honks) = snapshot.user_honks.into_iter().collect();
        *guard(&self.channel_honks) = snapshot.channel_honks.into_iter().collect();
        {
            let mut map = guard(&self.cooldowns);
            map.clear();
            for row in snapshot.cooldowns {
                set_expiry(&mut map, &row.purpose, row.id, row.expiry);
            }
        }
        *guard(&self.honk_locks) = snapshot.honk_locks.into_iter().collect();
        *guard(&self.echo_locks) = snapshot.echo_locks.into_iter().collect();
    }
}

fn decay_key<K: std::hash::Hash + Eq>(map: &mut HashMap<K, u64>, key: K, step: u64) -> u64 {
    let Some(count) = map.get_mut(&key) else {
        return 0;
    };
    *count = count.saturating_sub(step);
    let left = *count;
    if left == 0 {
        map.remove(&key);
    }
    left
}

/// `now + span`, saturating at the far future.
pub fn expiry_after(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(span)
        .ok()
        .and_then(|span| now.checked_add_signed(span))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn set_expiry(map: &mut CooldownMap, purpose: &str, id: u64, expiry: DateTime<Utc>) {
    match map.get_mut(purpose) {
        Some(entries) => {
            entries.insert(id, expiry);
        }
        None => {
            map.insert(purpose.to_owned(), HashMap::from([(id, expiry)]));
        }
    }
}

fn sorted_pairs<K: Copy + Ord, V: Copy>(map: &HashMap<K, V>) -> Vec<(K, V)> {
    let mut rows: Vec<(K, V)> = map.iter().map(|(k, v)| (*k, *v)).collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

/// Serializable copy of the store, for an external durable layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub user_honks: Vec<(UserId, u64)>,
    pub channel_honks: Vec<(ChannelId, u64)>,
    pub cooldowns: Vec<CooldownRow>,
    pub honk_locks: Vec<(UserId, DateTime<Utc>)>,
    pub echo_locks: Vec<(UserId, DateTime<Utc>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownRow {
    pub purpose: String,
    pub id: u64,
    pub expiry: DateTime<Utc>,
}
