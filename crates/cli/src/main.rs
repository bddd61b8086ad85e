mod sim;

use std::sync::Arc;
use std::time::Duration;

use honk_core::chaos::{ChaosScheduler, Collaborators};
use honk_core::config::HonkCfg;
use honk_core::handler::MessageHandler;
use honk_core::honk::HonkifyOptions;
use honk_core::mood::MoodEngine;
use honk_core::persistence::load_snapshot;
use honk_core::provocation::ProvocationLedger;
use honk_core::runtime::{ShutdownGuard, spawn_flush_task};
use honk_core::state::StateStore;
use sqlx::PgPool;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;
const DEFAULT_SIM_GUILDS: u64 = 3;
const SIM_MESSAGE_INTERVAL: Duration = Duration::from_millis(1500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // DATABASE_URL is optional; without it nothing survives a restart.
    let pool = connect_db().await;

    let cfg = match &pool {
        Some(pool) => HonkCfg::load(pool).await?,
        None => HonkCfg::default(),
    };
    cfg.validate()?;
    let cfg = Arc::new(cfg);

    let store = Arc::new(StateStore::new());
    if let Some(pool) = &pool {
        match load_snapshot(pool, &store).await {
            Ok(true) => tracing::info!("state restored from snapshot"),
            Ok(false) => tracing::info!("no saved state, starting fresh"),
            Err(e) => tracing::warn!(error = %e, "state restore failed, starting fresh"),
        }
    }

    let mood = Arc::new(MoodEngine::from_cfg(&cfg));
    let ledger = Arc::new(ProvocationLedger::from_cfg(&cfg)?);

    let guild_count = env_parse("HONK_SIM_GUILDS").unwrap_or(DEFAULT_SIM_GUILDS);
    let seed: Option<u64> = env_parse("HONK_SEED");
    let world = Arc::new(sim::SimWorld::new(guild_count));
    let deps = Collaborators::new(world.clone(), world.clone()).with_provocation(ledger.clone());

    let mut scheduler = ChaosScheduler::new(cfg.clone(), store.clone(), mood.clone(), deps)?;
    if let Some(seed) = seed {
        scheduler = scheduler.with_seed(seed);
    }

    let shutdown = ShutdownGuard::new();
    shutdown.spawn_signal_listener();

    let flush = pool.map(|pool| {
        spawn_flush_task(pool, store.clone(), cfg.state_flush_interval_secs, shutdown.token())
    });

    scheduler.start();

    let handler = MessageHandler::new(
        store.clone(),
        mood.clone(),
        ledger.clone(),
        HonkifyOptions::from_cfg(&cfg),
    )
    .with_bot_id(sim::BOT_ID);
    let pump = tokio::spawn(sim::pump_messages(
        world,
        handler,
        SIM_MESSAGE_INTERVAL,
        seed,
        shutdown.token(),
    ));

    let mut mood_rx = mood.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            changed = mood_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *mood_rx.borrow_and_update();
                tracing::debug!(mood = %state.mood, aggression = state.aggression, chaos = state.chaos, "mood changed");
            }
        }
    }

    if let Some(report) = scheduler.stop().await? {
        tracing::info!(cycles = report.cycles, actions = report.actions, "scheduler stopped");
    }
    if let Err(e) = pump.await {
        tracing::warn!(error = %e, "message pump task failed");
    }
    let pruned = ledger.prune(chrono::Utc::now());
    tracing::debug!(pruned, "provocation ledger pruned");
    if let Some(flush) = flush
        && let Err(e) = flush.await
    {
        tracing::warn!(error = %e, "flush task failed");
    }

    tracing::info!(top = ?store.top_honkers(3), "goose going to sleep");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var_os("HONK_LOG_JSON").is_some() {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn connect_db() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        tracing::warn!("DATABASE_URL not set, running in ephemeral mode");
        return None;
    };

    let connect_result = tokio::time::timeout(
        Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&url),
    )
    .await;

    match connect_result {
        Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
            Ok(()) => {
                tracing::info!("database connected and migrations applied");
                Some(pool)
            }
            Err(e) => {
                tracing::warn!(error = %e, "database migration failed, falling back to ephemeral mode");
                None
            }
        },
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to connect DATABASE_URL, falling back to ephemeral mode");
            None
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = DB_CONNECT_TIMEOUT_SECS,
                "database connect timed out, falling back to ephemeral mode"
            );
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
