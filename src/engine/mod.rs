use actix_web::web;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::api::models::{AppState, EngineEvent, LeaderboardEntry, TickSnapshot};
use crate::economy::settlement::{self, Settlement};
use crate::economy::ENERGY_REGEN_RATE;

/// Entries on the public leaderboard.
const LEADERBOARD_SIZE: usize = 20;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Cadence bookkeeping for the tick loop. Everything is computed from
/// wall-clock timestamps, so a late tick folds the full elapsed time instead
/// of assuming a fixed period.
pub struct TickClock {
    last_tick_ms: i64,
    last_flush_ms: i64,
    last_rank_ms: i64,
    minute_bucket: i64,
    hour_bucket: i64,
    day_bucket: i64,
}

impl TickClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            last_tick_ms: now_ms,
            last_flush_ms: now_ms,
            last_rank_ms: 0, // rank on the first tick
            minute_bucket: now_ms / 60_000,
            hour_bucket: now_ms / 3_600_000,
            day_bucket: now_ms / 86_400_000,
        }
    }
}

/// Spawn the authoritative tick loop on the actix runtime.
pub fn spawn(state: web::Data<AppState>) {
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(Duration::from_millis(
            state.config.tick_ms,
        ));
        let mut clock = TickClock::new(now_ms());
        info!("tick loop started ({} ms period)", state.config.tick_ms);
        loop {
            interval.tick().await;
            tick(&state, &mut clock, now_ms());
        }
    });
}

/// One authoritative tick: apply queued tuning, fold per-user accrual for
/// every live session, advance global progress, settle when the threshold is
/// crossed, and publish the broadcast snapshot.
pub fn tick(state: &AppState, clock: &mut TickClock, now_ms: i64) {
    apply_pending_tuning(state);

    // Prune idle sessions and collect the users still being folded.
    let online: HashSet<String> = {
        let mut sessions = state.sessions.lock().expect("mutex poisoned");
        sessions.retain(|_, s| now_ms - s.last_seen_ms <= state.config.session_idle_ms);
        sessions.values().map(|s| s.user_id.clone()).collect()
    };

    // Per-user fold. A missing ledger is isolated and logged; the rest of
    // the tick continues.
    {
        let mut ws = state.working_set.lock().expect("mutex poisoned");
        for user_id in &online {
            match ws.get_mut(user_id) {
                Some(ledger) => ledger.apply_elapsed(now_ms, ENERGY_REGEN_RATE),
                None => warn!("session references unknown ledger {user_id}"),
            }
        }
    }

    // Advance global progress from the elapsed wall clock.
    let crossed = {
        let mut net = state.network.lock().expect("mutex poisoned");
        let elapsed = (now_ms - clock.last_tick_ms).max(0) as f64 / 1_000.0;
        if net.network_hash_rate > 0.0 {
            net.progress += net.network_hash_rate * elapsed;
        }

        let minute = now_ms / 60_000;
        if minute != clock.minute_bucket {
            net.sample_minute();
            clock.minute_bucket = minute;
        }
        let hour = now_ms / 3_600_000;
        if hour != clock.hour_bucket {
            net.sample_hour();
            clock.hour_bucket = hour;
        }
        let day = now_ms / 86_400_000;
        if day != clock.day_bucket {
            net.sample_day();
            clock.day_bucket = day;
        }

        net.progress >= net.difficulty
    };
    clock.last_tick_ms = now_ms;

    if crossed {
        // Crossed by passive accrual: no closer gets the bonus.
        try_settle(state, None, now_ms);
    }

    if now_ms - clock.last_rank_ms >= state.config.leaderboard_ms as i64 {
        clock.last_rank_ms = now_ms;
        rebuild_leaderboard(state);
    }

    if now_ms - clock.last_flush_ms >= state.config.flush_ms as i64 {
        clock.last_flush_ms = now_ms;
        match flush(state) {
            Ok(0) => {}
            Ok(n) => debug!("flushed {n} dirty ledgers"),
            Err(e) => error!("periodic flush failed: {e}"),
        }
    }

    publish_snapshot(state, online.len(), now_ms);
}

fn apply_pending_tuning(state: &AppState) {
    let tuning = state
        .pending_tuning
        .lock()
        .expect("mutex poisoned")
        .take();
    if let Some(tuning) = tuning {
        let mut net = state.network.lock().expect("mutex poisoned");
        match tuning.apply_to(&mut net) {
            Ok(()) => info!("applied admin tuning snapshot"),
            Err(e) => warn!("rejected admin tuning snapshot: {e}"),
        }
    }
}

/// Settle the current block unless a settlement is already in flight. The
/// threshold is re-checked under the network lock, so two concurrent
/// crossings settle exactly once and the loser simply defers.
pub fn try_settle(state: &AppState, closer: Option<&str>, now_ms: i64) -> Option<Settlement> {
    if state
        .settling
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        debug!("settlement already in flight; deferred");
        return None;
    }

    let outcome = {
        let mut net = state.network.lock().expect("mutex poisoned");
        if net.progress < net.difficulty {
            state.settling.store(false, Ordering::Release);
            return None;
        }
        let mut ws = state.working_set.lock().expect("mutex poisoned");
        settlement::settle(&mut net, &mut ws, closer, now_ms)
    };

    {
        let mut events = state.events.lock().expect("mutex poisoned");
        events.push(EngineEvent::BlockFound {
            height: outcome.height,
            reward: outcome.minted,
            closer: outcome.closer.clone(),
        });
    }

    // Settlement credits must not sit only in memory.
    if let Err(e) = flush(state) {
        error!("flush after settlement failed (retrying next cycle): {e}");
    }

    state.settling.store(false, Ordering::Release);
    Some(outcome)
}

/// Batch dirty working-set entries plus the network singleton into the
/// durable store and persist the snapshot. Returns the batch size.
pub fn flush(state: &AppState) -> io::Result<usize> {
    let network = state.network.lock().expect("mutex poisoned").clone();
    let batch = state
        .working_set
        .lock()
        .expect("mutex poisoned")
        .take_dirty();
    let count = batch.len();

    let store = &mut *state.store.lock().expect("mutex poisoned");
    store.upsert_users(batch);
    store.set_network(network);
    store.persist()?;
    Ok(count)
}

fn rebuild_leaderboard(state: &AppState) {
    let now = now_ms();
    let entries: Vec<LeaderboardEntry> = {
        let ws = state.working_set.lock().expect("mutex poisoned");
        ws.top_by_balance(LEADERBOARD_SIZE)
            .into_iter()
            .enumerate()
            .map(|(i, u)| LeaderboardEntry {
                rank: i + 1,
                id: u.id.clone(),
                username: u.username.clone(),
                balance_nrc: u.balance_nrc,
                hashrate: u.passive_rate,
                level: u.level,
                is_premium: u.is_premium(now),
            })
            .collect()
    };
    state.snapshot.lock().expect("mutex poisoned").leaderboard = entries;
}

fn publish_snapshot(state: &AppState, online_users: usize, now_ms: i64) {
    let network = state.network.lock().expect("mutex poisoned").clone();
    let total_users = state.working_set.lock().expect("mutex poisoned").len();
    let mut snapshot = state.snapshot.lock().expect("mutex poisoned");
    let leaderboard = snapshot.leaderboard.clone();
    *snapshot = TickSnapshot {
        network,
        leaderboard,
        online_users,
        total_users,
        ts_ms: now_ms,
    };
}
