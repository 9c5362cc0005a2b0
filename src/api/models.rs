use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;

use crate::casino::{Game, SpinOutcome};
use crate::catalog::Currency;
use crate::config::EngineConfig;
use crate::economy::{FLOOR_DIFFICULTY, NetworkEconomyState, RewardSplit, UserLedger};
use crate::store::{JsonStore, WorkingSet};

/// Shared application state: the network economy singleton, the working set,
/// the durable store and the session table, each behind its own mutex. Lock
/// acquisition order is network -> working set -> store.
pub struct AppState {
    pub config: EngineConfig,
    pub network: Mutex<NetworkEconomyState>,
    pub working_set: Mutex<WorkingSet>,
    pub store: Mutex<JsonStore>,
    pub sessions: Mutex<HashMap<String, Session>>,
    pub tasks: Mutex<Vec<Task>>,
    pub snapshot: Mutex<TickSnapshot>,
    pub events: Mutex<EventLog>,
    /// Admin tuning queued here is applied atomically at the next tick.
    pub pending_tuning: Mutex<Option<EconomyTuning>>,
    /// Guards block settlement; a losing compare-exchange defers.
    pub settling: AtomicBool,
}

impl AppState {
    /// Boot-time synchronization: open the durable store (fatal on error),
    /// rebuild the working set with rates re-derived from inventory, and
    /// recompute the network hash rate as the sum over all users.
    pub fn bootstrap(config: EngineConfig, now_ms: i64) -> io::Result<Self> {
        let store = JsonStore::open(&config.store_path)?;

        let mut network = match store.network() {
            Some(net) => net.clone(),
            None => {
                let mut net = NetworkEconomyState::bootstrap(now_ms, config.initial_difficulty);
                net.split = config.split;
                net
            }
        };

        let mut working_set = WorkingSet::new();
        for stored in store.users() {
            let mut ledger = stored.clone();
            // Stored rates are derived data; never trust them across restarts.
            ledger.recompute_rates();
            working_set.hydrate(ledger);
        }
        network.network_hash_rate = working_set.total_passive_rate();
        network.total_users = working_set.len() as u64;
        if network.epoch_start_ms <= 0 {
            network.epoch_start_ms = now_ms;
        }

        let snapshot = TickSnapshot {
            network: network.clone(),
            leaderboard: Vec::new(),
            online_users: 0,
            total_users: working_set.len(),
            ts_ms: now_ms,
        };

        Ok(Self {
            config,
            network: Mutex::new(network),
            working_set: Mutex::new(working_set),
            store: Mutex::new(store),
            sessions: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            snapshot: Mutex::new(snapshot),
            events: Mutex::new(EventLog::default()),
            pending_tuning: Mutex::new(None),
            settling: AtomicBool::new(false),
        })
    }
}

/// One live connection, keyed by its opaque token.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub last_seen_ms: i64,
}

/* ---------- Broadcast surface ---------- */

/// Published once per tick; served verbatim by the network endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TickSnapshot {
    pub network: NetworkEconomyState,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub online_users: usize,
    pub total_users: usize,
    pub ts_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: String,
    pub username: String,
    pub balance_nrc: f64,
    pub hashrate: f64,
    pub level: u32,
    pub is_premium: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    BlockFound {
        height: u64,
        reward: f64,
        closer: Option<String>,
    },
}

/// Bounded, sequence-numbered event log clients poll with a cursor.
#[derive(Debug, Default)]
pub struct EventLog {
    next_seq: u64,
    entries: VecDeque<(u64, EngineEvent)>,
}

impl EventLog {
    const CAPACITY: usize = 256;

    pub fn push(&mut self, event: EngineEvent) {
        self.entries.push_back((self.next_seq, event));
        self.next_seq += 1;
        while self.entries.len() > Self::CAPACITY {
            self.entries.pop_front();
        }
    }

    /// Events at or after `since`, plus the cursor for the next poll.
    pub fn since(&self, since: u64) -> (Vec<SequencedEvent>, u64) {
        let events = self
            .entries
            .iter()
            .filter(|(seq, _)| *seq >= since)
            .map(|(seq, event)| SequencedEvent {
                seq: *seq,
                event: event.clone(),
            })
            .collect();
        (events, self.next_seq)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SequencedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: EngineEvent,
}

/* ---------- Earn surface ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Social,
    Daily,
    Partner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub kind: TaskKind,
    pub reward: f64,
    pub link: Option<String>,
}

/* ---------- Session API models ---------- */

#[derive(Deserialize)]
pub struct ConnectRequest {
    pub user_id: String,
    pub username: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub token: String,
    pub ledger: UserLedger,
    pub snapshot: TickSnapshot,
    pub tasks: Vec<Task>,
}

#[derive(Deserialize)]
pub struct ActionEnvelope {
    pub token: String,
    #[serde(flatten)]
    pub action: Action,
}

/// The closed set of client actions.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Tap,
    BuyItem {
        item_id: String,
        currency: Currency,
    },
    BuyItemExternal {
        item_id: String,
        proof: String,
    },
    BuyPremium {
        proof: String,
    },
    TopUpTon {
        amount_nano: u64,
        proof: String,
    },
    ClaimDaily,
    CompleteTask {
        task_id: String,
    },
    CasinoSpin {
        game: Game,
        bet: f64,
        currency: Currency,
    },
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub ledger: UserLedger,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_found: Option<BlockFoundNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spin: Option<SpinOutcome>,
}

#[derive(Debug, Serialize)]
pub struct BlockFoundNote {
    pub height: u64,
    pub reward: f64,
}

/* ---------- Stats / admin models ---------- */

#[derive(Serialize)]
pub struct StatsResponse {
    pub block_height: u64,
    pub block_reward: f64,
    pub difficulty: f64,
    pub progress: f64,
    pub network_hash_rate: f64,
    pub total_mined: f64,
    pub reward_pool: f64,
    pub total_users: usize,
    pub online_users: usize,
    pub epoch_age_ms: i64,
    pub last_block_age_ms: i64,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

/// Versioned tuning snapshot queued by the admin surface and applied between
/// ticks, never during one. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EconomyTuning {
    pub closer_pct: Option<f64>,
    pub shared_pct: Option<f64>,
    pub fee_pct: Option<f64>,
    pub difficulty: Option<f64>,
    pub daily_bonus: Option<f64>,
    pub slot_win_rate: Option<f64>,
    pub lottery_win_rate: Option<f64>,
    pub jackpot_feed_rate: Option<f64>,
    pub jackpot_hit_rate: Option<f64>,
    pub jackpot_seed: Option<f64>,
}

impl EconomyTuning {
    /// Validate against the current state, then apply the whole snapshot.
    pub fn apply_to(&self, net: &mut NetworkEconomyState) -> Result<(), &'static str> {
        let split = RewardSplit {
            closer_pct: self.closer_pct.unwrap_or(net.split.closer_pct),
            shared_pct: self.shared_pct.unwrap_or(net.split.shared_pct),
            fee_pct: self.fee_pct.unwrap_or(net.split.fee_pct),
        };
        split.validate()?;
        if let Some(d) = self.difficulty {
            if !d.is_finite() || d < FLOOR_DIFFICULTY {
                return Err("difficulty below the network floor");
            }
            net.difficulty = d;
        }
        net.split = split;
        if let Some(v) = self.daily_bonus {
            net.daily_bonus = v.max(0.0);
        }
        if let Some(v) = self.slot_win_rate {
            net.slot_win_rate = v.clamp(0.0, 1.0);
        }
        if let Some(v) = self.lottery_win_rate {
            net.lottery_win_rate = v.clamp(0.0, 1.0);
        }
        if let Some(v) = self.jackpot_feed_rate {
            net.jackpot_feed_rate = v.clamp(0.0, 1.0);
        }
        if let Some(v) = self.jackpot_hit_rate {
            net.jackpot_hit_rate = v.clamp(0.0, 1.0);
        }
        if let Some(v) = self.jackpot_seed {
            net.casino_jackpot = v.max(0.0);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct CreditRequest {
    pub user_id: String,
    pub amount: f64,
    pub currency: Currency,
}
