use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{FLOOR_DIFFICULTY, INITIAL_BLOCK_REWARD};

/// How each minted block splits between the closer bonus, the pool shared by
/// all contributors and the network fee pool. Validated once at configuration
/// time; the engine never assumes the parts sum to exactly 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RewardSplit {
    pub closer_pct: f64,
    pub shared_pct: f64,
    pub fee_pct: f64,
}

impl Default for RewardSplit {
    fn default() -> Self {
        Self {
            closer_pct: 0.70,
            shared_pct: 0.20,
            fee_pct: 0.10,
        }
    }
}

impl RewardSplit {
    pub fn validate(&self) -> Result<(), &'static str> {
        let parts = [self.closer_pct, self.shared_pct, self.fee_pct];
        if parts.iter().any(|p| !(0.0..=1.0).contains(p) || !p.is_finite()) {
            return Err("reward split percentages must be within [0, 1]");
        }
        if parts.iter().sum::<f64>() > 1.0 + 1e-9 {
            return Err("reward split percentages must sum to at most 1");
        }
        Ok(())
    }

    /// Unassigned fraction of the reward (fee slippage when the parts sum
    /// below 1).
    pub fn remainder(&self) -> f64 {
        (1.0 - self.closer_pct - self.shared_pct - self.fee_pct).max(0.0)
    }
}

/// Fixed-length circular buffers backing the network charts: one sample per
/// minute over an hour, per hour over a day, per day over a week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySeries {
    pub minute: Vec<f64>,
    pub hour: Vec<f64>,
    pub day: Vec<f64>,
    minute_pos: usize,
    hour_pos: usize,
    day_pos: usize,
}

impl Default for HistorySeries {
    fn default() -> Self {
        Self {
            minute: vec![0.0; 60],
            hour: vec![0.0; 24],
            day: vec![0.0; 7],
            minute_pos: 0,
            hour_pos: 0,
            day_pos: 0,
        }
    }
}

impl HistorySeries {
    pub fn record_minute(&mut self, value: f64) {
        self.minute[self.minute_pos] = value;
        self.minute_pos = (self.minute_pos + 1) % self.minute.len();
    }

    pub fn record_hour(&mut self, value: f64) {
        self.hour[self.hour_pos] = value;
        self.hour_pos = (self.hour_pos + 1) % self.hour.len();
    }

    pub fn record_day(&mut self, value: f64) {
        self.day[self.day_pos] = value;
        self.day_pos = (self.day_pos + 1) % self.day.len();
    }
}

/// Singleton global mining state. Created once at first boot, owned by the
/// application state and mutated only under its mutex by the tick loop, the
/// settlement path and the admin tuning application point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkEconomyState {
    /// Monotonic, starts at 1.
    pub block_height: u64,
    pub block_reward: f64,
    pub difficulty: f64,
    /// 0 <= progress < difficulty between settlements.
    pub progress: f64,
    /// Sum of every known user's passive rate, online or not. Maintained
    /// incrementally on purchase, never recomputed per tick.
    pub network_hash_rate: f64,
    pub last_block_ms: i64,
    pub epoch_start_ms: i64,
    /// Cumulative minted supply, capped at MAX_SUPPLY.
    pub total_mined: f64,
    pub reward_pool: f64,
    pub total_users: u64,
    pub split: RewardSplit,
    pub daily_bonus: f64,
    pub casino_jackpot: f64,
    pub jackpot_feed_rate: f64,
    /// Chance that a winning spin additionally takes the jackpot.
    pub jackpot_hit_rate: f64,
    pub slot_win_rate: f64,
    pub lottery_win_rate: f64,
    /// Sold counters for global-limited catalog items.
    pub global_sold: BTreeMap<String, u32>,
    pub hashrate_history: HistorySeries,
    pub blocks_history: HistorySeries,
    /// Blocks settled since the last minute/hour/day history sample.
    pub blocks_minute_acc: f64,
    pub blocks_hour_acc: f64,
    pub blocks_day_acc: f64,
}

impl Default for NetworkEconomyState {
    fn default() -> Self {
        Self {
            block_height: 1,
            block_reward: INITIAL_BLOCK_REWARD,
            difficulty: 10_000.0_f64.max(FLOOR_DIFFICULTY),
            progress: 0.0,
            network_hash_rate: 0.0,
            last_block_ms: 0,
            epoch_start_ms: 0,
            total_mined: 0.0,
            reward_pool: 0.0,
            total_users: 0,
            split: RewardSplit::default(),
            daily_bonus: 100.0,
            casino_jackpot: 1_000.0,
            jackpot_feed_rate: 0.05,
            jackpot_hit_rate: 0.001,
            slot_win_rate: 0.35,
            lottery_win_rate: 0.30,
            global_sold: BTreeMap::new(),
            hashrate_history: HistorySeries::default(),
            blocks_history: HistorySeries::default(),
            blocks_minute_acc: 0.0,
            blocks_hour_acc: 0.0,
            blocks_day_acc: 0.0,
        }
    }
}

impl NetworkEconomyState {
    /// Fresh state for a first boot.
    pub fn bootstrap(now_ms: i64, difficulty: f64) -> Self {
        Self {
            difficulty: difficulty.max(FLOOR_DIFFICULTY),
            last_block_ms: now_ms,
            epoch_start_ms: now_ms,
            ..Self::default()
        }
    }

    pub fn sold_count(&self, item_id: &str) -> u32 {
        self.global_sold.get(item_id).copied().unwrap_or(0)
    }

    /// Push the current hash rate and the block counters into the rings.
    pub fn sample_minute(&mut self) {
        self.hashrate_history.record_minute(self.network_hash_rate);
        self.blocks_history.record_minute(self.blocks_minute_acc);
        self.blocks_minute_acc = 0.0;
    }

    pub fn sample_hour(&mut self) {
        self.hashrate_history.record_hour(self.network_hash_rate);
        self.blocks_history.record_hour(self.blocks_hour_acc);
        self.blocks_hour_acc = 0.0;
    }

    pub fn sample_day(&mut self) {
        self.hashrate_history.record_day(self.network_hash_rate);
        self.blocks_history.record_day(self.blocks_day_acc);
        self.blocks_day_acc = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_split_is_valid() {
        RewardSplit::default().validate().unwrap();
        assert!(RewardSplit::default().remainder().abs() < 1e-12);
    }

    #[test]
    fn split_summing_above_one_is_rejected() {
        let split = RewardSplit {
            closer_pct: 0.7,
            shared_pct: 0.2,
            fee_pct: 0.2,
        };
        assert!(split.validate().is_err());
    }

    #[test]
    fn split_summing_below_one_is_allowed_with_remainder() {
        let split = RewardSplit {
            closer_pct: 0.5,
            shared_pct: 0.2,
            fee_pct: 0.1,
        };
        split.validate().unwrap();
        assert!((split.remainder() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn history_ring_wraps_around() {
        let mut h = HistorySeries::default();
        for i in 0..61 {
            h.record_minute(i as f64);
        }
        // Slot 0 was overwritten by the 61st sample.
        assert_eq!(h.minute[0], 60.0);
        assert_eq!(h.minute[1], 1.0);
        assert_eq!(h.minute.len(), 60);
    }
}
