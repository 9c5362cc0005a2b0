use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog;

/// Energy ceiling for a fresh account.
pub const INITIAL_MAX_ENERGY: f64 = 2_000.0;

/// Per-player economic state. Owned by the durable store; the working set
/// holds the live projection. `click_rate` and `passive_rate` are derived
/// from `inventory` and must only be written through `recompute_rates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserLedger {
    pub id: String,
    pub username: String,
    pub balance_nrc: f64,
    pub balance_ton: f64,
    pub energy: f64,
    pub max_energy: f64,
    pub click_rate: f64,
    pub passive_rate: f64,
    pub level: u32,
    pub xp: f64,
    /// Contribution toward the current block; reset to 0 on every settlement.
    pub block_shares: f64,
    pub blocks_mined: u64,
    pub last_sync_ms: i64,
    /// item id -> purchased level (sparse, monotonically non-decreasing).
    pub inventory: BTreeMap<String, u32>,
    pub premium_expiry_ms: Option<i64>,
    /// Consumed top-up proofs; the next proof must sign this sequence number.
    pub topup_count: u64,
    pub last_daily_claim_ms: Option<i64>,
    pub completed_tasks: BTreeSet<String>,
    pub referrals: u32,
    pub referral_earnings: f64,
    pub themes: Vec<String>,
}

impl Default for UserLedger {
    fn default() -> Self {
        Self {
            id: String::new(),
            username: String::new(),
            balance_nrc: 0.0,
            balance_ton: 0.0,
            energy: INITIAL_MAX_ENERGY,
            max_energy: INITIAL_MAX_ENERGY,
            click_rate: catalog::BASE_CLICK_RATE,
            passive_rate: 0.0,
            level: 1,
            xp: 0.0,
            block_shares: 0.0,
            blocks_mined: 0,
            last_sync_ms: 0,
            inventory: BTreeMap::new(),
            premium_expiry_ms: None,
            topup_count: 0,
            last_daily_claim_ms: None,
            completed_tasks: BTreeSet::new(),
            referrals: 0,
            referral_earnings: 0.0,
            themes: vec!["NEON".to_string()],
        }
    }
}

impl UserLedger {
    pub fn new(id: impl Into<String>, username: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            last_sync_ms: now_ms,
            ..Self::default()
        }
    }

    /// Fold elapsed wall-clock time into the ledger: energy regen (clamped to
    /// [0, max_energy]) plus passive share/xp accrual. The only place passive
    /// hashes land; also used for lazy catch-up on reconnect.
    pub fn apply_elapsed(&mut self, now_ms: i64, regen_rate: f64) {
        if now_ms <= self.last_sync_ms {
            return;
        }
        let elapsed = (now_ms - self.last_sync_ms) as f64 / 1_000.0;

        self.energy = (self.energy + regen_rate * elapsed).clamp(0.0, self.max_energy);
        let accrued = self.passive_rate * elapsed;
        if accrued > 0.0 {
            self.block_shares += accrued;
            self.xp += accrued;
            self.level = self.level.max(level_from_xp(self.xp));
        }
        self.last_sync_ms = now_ms;
    }

    /// One manual tap: spends 1 energy, contributes the click rate to the
    /// pending block shares. Returns the contributed hashes.
    pub fn tap(&mut self) -> Result<f64, &'static str> {
        if self.energy < 1.0 {
            return Err("not enough energy");
        }
        self.energy -= 1.0;
        self.block_shares += self.click_rate;
        self.xp += self.click_rate;
        self.level = self.level.max(level_from_xp(self.xp));
        Ok(self.click_rate)
    }

    /// Re-derive both hash rates from the inventory. Returns the change in
    /// passive rate so callers can keep the network aggregate incremental.
    pub fn recompute_rates(&mut self) -> f64 {
        let old_passive = self.passive_rate;
        let (click, passive) = catalog::derive_rates(&self.inventory);
        self.click_rate = click;
        self.passive_rate = passive;
        passive - old_passive
    }

    pub fn item_level(&self, item_id: &str) -> u32 {
        self.inventory.get(item_id).copied().unwrap_or(0)
    }

    pub fn is_premium(&self, now_ms: i64) -> bool {
        self.premium_expiry_ms.is_some_and(|exp| exp > now_ms)
    }
}

/// Level curve: 500·(L−1)² xp up to level 100, cubed up to 1000, fourth
/// power beyond.
pub fn level_from_xp(xp: f64) -> u32 {
    const BASE: f64 = 500.0;
    if xp < BASE {
        return 1;
    }
    let level = (xp / BASE).sqrt() as u32 + 1;
    if level < 100 {
        return level;
    }
    let level = (xp / BASE).cbrt() as u32 + 1;
    if level < 1_000 {
        return level;
    }
    (xp / BASE).powf(0.25) as u32 + 1
}
