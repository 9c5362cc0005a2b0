pub mod difficulty;
pub mod ledger;
pub mod network;
pub mod settlement;

pub use ledger::UserLedger;
pub use network::{NetworkEconomyState, RewardSplit};

/// Target milliseconds between blocks (6 minutes).
pub const TARGET_BLOCK_TIME_MS: i64 = 6 * 60 * 1000;

/// Blocks between difficulty retargets.
pub const RETARGET_INTERVAL: u64 = 1_300;

/// Blocks between reward halvings.
pub const HALVING_INTERVAL: u64 = 130_000;

/// Subsidy minted by the first block.
pub const INITIAL_BLOCK_REWARD: f64 = 50.0;

/// Difficulty never retargets below this.
pub const FLOOR_DIFFICULTY: f64 = 1_000.0;

/// Hard cap on cumulative minted NRC.
pub const MAX_SUPPLY: f64 = 13_000_000.0;

/// Energy points regenerated per second.
pub const ENERGY_REGEN_RATE: f64 = 2.0;
