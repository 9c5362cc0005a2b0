use log::{info, warn};

use super::{
    FLOOR_DIFFICULTY, HALVING_INTERVAL, INITIAL_BLOCK_REWARD, MAX_SUPPLY, NetworkEconomyState,
    RETARGET_INTERVAL, TARGET_BLOCK_TIME_MS, difficulty,
};
use crate::store::WorkingSet;

/// Outcome of one block settlement, for events and logging.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub height: u64,
    /// Amount actually minted (block reward, supply-capped).
    pub minted: f64,
    pub contributors: usize,
    /// Sum of the contributor shares consumed by this settlement.
    pub total_shares: f64,
    /// Set when a closer was designated and held pending shares.
    pub closer: Option<String>,
    /// Total credited to contributor balances (shared pool + closer bonus).
    pub distributed: f64,
    /// Total added to the network reward pool.
    pub pool_credit: f64,
    /// Unassigned remainder of the split, logged and dropped.
    pub slippage: f64,
}

/// Settle one block. The caller holds the in-flight settlement guard and the
/// network + working-set locks; everything here is plain sequential state
/// mutation. The minted amount is distributed in full: shared pool by share
/// weight, closer bonus to the crossing user (or the pool when nobody closed
/// the block), fee percentage to the pool.
pub fn settle(
    net: &mut NetworkEconomyState,
    users: &mut WorkingSet,
    closer: Option<&str>,
    now_ms: i64,
) -> Settlement {
    net.block_height += 1;
    let minted = net.block_reward.min((MAX_SUPPLY - net.total_mined).max(0.0));
    net.total_mined += minted;
    net.progress = 0.0;
    net.last_block_ms = now_ms;
    net.blocks_minute_acc += 1.0;
    net.blocks_hour_acc += 1.0;
    net.blocks_day_acc += 1.0;

    // Halving schedule for the next block.
    let halvings = (net.block_height / HALVING_INTERVAL) as i32;
    net.block_reward = INITIAL_BLOCK_REWARD / 2_f64.powi(halvings);

    if net.block_height % RETARGET_INTERVAL == 0 {
        let expected = RETARGET_INTERVAL as i64 * TARGET_BLOCK_TIME_MS;
        let actual = now_ms - net.epoch_start_ms;
        let previous = net.difficulty;
        net.difficulty = difficulty::retarget(previous, actual, expected, FLOOR_DIFFICULTY);
        net.epoch_start_ms = now_ms;
        info!(
            "retarget at height {}: difficulty {} -> {} (epoch took {} ms)",
            net.block_height, previous, net.difficulty, actual
        );
    }

    let contributor_ids = users.ids_with_shares();
    if contributor_ids.is_empty() {
        net.reward_pool += minted;
        info!(
            "block #{} settled with no contributors; {:.4} NRC to pool",
            net.block_height, minted
        );
        return Settlement {
            height: net.block_height,
            minted,
            contributors: 0,
            total_shares: 0.0,
            closer: None,
            distributed: 0.0,
            pool_credit: minted,
            slippage: 0.0,
        };
    }

    let total_shares: f64 = contributor_ids
        .iter()
        .filter_map(|id| users.get(id))
        .map(|u| u.block_shares)
        .sum();

    // Membership requires shares > 0, so this cannot happen; still, never
    // divide by a zero total.
    if total_shares <= 0.0 {
        warn!(
            "block #{}: non-empty contributor set with zero total shares",
            net.block_height
        );
        for id in &contributor_ids {
            if let Some(user) = users.get_mut(id) {
                user.block_shares = 0.0;
            }
        }
        net.reward_pool += minted;
        return Settlement {
            height: net.block_height,
            minted,
            contributors: contributor_ids.len(),
            total_shares: 0.0,
            closer: None,
            distributed: 0.0,
            pool_credit: minted,
            slippage: 0.0,
        };
    }

    let closer_bonus = minted * net.split.closer_pct;
    let shared_pool = minted * net.split.shared_pct;
    let fee = minted * net.split.fee_pct;
    let slippage = minted * net.split.remainder();
    if slippage > 0.0 {
        warn!(
            "block #{}: {:.6} NRC of reward unassigned by the configured split",
            net.block_height, slippage
        );
    }

    let mut distributed = 0.0;
    let mut closer_credited: Option<String> = None;
    for id in &contributor_ids {
        let Some(user) = users.get_mut(id) else {
            continue;
        };
        let credit = shared_pool * (user.block_shares / total_shares);
        user.balance_nrc += credit;
        distributed += credit;
        if closer == Some(id.as_str()) {
            user.balance_nrc += closer_bonus;
            user.blocks_mined += 1;
            distributed += closer_bonus;
            closer_credited = Some(id.clone());
        }
        user.block_shares = 0.0;
    }

    // No closer (passive tick crossing) or the closer held no shares: the
    // bonus goes to the pool rather than vanishing.
    let mut pool_credit = fee;
    if closer_credited.is_none() {
        net.reward_pool += closer_bonus;
        pool_credit += closer_bonus;
    }
    net.reward_pool += fee;

    info!(
        "block #{} settled: minted {:.4}, {} contributors, closer {:?}, distributed {:.4}, pool +{:.4}",
        net.block_height,
        minted,
        contributor_ids.len(),
        closer_credited,
        distributed,
        pool_credit
    );

    Settlement {
        height: net.block_height,
        minted,
        contributors: contributor_ids.len(),
        total_shares,
        closer: closer_credited,
        distributed,
        pool_credit,
        slippage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::UserLedger;

    fn network() -> NetworkEconomyState {
        let mut net = NetworkEconomyState::bootstrap(0, 10_000.0);
        net.epoch_start_ms = 0;
        net
    }

    fn miner(id: &str, shares: f64) -> UserLedger {
        let mut u = UserLedger::new(id, id, 0);
        u.block_shares = shares;
        u
    }

    #[test]
    fn single_closer_takes_bonus_and_full_shared_pool() {
        let mut net = network();
        let mut ws = WorkingSet::new();
        ws.hydrate(miner("alice", 10_000.0));

        let outcome = settle(&mut net, &mut ws, Some("alice"), 1_000);

        let alice = ws.get("alice").unwrap();
        // 50 * 0.7 + 50 * 0.2 * (10000/10000)
        assert!((alice.balance_nrc - 45.0).abs() < 1e-9);
        assert_eq!(alice.block_shares, 0.0);
        assert_eq!(alice.blocks_mined, 1);
        assert!((net.reward_pool - 5.0).abs() < 1e-9);
        assert_eq!(net.block_height, 2);
        assert_eq!(net.progress, 0.0);
        assert_eq!(outcome.closer.as_deref(), Some("alice"));
        assert!((outcome.distributed + outcome.pool_credit - 50.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_split_without_closer_sends_bonus_to_pool() {
        let mut net = network();
        let mut ws = WorkingSet::new();
        ws.hydrate(miner("a", 3_000.0));
        ws.hydrate(miner("b", 7_000.0));

        let outcome = settle(&mut net, &mut ws, None, 1_000);

        let shared = 50.0 * 0.2;
        assert!((ws.get("a").unwrap().balance_nrc - shared * 0.3).abs() < 1e-9);
        assert!((ws.get("b").unwrap().balance_nrc - shared * 0.7).abs() < 1e-9);
        assert_eq!(ws.get("a").unwrap().blocks_mined, 0);
        assert_eq!(ws.get("b").unwrap().blocks_mined, 0);
        // Fee (5) plus the unassigned closer bonus (35).
        assert!((net.reward_pool - 40.0).abs() < 1e-9);
        assert!(outcome.closer.is_none());
        assert!((outcome.distributed + outcome.pool_credit - 50.0).abs() < 1e-9);
    }

    #[test]
    fn credits_reconcile_with_minted_reward() {
        let mut net = network();
        let mut ws = WorkingSet::new();
        for (i, shares) in [123.0, 999.5, 1.0, 40_000.0].iter().enumerate() {
            ws.hydrate(miner(&format!("u{i}"), *shares));
        }

        let outcome = settle(&mut net, &mut ws, Some("u3"), 1_000);
        let credited: f64 = ws.iter().map(|u| u.balance_nrc).sum();
        assert!((credited + outcome.pool_credit - outcome.minted).abs() < 1e-9);
        assert!((outcome.total_shares - 41_123.5).abs() < 1e-9);
        for u in ws.iter() {
            assert_eq!(u.block_shares, 0.0);
        }
    }

    #[test]
    fn empty_contributor_set_sends_reward_to_pool() {
        let mut net = network();
        let mut ws = WorkingSet::new();
        let outcome = settle(&mut net, &mut ws, None, 1_000);
        assert_eq!(outcome.contributors, 0);
        assert!((net.reward_pool - 50.0).abs() < 1e-9);
        assert_eq!(net.block_height, 2);
    }

    #[test]
    fn closer_without_shares_forfeits_bonus_to_pool() {
        let mut net = network();
        let mut ws = WorkingSet::new();
        ws.hydrate(miner("a", 100.0));
        ws.hydrate(miner("ghost", 0.0));

        let outcome = settle(&mut net, &mut ws, Some("ghost"), 1_000);
        assert!(outcome.closer.is_none());
        assert_eq!(ws.get("ghost").unwrap().blocks_mined, 0);
        // Fee 5 + forfeited bonus 35.
        assert!((net.reward_pool - 40.0).abs() < 1e-9);
    }

    #[test]
    fn split_remainder_is_dropped_as_slippage() {
        let mut net = network();
        net.split.closer_pct = 0.5; // 0.2 of the reward now unassigned
        let mut ws = WorkingSet::new();
        ws.hydrate(miner("a", 10.0));

        let outcome = settle(&mut net, &mut ws, Some("a"), 1_000);
        assert!((outcome.slippage - 10.0).abs() < 1e-9);
        assert!(
            (outcome.distributed + outcome.pool_credit + outcome.slippage - outcome.minted).abs()
                < 1e-9
        );
    }

    #[test]
    fn reward_halves_on_schedule() {
        let mut net = network();
        net.block_height = HALVING_INTERVAL - 1;
        let mut ws = WorkingSet::new();
        settle(&mut net, &mut ws, None, 1_000);
        assert_eq!(net.block_height, HALVING_INTERVAL);
        assert_eq!(net.block_reward, INITIAL_BLOCK_REWARD / 2.0);

        net.block_height = 2 * HALVING_INTERVAL - 1;
        settle(&mut net, &mut ws, None, 2_000);
        assert_eq!(net.block_reward, INITIAL_BLOCK_REWARD / 4.0);
    }

    #[test]
    fn retarget_fires_only_on_interval_boundary() {
        let mut net = network();
        net.block_height = RETARGET_INTERVAL - 2;
        net.difficulty = 10_000.0;
        let mut ws = WorkingSet::new();

        // Height becomes RETARGET_INTERVAL - 1: no retarget.
        settle(&mut net, &mut ws, None, 1_000);
        assert_eq!(net.difficulty, 10_000.0);
        assert_eq!(net.epoch_start_ms, 0);

        // Height hits the boundary with an instant epoch: clamp to 4x.
        settle(&mut net, &mut ws, None, 2_000);
        assert_eq!(net.difficulty, 40_000.0);
        assert_eq!(net.epoch_start_ms, 2_000);
    }

    #[test]
    fn minting_stops_at_the_supply_cap() {
        let mut net = network();
        net.total_mined = MAX_SUPPLY - 10.0;
        let mut ws = WorkingSet::new();
        ws.hydrate(miner("a", 5.0));

        let outcome = settle(&mut net, &mut ws, Some("a"), 1_000);
        assert!((outcome.minted - 10.0).abs() < 1e-9);
        assert!((net.total_mined - MAX_SUPPLY).abs() < 1e-9);

        ws.get_mut("a").unwrap().block_shares = 5.0;
        let outcome = settle(&mut net, &mut ws, Some("a"), 2_000);
        assert_eq!(outcome.minted, 0.0);
        assert!((net.total_mined - MAX_SUPPLY).abs() < 1e-9);
    }
}
