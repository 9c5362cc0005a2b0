use std::collections::{HashMap, HashSet};

use crate::economy::UserLedger;

/// Fast in-memory projection of every known ledger, plus the set of entries
/// mutated since the last flush. Authoritative tier for the hot path and for
/// settlement-time shares; the durable store is a replica rewritten on flush.
#[derive(Debug, Default)]
pub struct WorkingSet {
    users: HashMap<String, UserLedger>,
    dirty: HashSet<String>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry at boot without marking it dirty.
    pub fn hydrate(&mut self, ledger: UserLedger) {
        self.users.insert(ledger.id.clone(), ledger);
    }

    /// Insert a fresh entry; it is dirty until flushed.
    pub fn insert(&mut self, ledger: UserLedger) {
        self.dirty.insert(ledger.id.clone());
        self.users.insert(ledger.id.clone(), ledger);
    }

    pub fn get(&self, id: &str) -> Option<&UserLedger> {
        self.users.get(id)
    }

    /// Mutable access marks the entry dirty for the next flush.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut UserLedger> {
        let ledger = self.users.get_mut(id)?;
        self.dirty.insert(id.to_string());
        Some(ledger)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserLedger> {
        self.users.values()
    }

    /// The contributor scan: every ledger with pending shares.
    pub fn ids_with_shares(&self) -> Vec<String> {
        self.users
            .values()
            .filter(|u| u.block_shares > 0.0)
            .map(|u| u.id.clone())
            .collect()
    }

    /// Sum of all passive rates (offline users included).
    pub fn total_passive_rate(&self) -> f64 {
        self.users.values().map(|u| u.passive_rate).sum()
    }

    /// Drain the dirty set, returning clones of the entries to flush.
    pub fn take_dirty(&mut self) -> Vec<UserLedger> {
        let ids: Vec<String> = self.dirty.drain().collect();
        ids.into_iter()
            .filter_map(|id| self.users.get(&id).cloned())
            .collect()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Top `n` ledgers by NRC balance, descending.
    pub fn top_by_balance(&self, n: usize) -> Vec<&UserLedger> {
        let mut all: Vec<&UserLedger> = self.users.values().collect();
        all.sort_by(|a, b| {
            b.balance_nrc
                .partial_cmp(&a.balance_nrc)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        all.truncate(n);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, balance: f64, shares: f64) -> UserLedger {
        let mut u = UserLedger::new(id, id, 0);
        u.balance_nrc = balance;
        u.block_shares = shares;
        u
    }

    #[test]
    fn hydrate_does_not_mark_dirty_but_mutation_does() {
        let mut ws = WorkingSet::new();
        ws.hydrate(user("a", 0.0, 0.0));
        assert_eq!(ws.dirty_count(), 0);

        ws.get_mut("a").unwrap().balance_nrc = 5.0;
        assert_eq!(ws.dirty_count(), 1);

        let flushed = ws.take_dirty();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].balance_nrc, 5.0);
        assert_eq!(ws.dirty_count(), 0);
    }

    #[test]
    fn contributor_scan_requires_positive_shares() {
        let mut ws = WorkingSet::new();
        ws.hydrate(user("a", 0.0, 10.0));
        ws.hydrate(user("b", 0.0, 0.0));
        let ids = ws.ids_with_shares();
        assert_eq!(ids, vec!["a".to_string()]);
    }

    #[test]
    fn leaderboard_orders_by_balance_desc() {
        let mut ws = WorkingSet::new();
        ws.hydrate(user("a", 10.0, 0.0));
        ws.hydrate(user("b", 30.0, 0.0));
        ws.hydrate(user("c", 20.0, 0.0));
        let top: Vec<&str> = ws.top_by_balance(2).iter().map(|u| u.id.as_str()).collect();
        assert_eq!(top, vec!["b", "c"]);
    }
}
