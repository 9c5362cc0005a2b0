use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Extra hashes every account gets per tap before any upgrades.
pub const BASE_CLICK_RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShopCategory {
    Upgrades,
    Miners,
    Farms,
    Store,
}

/// What an item does once it sits in an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectKind {
    /// Adds to the per-tap hash rate.
    Click,
    /// Adds to the passive hash rate.
    Passive,
    /// Passive, but with a network-wide supply cap.
    GlobalLimited,
    /// Not an upgrade at all; handled by the casino endpoint.
    Casino,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Nrc,
    Ton,
}

/// Immutable catalog entry. Sold counters for global-limited items live in
/// the network economy state, not here.
#[derive(Debug, Clone, Serialize)]
pub struct ShopItem {
    pub id: &'static str,
    pub category: ShopCategory,
    pub name: &'static str,
    pub base_cost_nrc: f64,
    pub base_cost_ton: f64,
    pub growth_factor: f64,
    pub effect: EffectKind,
    pub effect_value: f64,
    pub max_level: u32,
    pub global_limit: Option<u32>,
}

impl ShopItem {
    /// Exponential price curve. `None` when the item is not sold for that
    /// currency (a zero base cost would otherwise make it free).
    pub fn price_in(&self, currency: Currency, level: u32) -> Option<f64> {
        let base = match currency {
            Currency::Nrc => self.base_cost_nrc,
            Currency::Ton => self.base_cost_ton,
        };
        if base <= 0.0 {
            return None;
        }
        Some(base * (1.0 + self.growth_factor).powi(level as i32))
    }
}

#[allow(clippy::too_many_arguments)]
fn entry(
    id: &'static str,
    category: ShopCategory,
    name: &'static str,
    base_cost_nrc: f64,
    base_cost_ton: f64,
    growth_factor: f64,
    effect: EffectKind,
    effect_value: f64,
    max_level: u32,
) -> ShopItem {
    ShopItem {
        id,
        category,
        name,
        base_cost_nrc,
        base_cost_ton,
        growth_factor,
        effect,
        effect_value,
        max_level,
        global_limit: None,
    }
}

/// The full purchasable catalog.
pub fn catalog() -> &'static [ShopItem] {
    use EffectKind::*;
    use ShopCategory::*;

    static CATALOG: OnceLock<Vec<ShopItem>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            // Click power
            entry("click_v1", Upgrades, "Click Overclock v1", 5.0, 0.05, 0.18, Click, 10.0, 10),
            entry("click_v2", Upgrades, "Click Overclock v2", 25.0, 0.2, 0.18, Click, 50.0, 10),
            entry("click_v3", Upgrades, "Click Overclock v3", 80.0, 0.5, 0.18, Click, 100.0, 10),
            // Small passive miners
            entry("miner_s1", Miners, "Basic Node", 40.0, 0.4, 0.16, Passive, 100.0, 10),
            entry("miner_s2", Miners, "Pro Node", 200.0, 2.0, 0.16, Passive, 500.0, 10),
            entry("miner_s3", Miners, "Ultra Node", 700.0, 7.0, 0.16, Passive, 1_000_000.0, 10),
            // Big farms, external currency only
            entry("farm_t1", Farms, "Home Farm", 0.0, 8.0, 0.14, Passive, 5_000_000.0, 10),
            entry("farm_t2", Farms, "Garage Rack", 0.0, 18.0, 0.14, Passive, 10_000_000.0, 10),
            entry("farm_t3", Farms, "Industrial Unit", 0.0, 90.0, 0.14, Passive, 50_000_000.0, 10),
            entry("farm_t4", Farms, "Data Center", 0.0, 180.0, 0.14, Passive, 100_000_000.0, 10),
            entry("farm_t5", Farms, "AI Cluster", 0.0, 750.0, 0.14, Passive, 500_000_000.0, 10),
            entry("farm_t6", Farms, "Quantum Nexus", 0.0, 1400.0, 0.14, Passive, 1_000_000_000.0, 10),
            // One network-wide exclusive
            ShopItem {
                global_limit: Some(100),
                ..entry("global_quantum", Store, "Dark Matter PC", 0.0, 900.0, 0.12, GlobalLimited, 1_000_000_000.0, 10)
            },
            // Casino entry ticket; purchases are rejected and routed to the casino
            entry("lucky_spin", Store, "Lucky Spin", 25.0, 0.0, 0.0, Casino, 0.0, 999_999),
        ]
    })
}

pub fn find(id: &str) -> Option<&'static ShopItem> {
    catalog().iter().find(|i| i.id == id)
}

/// Recompute (click, passive) hash rates from an inventory map.
/// This is the only legal source for ledger rate fields; the result depends
/// only on the map contents, never on purchase order.
pub fn derive_rates(inventory: &BTreeMap<String, u32>) -> (f64, f64) {
    let mut click = BASE_CLICK_RATE;
    let mut passive = 0.0;
    for (item_id, level) in inventory {
        let Some(item) = find(item_id) else { continue };
        match item.effect {
            EffectKind::Click => click += item.effect_value * f64::from(*level),
            EffectKind::Passive | EffectKind::GlobalLimited => {
                passive += item.effect_value * f64::from(*level)
            }
            EffectKind::Casino => {}
        }
    }
    (click, passive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_curve_is_exponential() {
        let item = find("click_v1").unwrap();
        let p0 = item.price_in(Currency::Nrc, 0).unwrap();
        let p1 = item.price_in(Currency::Nrc, 1).unwrap();
        assert_eq!(p0, 5.0);
        assert!((p1 - 5.0 * 1.18).abs() < 1e-9);
    }

    #[test]
    fn zero_base_cost_is_not_purchasable() {
        let farm = find("farm_t1").unwrap();
        assert!(farm.price_in(Currency::Nrc, 0).is_none());
        assert!(farm.price_in(Currency::Ton, 0).is_some());
    }

    #[test]
    fn derived_rates_ignore_purchase_order() {
        let mut a = BTreeMap::new();
        a.insert("click_v1".to_string(), 3);
        a.insert("miner_s1".to_string(), 2);
        a.insert("global_quantum".to_string(), 1);

        let mut b = BTreeMap::new();
        b.insert("global_quantum".to_string(), 1);
        b.insert("miner_s1".to_string(), 2);
        b.insert("click_v1".to_string(), 3);

        assert_eq!(derive_rates(&a), derive_rates(&b));
        let (click, passive) = derive_rates(&a);
        assert_eq!(click, 1.0 + 30.0);
        assert_eq!(passive, 200.0 + 1_000_000_000.0);
    }

    #[test]
    fn unknown_items_contribute_nothing() {
        let mut inv = BTreeMap::new();
        inv.insert("deleted_item".to_string(), 5);
        assert_eq!(derive_rates(&inv), (BASE_CLICK_RATE, 0.0));
    }

    #[test]
    fn catalog_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for item in catalog() {
            assert!(seen.insert(item.id), "duplicate item id {}", item.id);
        }
    }
}
