//! Tunables for the economy engine: outcome weights, cooldowns, cost curves, catalogs.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::economy::types::{BuffKind, Rarity};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EconomyConfig {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub play: PlayConfig,
    #[serde(default)]
    pub rob: RobConfig,
    #[serde(default)]
    pub bail: BailConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub crates: CrateConfig,
    #[serde(default)]
    pub shop: ShopConfig,
    #[serde(default)]
    pub mission: MissionConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub factions: FactionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub starting_wealth: u64,
    pub base_hp: u32,
    pub hp_per_level: u32,
    /// Level `n` needs `xp_curve * n * (n - 1)` experience.
    pub xp_curve: u64,
    pub max_level: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            starting_wealth: 100,
            base_hp: 100,
            hp_per_level: 10,
            xp_curve: 50,
            max_level: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    pub cooldown_secs: i64,
    pub win_weight: f64,
    pub bust_weight: f64,
    pub win_min: u64,
    pub win_max: u64,
    /// Extra coins per player level added to every win.
    pub win_per_level: u64,
    pub win_xp: u64,
    pub bust_xp: u64,
    /// Share of wealth lost on a bust, in basis points.
    pub bust_loss_bps: u32,
    pub bust_jail_chance: f64,
    pub bust_jail_secs: i64,
    /// Win payout percentage when a bonus token is spent.
    pub token_multiplier_pct: u32,
    pub token_xp_bonus: u64,
    /// Win weight bonus per tier of an active luck buff.
    pub luck_per_tier_pct: u32,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            win_weight: 0.55,
            bust_weight: 0.45,
            win_min: 10,
            win_max: 50,
            win_per_level: 2,
            win_xp: 10,
            bust_xp: 2,
            bust_loss_bps: 500,
            bust_jail_chance: 0.1,
            bust_jail_secs: 600,
            token_multiplier_pct: 200,
            token_xp_bonus: 10,
            luck_per_tier_pct: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobConfig {
    pub cooldown_secs: i64,
    pub success_weight: f64,
    pub failure_weight: f64,
    pub base_offense: u32,
    pub base_defense: u32,
    pub min_steal_bps: u32,
    pub max_steal_bps: u32,
    /// Absolute cap on a single theft.
    pub max_steal: Option<u64>,
    pub min_target_wealth: u64,
    /// Fine paid by a failed robber to the defender, in basis points of the robber's wealth.
    pub fail_fine_bps: u32,
    pub fail_jail_chance: f64,
    pub fail_hp_damage: u32,
    pub success_xp: u64,
    pub jail_base_secs: i64,
    pub jail_per_level_secs: i64,
    pub jail_max_secs: i64,
    pub stealth_per_tier_pct: u32,
    pub guard_per_tier: u32,
}

impl Default for RobConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 900,
            success_weight: 0.45,
            failure_weight: 0.55,
            base_offense: 5,
            base_defense: 5,
            min_steal_bps: 500,
            max_steal_bps: 2000,
            max_steal: None,
            min_target_wealth: 10,
            fail_fine_bps: 500,
            fail_jail_chance: 0.35,
            fail_hp_damage: 25,
            success_xp: 15,
            jail_base_secs: 600,
            jail_per_level_secs: 60,
            jail_max_secs: 3600,
            stealth_per_tier_pct: 10,
            guard_per_tier: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BailConfig {
    pub cost_bps: u32,
    pub min_cost: u64,
}

impl Default for BailConfig {
    fn default() -> Self {
        Self {
            cost_bps: 1000,
            min_cost: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub base_cost: u64,
    /// Growth rate applied per conversion already made today, as a fraction.
    pub growth_numerator: u32,
    pub growth_denominator: u32,
    pub daily_cap: u32,
    pub tokens_per_conversion: u64,
    /// Offset from UTC (minutes) of the local day boundary that resets the counter.
    pub day_offset_minutes: i32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            base_cost: 100,
            growth_numerator: 11,
            growth_denominator: 10,
            daily_cap: 50,
            tokens_per_conversion: 1,
            day_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootItem {
    pub item_id: String,
    pub name: String,
    #[serde(default)]
    pub attack: u32,
    #[serde(default)]
    pub defense: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrateTier {
    pub rarity: Rarity,
    pub weight: f64,
    pub coins_min: u64,
    pub coins_max: u64,
    /// Chance that a drop of this tier is an item instead of coins.
    #[serde(default)]
    pub item_chance: f64,
    #[serde(default)]
    pub items: Vec<LootItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrateConfig {
    pub max_batch: u32,
    pub tiers: Vec<CrateTier>,
}

impl Default for CrateConfig {
    fn default() -> Self {
        let tier = |rarity, weight, coins_min, coins_max, item_chance, items: Vec<LootItem>| {
            CrateTier {
                rarity,
                weight,
                coins_min,
                coins_max,
                item_chance,
                items,
            }
        };
        let item = |id: &str, name: &str, attack, defense| LootItem {
            item_id: id.to_string(),
            name: name.to_string(),
            attack,
            defense,
        };
        Self {
            max_batch: 25,
            tiers: vec![
                tier(Rarity::Common, 60.0, 5, 25, 0.0, Vec::new()),
                tier(
                    Rarity::Uncommon,
                    25.0,
                    20,
                    60,
                    0.3,
                    vec![item("crowbar", "Crowbar", 2, 0)],
                ),
                tier(
                    Rarity::Rare,
                    10.0,
                    50,
                    150,
                    0.5,
                    vec![item("kevlar_vest", "Kevlar Vest", 0, 4)],
                ),
                tier(
                    Rarity::Epic,
                    4.0,
                    150,
                    400,
                    0.6,
                    vec![item("lockpick_set", "Lockpick Set", 5, 1)],
                ),
                tier(
                    Rarity::Legendary,
                    1.0,
                    500,
                    1500,
                    0.75,
                    vec![item("golden_getaway", "Golden Getaway Car", 8, 8)],
                ),
            ],
        }
    }
}

/// What a catalog entry delivers when bought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goods {
    Item {
        rarity: Rarity,
        attack: u32,
        defense: u32,
    },
    Buff {
        kind: BuffKind,
        tier: u8,
        duration_secs: i64,
    },
    Crates {
        count: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub price: u64,
    /// Relative chance of appearing in a reroll.
    #[serde(default = "default_offer_weight")]
    pub weight: f64,
    pub goods: Goods,
}

fn default_offer_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub reroll_cooldown_secs: i64,
    pub offer_slots: usize,
    pub inventory_capacity: usize,
    pub max_equipped: usize,
    pub catalog: Vec<CatalogEntry>,
    pub supplies: Vec<CatalogEntry>,
}

impl ShopConfig {
    pub fn catalog_entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.catalog.iter().find(|e| e.id == id)
    }

    pub fn supply_entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.supplies.iter().find(|e| e.id == id)
    }
}

impl Default for ShopConfig {
    fn default() -> Self {
        let entry = |id: &str, name: &str, price, weight, goods| CatalogEntry {
            id: id.to_string(),
            name: name.to_string(),
            price,
            weight,
            goods,
        };
        let buff = |kind, tier, duration_secs| Goods::Buff {
            kind,
            tier,
            duration_secs,
        };
        Self {
            reroll_cooldown_secs: 3600,
            offer_slots: 3,
            inventory_capacity: 20,
            max_equipped: 3,
            catalog: vec![
                entry("lucky_charm", "Lucky Charm", 250, 3.0, buff(BuffKind::Luck, 1, 1800)),
                entry("four_leaf", "Four-Leaf Clover", 600, 1.5, buff(BuffKind::Luck, 2, 1800)),
                entry("ski_mask", "Ski Mask", 300, 2.0, buff(BuffKind::Stealth, 1, 1800)),
                entry("guard_dog", "Guard Dog", 400, 2.0, buff(BuffKind::Guard, 1, 3600)),
                entry(
                    "brass_knuckles",
                    "Brass Knuckles",
                    500,
                    1.0,
                    Goods::Item {
                        rarity: Rarity::Uncommon,
                        attack: 3,
                        defense: 0,
                    },
                ),
                entry(
                    "safe_box",
                    "Safe Box",
                    800,
                    1.0,
                    Goods::Item {
                        rarity: Rarity::Rare,
                        attack: 0,
                        defense: 6,
                    },
                ),
            ],
            supplies: vec![
                entry("crate", "Loot Crate", 150, 1.0, Goods::Crates { count: 1 }),
                entry("crate_bundle", "Crate Bundle", 650, 1.0, Goods::Crates { count: 5 }),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub cooldown_secs: i64,
    pub reward_coins: u64,
    pub reward_xp: u64,
    pub reward_crates: u32,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 86_400,
            reward_coins: 150,
            reward_xp: 25,
            reward_crates: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub subscriber_bonus_pct: u32,
    pub vip_bonus_pct: u32,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            subscriber_bonus_pct: 5,
            vip_bonus_pct: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerritorySeed {
    pub territory_id: String,
    #[serde(default)]
    pub controlling_faction_id: Option<String>,
    #[serde(default)]
    pub is_contested: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FactionConfig {
    pub territory_bonus_pct: u32,
    pub territories: Vec<TerritorySeed>,
}

impl Default for FactionConfig {
    fn default() -> Self {
        Self {
            territory_bonus_pct: 10,
            territories: vec![
                TerritorySeed {
                    territory_id: "docks".to_string(),
                    controlling_faction_id: None,
                    is_contested: false,
                },
                TerritorySeed {
                    territory_id: "downtown".to_string(),
                    controlling_faction_id: None,
                    is_contested: false,
                },
            ],
        }
    }
}

fn check_weight(name: &str, w: f64) -> Result<()> {
    if !w.is_finite() || w < 0.0 {
        return Err(anyhow!("{} must be a finite non-negative weight", name));
    }
    Ok(())
}

fn check_chance(name: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(anyhow!("{} must be between 0 and 1", name));
    }
    Ok(())
}

impl EconomyConfig {
    pub fn validate(&self) -> Result<()> {
        let play = &self.play;
        check_weight("play.win_weight", play.win_weight)?;
        check_weight("play.bust_weight", play.bust_weight)?;
        if play.win_weight + play.bust_weight <= 0.0 {
            return Err(anyhow!("play weights must not both be zero"));
        }
        if play.win_min > play.win_max {
            return Err(anyhow!("play.win_min must not exceed play.win_max"));
        }
        check_chance("play.bust_jail_chance", play.bust_jail_chance)?;
        if play.bust_loss_bps > 10_000 {
            return Err(anyhow!("play.bust_loss_bps must be at most 10000"));
        }

        let rob = &self.rob;
        check_weight("rob.success_weight", rob.success_weight)?;
        check_weight("rob.failure_weight", rob.failure_weight)?;
        if rob.success_weight + rob.failure_weight <= 0.0 {
            return Err(anyhow!("rob weights must not both be zero"));
        }
        if rob.min_steal_bps > rob.max_steal_bps || rob.max_steal_bps > 10_000 {
            return Err(anyhow!("rob steal range must satisfy min <= max <= 10000"));
        }
        if rob.fail_fine_bps > 10_000 {
            return Err(anyhow!("rob.fail_fine_bps must be at most 10000"));
        }
        check_chance("rob.fail_jail_chance", rob.fail_jail_chance)?;
        if rob.base_defense == 0 {
            return Err(anyhow!("rob.base_defense must be positive"));
        }

        if self.tokens.daily_cap == 0 {
            return Err(anyhow!("tokens.daily_cap must be positive"));
        }
        if self.tokens.growth_denominator == 0 {
            return Err(anyhow!("tokens.growth_denominator must be positive"));
        }

        if self.crates.max_batch == 0 {
            return Err(anyhow!("crates.max_batch must be positive"));
        }
        if self.crates.tiers.is_empty() {
            return Err(anyhow!("crates.tiers must not be empty"));
        }
        for tier in &self.crates.tiers {
            check_weight("crates.tiers.weight", tier.weight)?;
            check_chance("crates.tiers.item_chance", tier.item_chance)?;
            if tier.coins_min > tier.coins_max {
                return Err(anyhow!("crate tier {:?} has coins_min > coins_max", tier.rarity));
            }
        }

        if self.shop.offer_slots == 0 {
            return Err(anyhow!("shop.offer_slots must be positive"));
        }
        for entry in self.shop.catalog.iter().chain(self.shop.supplies.iter()) {
            check_weight("shop entry weight", entry.weight)?;
            if let Goods::Buff { tier, .. } = entry.goods {
                if tier == 0 {
                    return Err(anyhow!("buff entry {} must have tier >= 1", entry.id));
                }
            }
        }
        if self.player.xp_curve == 0 || self.player.max_level == 0 {
            return Err(anyhow!("player.xp_curve and player.max_level must be positive"));
        }
        Ok(())
    }
}
