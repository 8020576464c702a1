use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ACCOUNT_SCHEMA_VERSION: u8 = 1;
pub const ESCROW_SCHEMA_VERSION: u8 = 1;
pub const OUTCOME_SCHEMA_VERSION: u8 = 1;

/// Wealth is an unsigned arbitrary precision integer; it can never go negative.
pub type Wealth = BigUint;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl PlayerId {
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

/// Every economic action the engine knows about. Actions that carry timers double as
/// cooldown keys; `Jail` is the cooldown that bail clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Play,
    Rob,
    Jail,
    Bail,
    ShopReroll,
    MissionClaim,
    CrateOpen,
    TokenConversion,
    ShopPurchase,
    SupplyPurchase,
    EscrowClaim,
    Equip,
    Grant,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Rob => "rob",
            Self::Jail => "jail",
            Self::Bail => "bail",
            Self::ShopReroll => "shop_reroll",
            Self::MissionClaim => "mission_claim",
            Self::CrateOpen => "crate_open",
            Self::TokenConversion => "token_conversion",
            Self::ShopPurchase => "shop_purchase",
            Self::SupplyPurchase => "supply_purchase",
            Self::EscrowClaim => "escrow_claim",
            Self::Equip => "equip",
            Self::Grant => "grant",
        }
    }

    /// One-byte tag used in cooldown keys. Never renumber.
    pub fn tag(self) -> u8 {
        match self {
            Self::Play => 1,
            Self::Rob => 2,
            Self::Jail => 3,
            Self::Bail => 4,
            Self::ShopReroll => 5,
            Self::MissionClaim => 6,
            Self::CrateOpen => 7,
            Self::TokenConversion => 8,
            Self::ShopPurchase => 9,
            Self::SupplyPurchase => 10,
            Self::EscrowClaim => 11,
            Self::Equip => 12,
            Self::Grant => 13,
        }
    }

    /// Actions that can be redeemed with channel points; session callers are gated on these.
    pub fn is_channel_redeemable(self) -> bool {
        matches!(self, Self::Play | Self::Rob | Self::Bail | Self::ShopReroll)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusTier {
    #[default]
    Regular,
    Subscriber,
    Vip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub platform: String,
    pub external_id: String,
}

impl ExternalLink {
    pub fn new(platform: &str, external_id: &str) -> Self {
        Self {
            platform: platform.to_ascii_lowercase(),
            external_id: external_id.to_string(),
        }
    }
}

/// Everything needed to open an account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Registration {
    pub display_name: String,
    pub link: Option<ExternalLink>,
    pub status_tier: StatusTier,
    pub faction_id: Option<String>,
}

impl Registration {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn with_link(mut self, link: ExternalLink) -> Self {
        self.link = Some(link);
        self
    }

    pub fn with_tier(mut self, tier: StatusTier) -> Self {
        self.status_tier = tier;
        self
    }

    pub fn with_faction(mut self, faction_id: &str) -> Self {
        self.faction_id = Some(faction_id.to_string());
        self
    }
}

/// Token sink with a per-local-day conversion counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenBalance {
    pub tokens: u64,
    pub daily_conversion_count: u32,
    pub conversion_day: Option<NaiveDate>,
}

impl TokenBalance {
    /// Conversions already performed on `day`; a stale counter reads as zero.
    pub fn conversions_on(&self, day: NaiveDate) -> u32 {
        if self.conversion_day == Some(day) {
            self.daily_conversion_count
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    /// Raises the play win weight.
    Luck,
    /// Raises the rob success weight.
    Stealth,
    /// Adds defense against robbery.
    Guard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBuff {
    pub kind: BuffKind,
    pub tier: u8,
    pub expires_at: DateTime<Utc>,
}

/// A lower-tier buff bought while a stronger one was active. Recorded, never applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelvedBuff {
    pub kind: BuffKind,
    pub tier: u8,
    pub duration_secs: i64,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub instance_id: Uuid,
    pub item_id: String,
    pub name: String,
    pub rarity: Rarity,
    #[serde(default)]
    pub attack: u32,
    #[serde(default)]
    pub defense: u32,
    #[serde(default)]
    pub equipped: bool,
    pub acquired_at: DateTime<Utc>,
}

/// Per-player rotating shop offers (catalog entry ids).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PlayerShop {
    pub offers: Vec<String>,
    pub rolled_at: Option<DateTime<Utc>>,
}

/// Balance fields owned by the balance mutator. Readable everywhere, writable only
/// through [`crate::economy::mutator::Txn`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    wealth: Wealth,
    xp: u64,
    level: u32,
    hp: u32,
}

impl Balance {
    pub(crate) fn new(wealth: Wealth, hp: u32) -> Self {
        Self {
            wealth,
            xp: 0,
            level: 1,
            hp,
        }
    }

    pub fn wealth(&self) -> &Wealth {
        &self.wealth
    }

    pub fn xp(&self) -> u64 {
        self.xp
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn hp(&self) -> u32 {
        self.hp
    }

    pub(in crate::economy) fn set_wealth(&mut self, wealth: Wealth) {
        self.wealth = wealth;
    }

    pub(in crate::economy) fn set_progress(&mut self, xp: u64, level: u32) {
        self.xp = xp;
        self.level = level;
    }

    pub(in crate::economy) fn set_hp(&mut self, hp: u32) {
        self.hp = hp;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAccount {
    pub id: PlayerId,
    pub display_name: String,
    #[serde(default)]
    pub links: Vec<ExternalLink>,
    balance: Balance,
    #[serde(default)]
    pub status_tier: StatusTier,
    #[serde(default)]
    pub faction_id: Option<String>,
    #[serde(default)]
    pub tokens: TokenBalance,
    #[serde(default)]
    pub crates: u32,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub buffs: Vec<ActiveBuff>,
    #[serde(default)]
    pub shelved_buffs: Vec<ShelvedBuff>,
    #[serde(default)]
    pub shop: PlayerShop,
    /// Optimistic concurrency version, bumped by every committed write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PlayerAccount {
    pub fn new(id: PlayerId, display_name: &str, balance: Balance, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: display_name.to_string(),
            links: Vec::new(),
            balance,
            status_tier: StatusTier::default(),
            faction_id: None,
            tokens: TokenBalance::default(),
            crates: 0,
            inventory: Vec::new(),
            buffs: Vec::new(),
            shelved_buffs: Vec::new(),
            shop: PlayerShop::default(),
            version: 0,
            created_at: now,
            updated_at: now,
            schema_version: ACCOUNT_SCHEMA_VERSION,
        }
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn wealth(&self) -> &Wealth {
        self.balance.wealth()
    }

    pub(in crate::economy) fn balance_mut(&mut self) -> &mut Balance {
        &mut self.balance
    }

    /// Buff of `kind` still running at `now`.
    pub fn active_buff(&self, kind: BuffKind, now: DateTime<Utc>) -> Option<&ActiveBuff> {
        self.buffs
            .iter()
            .find(|b| b.kind == kind && b.expires_at > now)
    }

    pub fn equipped_attack(&self) -> u32 {
        self.inventory
            .iter()
            .filter(|i| i.equipped)
            .map(|i| i.attack)
            .sum()
    }

    pub fn equipped_defense(&self) -> u32 {
        self.inventory
            .iter()
            .filter(|i| i.equipped)
            .map(|i| i.defense)
            .sum()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            wealth: self.balance.wealth.clone(),
            xp: self.balance.xp,
            level: self.balance.level,
            hp: self.balance.hp,
            tokens: self.tokens.tokens,
            crates: self.crates,
        }
    }
}

/// Read-only view returned to callers after a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub display_name: String,
    pub wealth: Wealth,
    pub xp: u64,
    pub level: u32,
    pub hp: u32,
    pub tokens: u64,
    pub crates: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cooldown {
    pub player_id: PlayerId,
    pub action: ActionKind,
    pub expires_at: DateTime<Utc>,
}

impl Cooldown {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

// ============================================================================
// Rewards and escrow
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    Coins,
    Tokens,
    Crates,
    Item,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reward {
    Coins { amount: Wealth },
    Tokens { amount: u64 },
    Crates { count: u32 },
    Item { item: InventoryItem },
}

impl Reward {
    pub fn kind(&self) -> RewardKind {
        match self {
            Self::Coins { .. } => RewardKind::Coins,
            Self::Tokens { .. } => RewardKind::Tokens,
            Self::Crates { .. } => RewardKind::Crates,
            Self::Item { .. } => RewardKind::Item,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowedReward {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub reward: Reward,
    pub claimed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    pub schema_version: u8,
}

impl EscrowedReward {
    pub fn new(player_id: PlayerId, reward: Reward, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_id,
            reward,
            claimed: false,
            created_at: now,
            claimed_at: None,
            schema_version: ESCROW_SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Territory {
    pub territory_id: String,
    pub controlling_faction_id: Option<String>,
    pub is_contested: bool,
}

// ============================================================================
// Transaction outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Win,
    Bust,
    RobSuccess,
    RobFailure,
    Bailed,
    CratesOpened,
    TokensConverted,
    Purchased,
    Rerolled,
    MissionClaimed,
    RewardClaimed,
    Equipped,
    Granted,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Bust => "bust",
            Self::RobSuccess => "rob_success",
            Self::RobFailure => "rob_failure",
            Self::Bailed => "bailed",
            Self::CratesOpened => "crates_opened",
            Self::TokensConverted => "tokens_converted",
            Self::Purchased => "purchased",
            Self::Rerolled => "rerolled",
            Self::MissionClaimed => "mission_claimed",
            Self::RewardClaimed => "reward_claimed",
            Self::Equipped => "equipped",
            Self::Granted => "granted",
        }
    }
}

/// Why a batch crate open stopped before the requested count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStop {
    InsufficientCrates,
}

/// How a buff purchase landed on the player's active buffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffEffect {
    Activated { expires_at: DateTime<Utc> },
    Upgraded { from_tier: u8, expires_at: DateTime<Utc> },
    Extended { expires_at: DateTime<Utc> },
    Shelved { active_tier: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Inventory { instance_id: Uuid },
    Escrowed { escrow_id: Uuid },
    Buff { effect: BuffEffect },
    Crates { count: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeDetails {
    Play {
        used_token: bool,
        xp_gained: u64,
        levels_gained: u32,
        jailed_until: Option<DateTime<Utc>>,
    },
    Rob {
        amount: Wealth,
        hp_lost: u32,
        jailed_until: Option<DateTime<Utc>>,
    },
    Bail {
        cost: Wealth,
    },
    Crates {
        requested: u32,
        opened: u32,
        escrow_ids: Vec<Uuid>,
        by_rarity: BTreeMap<Rarity, u32>,
        coins_total: Wealth,
        stop: Option<BatchStop>,
    },
    Conversion {
        cost: Wealth,
        tokens_credited: u64,
        conversions_today: u32,
    },
    Purchase {
        entry_id: String,
        price: Wealth,
        delivery: Delivery,
    },
    Reroll {
        offers: Vec<String>,
    },
    Mission {
        coins: Wealth,
        xp: u64,
        crates: u32,
    },
    Claim {
        escrow_id: Uuid,
        reward: Reward,
    },
    Equip {
        instance_id: Uuid,
        equipped: bool,
    },
    Grant {
        reason: String,
    },
}

/// Immutable record of one committed transaction. Doubles as the idempotency witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub id: u64,
    pub action: ActionKind,
    pub player_id: PlayerId,
    pub target_id: Option<PlayerId>,
    /// Signed wealth change of `player_id`, filled in by the balance mutator.
    pub amount_delta: BigInt,
    pub outcome_kind: OutcomeKind,
    pub details: OutcomeDetails,
    pub idempotency_key: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub schema_version: u8,
}

impl TransactionOutcome {
    pub fn new(
        action: ActionKind,
        player_id: PlayerId,
        outcome_kind: OutcomeKind,
        details: OutcomeDetails,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            action,
            player_id,
            target_id: None,
            amount_delta: BigInt::default(),
            outcome_kind,
            details,
            idempotency_key: None,
            timestamp,
            schema_version: OUTCOME_SCHEMA_VERSION,
        }
    }

    pub fn with_target(mut self, target: PlayerId) -> Self {
        self.target_id = Some(target);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_counter_resets_on_new_day() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let balance = TokenBalance {
            tokens: 3,
            daily_conversion_count: 7,
            conversion_day: Some(day),
        };
        assert_eq!(balance.conversions_on(day), 7);
        assert_eq!(balance.conversions_on(day.succ_opt().unwrap()), 0);
    }

    #[test]
    fn cooldown_tags_are_unique() {
        let all = [
            ActionKind::Play,
            ActionKind::Rob,
            ActionKind::Jail,
            ActionKind::Bail,
            ActionKind::ShopReroll,
            ActionKind::MissionClaim,
            ActionKind::CrateOpen,
            ActionKind::TokenConversion,
            ActionKind::ShopPurchase,
            ActionKind::SupplyPurchase,
            ActionKind::EscrowClaim,
            ActionKind::Equip,
            ActionKind::Grant,
        ];
        let mut tags: Vec<u8> = all.iter().map(|a| a.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), all.len());
    }

    #[test]
    fn equipped_stats_only_count_equipped_items() {
        let now = Utc::now();
        let mut account = PlayerAccount::new(
            PlayerId(1),
            "alice",
            Balance::new(Wealth::from(10u32), 100),
            now,
        );
        for (attack, defense, equipped) in [(3, 1, true), (5, 7, false), (0, 4, true)] {
            account.inventory.push(InventoryItem {
                instance_id: Uuid::new_v4(),
                item_id: "blade".into(),
                name: "Blade".into(),
                rarity: Rarity::Common,
                attack,
                defense,
                equipped,
                acquired_at: now,
            });
        }
        assert_eq!(account.equipped_attack(), 3);
        assert_eq!(account.equipped_defense(), 5);
    }
}
