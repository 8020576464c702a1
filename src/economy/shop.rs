//! Player shops and catalog delivery.
//!
//! Each player sees a handful of offers drawn from the catalog (weighted, no repeats). Rerolling
//! replaces them; buying an offer removes it. The supply catalog is always available and is not
//! part of the rotating offers.

use crate::config::{CatalogEntry, Goods, ShopConfig};
use crate::economy::buffs;
use crate::economy::errors::EconomyError;
use crate::economy::inventory;
use crate::economy::mutator::Txn;
use crate::economy::probability::{resolve, ModifierSet, OutcomeTable, RandomSource};
use crate::economy::types::{Delivery, PlayerId, PlayerShop, Reward};

/// Draw up to `slots` distinct catalog ids, one weighted draw per slot.
pub fn roll_offers(
    catalog: &[CatalogEntry],
    slots: usize,
    rng: &mut dyn RandomSource,
) -> Result<Vec<String>, EconomyError> {
    let table = OutcomeTable::new(
        catalog
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, entry.weight))
            .collect(),
    );
    let available = catalog.iter().filter(|e| e.weight > 0.0).count();
    let mut picked = ModifierSet::new();
    let mut offers = Vec::with_capacity(slots.min(available));
    while offers.len() < slots.min(available) {
        let idx = resolve(&table, &picked, rng)?;
        picked.push(idx, 0.0);
        offers.push(catalog[idx].id.clone());
    }
    Ok(offers)
}

/// Remove `entry_id` from the player's offers, failing if it is not offered.
pub fn take_offer(shop: &mut PlayerShop, entry_id: &str) -> Result<(), EconomyError> {
    let Some(pos) = shop.offers.iter().position(|id| id == entry_id) else {
        return Err(EconomyError::NotFound(format!("shop offer {}", entry_id)));
    };
    shop.offers.remove(pos);
    Ok(())
}

/// Hand the goods of `entry` to `player`. Items that do not fit go to escrow.
pub fn deliver(
    txn: &mut Txn<'_>,
    player: PlayerId,
    entry: &CatalogEntry,
    config: &ShopConfig,
) -> Result<Delivery, EconomyError> {
    let now = txn.now();
    match &entry.goods {
        Goods::Item {
            rarity,
            attack,
            defense,
        } => {
            let item = inventory::new_item(&entry.id, &entry.name, *rarity, *attack, *defense, now);
            let account = txn.account_mut(player)?;
            if inventory::has_room(account, config.inventory_capacity) {
                let instance_id = inventory::add_item(account, item, config.inventory_capacity)?;
                Ok(Delivery::Inventory { instance_id })
            } else {
                log::debug!(
                    "economy: inventory of {} is full, escrowing {}",
                    player,
                    entry.id
                );
                let escrow_id = txn.deposit(player, Reward::Item { item });
                Ok(Delivery::Escrowed { escrow_id })
            }
        }
        Goods::Buff {
            kind,
            tier,
            duration_secs,
        } => {
            let account = txn.account_mut(player)?;
            let effect = buffs::apply_buff(account, *kind, *tier, *duration_secs, now);
            Ok(Delivery::Buff { effect })
        }
        Goods::Crates { count } => {
            let account = txn.account_mut(player)?;
            account.crates = account.crates.saturating_add(*count);
            Ok(Delivery::Crates { count: *count })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::probability::{ScriptedRandom, SeededRandom};

    #[test]
    fn offers_are_distinct_and_bounded() {
        let catalog = ShopConfig::default().catalog;
        let mut rng = SeededRandom::new(11);
        for _ in 0..50 {
            let offers = roll_offers(&catalog, 3, &mut rng).unwrap();
            assert_eq!(offers.len(), 3);
            let mut sorted = offers.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), 3);
        }
    }

    #[test]
    fn small_catalog_yields_every_entry_once() {
        let catalog: Vec<CatalogEntry> = ShopConfig::default().catalog.into_iter().take(2).collect();
        let mut rng = ScriptedRandom::always(0.0);
        let offers = roll_offers(&catalog, 5, &mut rng).unwrap();
        assert_eq!(offers, vec![catalog[0].id.clone(), catalog[1].id.clone()]);
    }

    #[test]
    fn taking_an_offer_removes_it() {
        let mut shop = PlayerShop {
            offers: vec!["a".into(), "b".into()],
            rolled_at: None,
        };
        take_offer(&mut shop, "a").unwrap();
        assert_eq!(shop.offers, vec!["b".to_string()]);
        assert!(matches!(
            take_offer(&mut shop, "a"),
            Err(EconomyError::NotFound(_))
        ));
    }
}
