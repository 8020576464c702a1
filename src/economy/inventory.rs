/// Inventory management for player accounts
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::economy::errors::EconomyError;
use crate::economy::types::{InventoryItem, PlayerAccount, Rarity};

// ============================================================================
// Inventory Operations
// ============================================================================

/// Check if the player has a free inventory slot
pub fn has_room(player: &PlayerAccount, capacity: usize) -> bool {
    player.inventory.len() < capacity
}

pub fn equipped_count(player: &PlayerAccount) -> usize {
    player.inventory.iter().filter(|i| i.equipped).count()
}

/// Fresh, unequipped item instance
pub fn new_item(
    item_id: &str,
    name: &str,
    rarity: Rarity,
    attack: u32,
    defense: u32,
    now: DateTime<Utc>,
) -> InventoryItem {
    InventoryItem {
        instance_id: Uuid::new_v4(),
        item_id: item_id.to_string(),
        name: name.to_string(),
        rarity,
        attack,
        defense,
        equipped: false,
        acquired_at: now,
    }
}

/// Add an item to the player's inventory
pub fn add_item(
    player: &mut PlayerAccount,
    mut item: InventoryItem,
    capacity: usize,
) -> Result<Uuid, EconomyError> {
    if !has_room(player, capacity) {
        return Err(EconomyError::InventoryFull { capacity });
    }
    // Items arriving from escrow or the shop always start unequipped.
    item.equipped = false;
    let id = item.instance_id;
    player.inventory.push(item);
    Ok(id)
}

/// Equip or unequip an item. Equipping is bounded by `max_equipped`.
pub fn set_equipped(
    player: &mut PlayerAccount,
    instance_id: Uuid,
    equip: bool,
    max_equipped: usize,
) -> Result<(), EconomyError> {
    let already_equipped = equipped_count(player);
    let Some(item) = player
        .inventory
        .iter_mut()
        .find(|i| i.instance_id == instance_id)
    else {
        return Err(EconomyError::NotFound(format!("item {}", instance_id)));
    };
    if equip && !item.equipped && already_equipped >= max_equipped {
        return Err(EconomyError::InvalidArgument(format!(
            "at most {} items can be equipped",
            max_equipped
        )));
    }
    item.equipped = equip;
    Ok(())
}
