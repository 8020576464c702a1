//! Crate opening, escrow deposits and single claims.
mod common;

use lootline::config::{CrateTier, EconomyConfig, LootItem};
use lootline::economy::{
    BatchStop, CallerContext, EconomyError, OutcomeDetails, Rarity, Reward, ScriptedRandom,
};
use uuid::Uuid;

use common::{coins, fund, harness, harness_with, register, wealth};

fn item_only_crates(config: &mut EconomyConfig) {
    config.crates.tiers = vec![CrateTier {
        rarity: Rarity::Uncommon,
        weight: 1.0,
        coins_min: 1,
        coins_max: 1,
        item_chance: 1.0,
        items: vec![LootItem {
            item_id: "crowbar".into(),
            name: "Crowbar".into(),
            attack: 2,
            defense: 0,
        }],
    }];
}

#[tokio::test]
async fn mission_crate_lands_in_escrow_and_claims_once() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);

    let mission = h.engine.claim_mission(&caller, None).await.unwrap();
    assert_eq!(mission.player.crates, 1);
    assert_eq!(mission.player.wealth, coins(250));
    assert!(matches!(
        h.engine.claim_mission(&caller, None).await,
        Err(EconomyError::OnCooldown { .. })
    ));

    let opened = h.engine.open_crates(&caller, 1, None).await.unwrap();
    assert_eq!(opened.player.crates, 0);
    let OutcomeDetails::Crates {
        escrow_ids,
        coins_total,
        by_rarity,
        stop,
        ..
    } = opened.outcome.details
    else {
        panic!("unexpected details");
    };
    assert_eq!(escrow_ids.len(), 1);
    assert_eq!(coins_total, coins(5));
    assert_eq!(by_rarity.get(&Rarity::Common), Some(&1));
    assert_eq!(stop, None);
    // crates never pay out directly
    assert_eq!(wealth(&h.engine, id).await, coins(250));

    let pending = h.engine.pending_escrow(id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reward, Reward::Coins { amount: coins(5) });

    h.engine
        .claim_escrow(&caller, escrow_ids[0], None)
        .await
        .unwrap();
    assert_eq!(wealth(&h.engine, id).await, coins(255));
    assert!(h.engine.pending_escrow(id).await.unwrap().is_empty());

    let again = h.engine.claim_escrow(&caller, escrow_ids[0], None).await;
    assert!(matches!(again, Err(EconomyError::AlreadyClaimed)));
    assert_eq!(wealth(&h.engine, id).await, coins(255));
}

#[tokio::test]
async fn other_players_cannot_claim() {
    let h = harness(ScriptedRandom::always(0.0));
    let owner = register(&h.engine, "owner").await;
    let thief = register(&h.engine, "thief").await;
    h.engine
        .claim_mission(&CallerContext::session(owner), None)
        .await
        .unwrap();
    h.engine
        .open_crates(&CallerContext::session(owner), 1, None)
        .await
        .unwrap();
    let record = h.engine.pending_escrow(owner).await.unwrap().remove(0);

    let err = h
        .engine
        .claim_escrow(&CallerContext::session(thief), record.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EconomyError::NotOwner));
    assert_eq!(h.engine.pending_escrow(owner).await.unwrap().len(), 1);

    let missing = h
        .engine
        .claim_escrow(&CallerContext::session(owner), Uuid::new_v4(), None)
        .await;
    assert!(matches!(missing, Err(EconomyError::NotFound(_))));
}

#[tokio::test]
async fn keyed_claim_replays_instead_of_failing() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);
    h.engine.claim_mission(&caller, None).await.unwrap();
    h.engine.open_crates(&caller, 1, None).await.unwrap();
    let record = h.engine.pending_escrow(id).await.unwrap().remove(0);

    let first = h
        .engine
        .claim_escrow(&caller, record.id, Some("claim-1"))
        .await
        .unwrap();
    let second = h
        .engine
        .claim_escrow(&caller, record.id, Some("claim-1"))
        .await
        .unwrap();
    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.outcome.id, second.outcome.id);
    assert_eq!(wealth(&h.engine, id).await, coins(255));
}

#[tokio::test]
async fn batch_stops_when_crates_run_out() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);

    assert!(matches!(
        h.engine.open_crates(&caller, 1, None).await,
        Err(EconomyError::NoCratesAvailable)
    ));
    assert!(matches!(
        h.engine.open_crates(&caller, 0, None).await,
        Err(EconomyError::InvalidArgument(_))
    ));

    fund(&h.engine, id, 1_000).await;
    let bought = h
        .engine
        .purchase_supply(&caller, "crate_bundle", None)
        .await
        .unwrap();
    assert_eq!(bought.player.crates, 5);

    let opened = h.engine.open_crates(&caller, 8, None).await.unwrap();
    match opened.outcome.details {
        OutcomeDetails::Crates {
            requested,
            opened,
            escrow_ids,
            stop,
            ..
        } => {
            assert_eq!(requested, 8);
            assert_eq!(opened, 5);
            assert_eq!(escrow_ids.len(), 5);
            assert_eq!(stop, Some(BatchStop::InsufficientCrates));
        }
        other => panic!("unexpected details {:?}", other),
    }
    assert_eq!(h.engine.pending_escrow(id).await.unwrap().len(), 5);
}

#[tokio::test]
async fn item_claim_into_full_inventory_stays_pending() {
    let mut config = EconomyConfig::default();
    item_only_crates(&mut config);
    config.shop.inventory_capacity = 1;
    let h = harness_with(config, ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);
    fund(&h.engine, id, 1_000).await;
    h.engine
        .purchase_supply(&caller, "crate_bundle", None)
        .await
        .unwrap();
    h.engine.open_crates(&caller, 2, None).await.unwrap();

    let pending = h.engine.pending_escrow(id).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(matches!(pending[0].reward, Reward::Item { .. }));

    h.engine
        .claim_escrow(&caller, pending[0].id, None)
        .await
        .unwrap();
    let full = h.engine.claim_escrow(&caller, pending[1].id, None).await;
    assert!(matches!(full, Err(EconomyError::InventoryFull { capacity: 1 })));

    let account = h.engine.player(id).await.unwrap();
    assert_eq!(account.inventory.len(), 1);
    assert!(!account.inventory[0].equipped);
    assert_eq!(h.engine.pending_escrow(id).await.unwrap().len(), 1);
}
