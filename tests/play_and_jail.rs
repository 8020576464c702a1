//! Play, jail and bail flows against a real ledger.
mod common;

use chrono::Duration;
use lootline::config::EconomyConfig;
use lootline::economy::{
    ActionKind, CallerContext, EconomyError, OutcomeDetails, OutcomeKind, ScriptedRandom,
    TargetRef,
};

use common::{coins, harness, harness_with, register, wealth};

#[tokio::test]
async fn win_pays_and_starts_the_cooldown() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);

    let receipt = h.engine.play(&caller, false, None).await.unwrap();
    assert_eq!(receipt.outcome.outcome_kind, OutcomeKind::Win);
    assert_eq!(receipt.player.wealth, coins(110));
    assert_eq!(receipt.player.xp, 10);

    match h.engine.play(&caller, false, None).await {
        Err(EconomyError::OnCooldown { action, remaining }) => {
            assert_eq!(action, ActionKind::Play);
            assert_eq!(remaining, Duration::seconds(300));
        }
        other => panic!("expected cooldown, got {:?}", other),
    }

    h.clock.advance(Duration::seconds(300));
    h.engine.play(&caller, false, None).await.unwrap();
    assert_eq!(wealth(&h.engine, id).await, coins(120));
}

#[tokio::test]
async fn bust_loses_a_share_and_may_jail() {
    // bust, then a jail roll under the 10% chance
    let h = harness(ScriptedRandom::new([0.99, 0.0], 0.0));
    let id = register(&h.engine, "vex").await;

    let receipt = h
        .engine
        .play(&CallerContext::session(id), false, None)
        .await
        .unwrap();
    assert_eq!(receipt.outcome.outcome_kind, OutcomeKind::Bust);
    assert_eq!(receipt.player.wealth, coins(95));
    match receipt.outcome.details {
        OutcomeDetails::Play { jailed_until, .. } => {
            assert_eq!(jailed_until, Some(common::start_time() + Duration::seconds(600)));
        }
        other => panic!("unexpected details {:?}", other),
    }
}

#[tokio::test]
async fn play_while_jailed_changes_nothing() {
    let h = harness(ScriptedRandom::new([0.99, 0.0], 0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);
    h.engine.play(&caller, false, None).await.unwrap();

    // play cooldown is over, jail is not
    h.clock.advance(Duration::seconds(301));
    let before = h.engine.player(id).await.unwrap();
    let err = h.engine.play(&caller, false, None).await.unwrap_err();
    assert!(matches!(err, EconomyError::Jailed { .. }));
    let after = h.engine.player(id).await.unwrap();
    assert_eq!(before.wealth(), after.wealth());
    assert_eq!(before.balance().xp(), after.balance().xp());
    assert_eq!(before.version, after.version);
}

#[tokio::test]
async fn bail_clears_jail_for_an_immediate_play() {
    // failed rob, caught; then a winning play
    let h = harness(ScriptedRandom::new([0.99, 0.0], 0.0));
    let robber = register(&h.engine, "robber").await;
    let mark = register(&h.engine, "mark").await;
    let caller = CallerContext::session(robber);

    let rob = h
        .engine
        .rob(&caller, &TargetRef::Id(mark), None)
        .await
        .unwrap();
    assert_eq!(rob.outcome.outcome_kind, OutcomeKind::RobFailure);
    assert_eq!(rob.player.hp, 75);
    let jail = h
        .engine
        .cooldowns(robber)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.action == ActionKind::Jail)
        .expect("jailed");
    assert_eq!(jail.expires_at - common::start_time(), Duration::minutes(10));

    assert_eq!(h.engine.bail_quote(robber).await.unwrap(), Some(coins(50)));
    let bailed = h.engine.bail(&caller, None).await.unwrap();
    assert_eq!(bailed.outcome.outcome_kind, OutcomeKind::Bailed);
    assert_eq!(bailed.player.wealth, coins(45));
    assert_eq!(bailed.player.hp, 100);

    let play = h.engine.play(&caller, false, None).await.unwrap();
    assert_eq!(play.outcome.outcome_kind, OutcomeKind::Win);
    assert_eq!(play.player.wealth, coins(55));
}

#[tokio::test]
async fn bail_without_jail_is_rejected() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let err = h
        .engine
        .bail(&CallerContext::session(id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EconomyError::NotJailed));
    assert_eq!(wealth(&h.engine, id).await, coins(100));
}

#[tokio::test]
async fn unaffordable_bail_keeps_the_player_jailed() {
    let mut config = EconomyConfig::default();
    config.bail.min_cost = 500;
    let h = harness_with(config, ScriptedRandom::new([0.99, 0.0], 0.0));
    let robber = register(&h.engine, "robber").await;
    let mark = register(&h.engine, "mark").await;
    let caller = CallerContext::session(robber);
    h.engine
        .rob(&caller, &TargetRef::Id(mark), None)
        .await
        .unwrap();

    match h.engine.bail(&caller, None).await {
        Err(EconomyError::InsufficientFunds { needed, available }) => {
            assert_eq!(needed, coins(500));
            assert_eq!(available, coins(95));
        }
        other => panic!("expected insufficient funds, got {:?}", other),
    }
    assert!(h.engine.bail_quote(robber).await.unwrap().is_some());
    assert_eq!(wealth(&h.engine, robber).await, coins(95));
}

#[tokio::test]
async fn token_play_doubles_the_payout() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);

    let err = h.engine.play(&caller, true, None).await.unwrap_err();
    assert!(matches!(err, EconomyError::NoTokens));

    h.engine.convert_tokens(&caller, None).await.unwrap();
    assert_eq!(wealth(&h.engine, id).await, coins(0));

    let receipt = h.engine.play(&caller, true, None).await.unwrap();
    assert_eq!(receipt.player.wealth, coins(20));
    assert_eq!(receipt.player.tokens, 0);
    assert_eq!(receipt.player.xp, 20);
}
