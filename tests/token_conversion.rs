mod common;

use chrono::Duration;
use lootline::config::EconomyConfig;
use lootline::economy::{CallerContext, EconomyError, OutcomeDetails, ScriptedRandom};

use common::{coins, fund, harness, harness_with, register, wealth};

#[tokio::test]
async fn cost_grows_with_each_conversion_today() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    fund(&h.engine, id, 1_000).await;
    let caller = CallerContext::session(id);

    let mut costs = Vec::new();
    for _ in 0..3 {
        let receipt = h.engine.convert_tokens(&caller, None).await.unwrap();
        match receipt.outcome.details {
            OutcomeDetails::Conversion { cost, .. } => costs.push(cost),
            other => panic!("unexpected details {:?}", other),
        }
    }
    // 100, 110, 121
    assert_eq!(costs, vec![coins(100), coins(110), coins(121)]);
    let account = h.engine.player(id).await.unwrap();
    assert_eq!(account.tokens.tokens, 3);
    assert_eq!(account.wealth(), &coins(1_100 - 331));
}

#[tokio::test]
async fn fifty_first_conversion_hits_the_cap() {
    let mut config = EconomyConfig::default();
    config.tokens.growth_numerator = 1;
    config.tokens.growth_denominator = 1;
    config.tokens.base_cost = 1;
    let h = harness_with(config, ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);

    for _ in 0..50 {
        h.engine.convert_tokens(&caller, None).await.unwrap();
    }
    let before = wealth(&h.engine, id).await;
    assert_eq!(before, coins(50));
    let err = h.engine.convert_tokens(&caller, None).await.unwrap_err();
    assert!(matches!(err, EconomyError::ConversionCapReached { cap: 50 }));
    assert_eq!(wealth(&h.engine, id).await, before);

    // the counter resets on the next local day
    h.clock.advance(Duration::hours(12));
    let receipt = h.engine.convert_tokens(&caller, None).await.unwrap();
    match receipt.outcome.details {
        OutcomeDetails::Conversion {
            conversions_today, ..
        } => assert_eq!(conversions_today, 1),
        other => panic!("unexpected details {:?}", other),
    }
}

#[tokio::test]
async fn day_boundary_follows_the_configured_offset() {
    let mut config = EconomyConfig::default();
    config.tokens.daily_cap = 1;
    config.tokens.base_cost = 1;
    // UTC-13h: noon UTC is still the previous local day until 13:00 UTC
    config.tokens.day_offset_minutes = -13 * 60;
    let h = harness_with(config, ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);

    h.engine.convert_tokens(&caller, None).await.unwrap();
    h.clock.advance(Duration::minutes(30));
    assert!(matches!(
        h.engine.convert_tokens(&caller, None).await,
        Err(EconomyError::ConversionCapReached { .. })
    ));
    h.clock.advance(Duration::minutes(31));
    h.engine.convert_tokens(&caller, None).await.unwrap();
}

#[tokio::test]
async fn conversion_needs_funds() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let caller = CallerContext::session(id);
    h.engine.convert_tokens(&caller, None).await.unwrap();
    let err = h.engine.convert_tokens(&caller, None).await.unwrap_err();
    assert!(matches!(err, EconomyError::InsufficientFunds { .. }));
    assert_eq!(h.engine.player(id).await.unwrap().tokens.tokens, 1);
}
