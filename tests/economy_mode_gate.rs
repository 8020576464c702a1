mod common;

use lootline::economy::{
    BotAuthenticator, CallerContext, EconomyError, PlayerId, ScriptedRandom, TargetRef,
};

use common::{coins, harness, register, wealth};

#[tokio::test]
async fn live_channel_denies_sessions_but_not_the_bot() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let other = register(&h.engine, "mark").await;
    h.status.set_live(true);

    let session = CallerContext::session(id);
    for denied in [
        h.engine.play(&session, false, None).await,
        h.engine.rob(&session, &TargetRef::Id(other), None).await,
        h.engine.bail(&session, None).await,
        h.engine.reroll_shop(&session, None).await,
    ] {
        assert!(matches!(denied, Err(EconomyError::EconomyModeDenied)));
    }
    assert_eq!(wealth(&h.engine, id).await, coins(100));
    assert!(h.engine.cooldowns(id).await.unwrap().is_empty());

    let auth = BotAuthenticator::new(Some("s3cret-bot"));
    let bot = auth.authorize("s3cret-bot", id).unwrap();
    let receipt = h.engine.play(&bot, false, None).await.unwrap();
    assert_eq!(receipt.player.id, id);
    assert_eq!(receipt.player.wealth, coins(110));
}

#[tokio::test]
async fn non_redeemable_actions_ignore_the_gate() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    h.status.set_live(true);
    let session = CallerContext::session(id);
    h.engine.claim_mission(&session, None).await.unwrap();
    h.engine.convert_tokens(&session, None).await.unwrap();
}

#[tokio::test]
async fn gate_reopens_when_the_channel_goes_offline() {
    let h = harness(ScriptedRandom::always(0.0));
    let id = register(&h.engine, "vex").await;
    let session = CallerContext::session(id);
    h.status.set_live(true);
    assert!(h.engine.play(&session, false, None).await.is_err());
    h.status.set_live(false);
    h.engine.play(&session, false, None).await.unwrap();
}

#[test]
fn bad_or_missing_secrets_are_unauthorized() {
    let auth = BotAuthenticator::new(Some("s3cret-bot"));
    assert!(matches!(
        auth.authorize("guess", PlayerId(1)),
        Err(EconomyError::Unauthorized)
    ));
    let unset = BotAuthenticator::new(None);
    assert!(matches!(
        unset.authorize("s3cret-bot", PlayerId(1)),
        Err(EconomyError::Unauthorized)
    ));
}
