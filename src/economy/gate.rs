//! Caller identity and the economy mode gate.
//!
//! Callers are resolved once at the boundary into a [`CallerContext`]. Bot callers prove
//! themselves with the shared secret and always pass the gate; session callers may only run
//! channel-redeemable actions while the broadcast channel is offline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::economy::errors::EconomyError;
use crate::economy::types::{ActionKind, PlayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerKind {
    Bot,
    Session,
}

/// Proof that the bot secret was checked. Only [`BotAuthenticator::authorize`] creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotCredential(());

/// Authenticated caller. A `Bot` value needs a [`BotCredential`], so it can only come from
/// [`BotAuthenticator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerContext {
    Bot {
        player_id: PlayerId,
        credential: BotCredential,
    },
    Session {
        player_id: PlayerId,
    },
}

impl CallerContext {
    /// Session caller for an already-resolved player (session issuance happens upstream).
    pub fn session(player_id: PlayerId) -> Self {
        Self::Session { player_id }
    }

    #[cfg(test)]
    pub(crate) fn bot_unchecked(player_id: PlayerId) -> Self {
        Self::Bot {
            player_id,
            credential: BotCredential(()),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        match self {
            Self::Bot { player_id, .. } | Self::Session { player_id } => *player_id,
        }
    }

    pub fn kind(&self) -> CallerKind {
        match self {
            Self::Bot { .. } => CallerKind::Bot,
            Self::Session { .. } => CallerKind::Session,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    ChannelLive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied(DenyReason),
}

/// Decision table for free actions: bots always, sessions only while offline.
pub fn authorize(kind: CallerKind, is_live: bool) -> GateDecision {
    match (kind, is_live) {
        (CallerKind::Bot, _) => GateDecision::Allowed,
        (CallerKind::Session, false) => GateDecision::Allowed,
        (CallerKind::Session, true) => GateDecision::Denied(DenyReason::ChannelLive),
    }
}

/// "Is the broadcast channel live" query supplied by the stream watcher.
pub trait LiveStatus: Send + Sync {
    fn is_live(&self) -> bool;
}

/// Live flag flipped by whoever watches the channel.
#[derive(Debug, Default)]
pub struct ChannelStatus {
    live: AtomicBool,
}

impl ChannelStatus {
    pub fn new(live: bool) -> Self {
        Self {
            live: AtomicBool::new(live),
        }
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }
}

impl LiveStatus for ChannelStatus {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct EconomyModeGate {
    live: Arc<dyn LiveStatus>,
}

impl EconomyModeGate {
    pub fn new(live: Arc<dyn LiveStatus>) -> Self {
        Self { live }
    }

    /// Gate check for `action`. Actions that are not channel-redeemable are never gated.
    pub fn check(&self, caller: &CallerContext, action: ActionKind) -> Result<(), EconomyError> {
        if !action.is_channel_redeemable() {
            return Ok(());
        }
        match authorize(caller.kind(), self.live.is_live()) {
            GateDecision::Allowed => Ok(()),
            GateDecision::Denied(DenyReason::ChannelLive) => {
                log::debug!(
                    "economy: {} by {} denied while channel is live",
                    action,
                    caller.player_id()
                );
                Err(EconomyError::EconomyModeDenied)
            }
        }
    }
}

/// Verifies the shared bot secret. Only the digest is kept in memory.
pub struct BotAuthenticator {
    digest: Option<[u8; 32]>,
}

impl BotAuthenticator {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            digest: secret.map(digest),
        }
    }

    pub fn authorize(&self, secret: &str, player_id: PlayerId) -> Result<CallerContext, EconomyError> {
        let Some(expected) = &self.digest else {
            log::warn!("economy: bot call rejected, no bot secret configured");
            return Err(EconomyError::Unauthorized);
        };
        let presented = digest(secret);
        let diff = expected
            .iter()
            .zip(presented.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(CallerContext::Bot {
                player_id,
                credential: BotCredential(()),
            })
        } else {
            log::warn!("economy: bot call for {} rejected, bad secret", player_id);
            Err(EconomyError::Unauthorized)
        }
    }
}

fn digest(secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bots_always_pass() {
        assert_eq!(authorize(CallerKind::Bot, true), GateDecision::Allowed);
        assert_eq!(authorize(CallerKind::Bot, false), GateDecision::Allowed);
    }

    #[test]
    fn sessions_pass_only_offline() {
        assert_eq!(authorize(CallerKind::Session, false), GateDecision::Allowed);
        assert_eq!(
            authorize(CallerKind::Session, true),
            GateDecision::Denied(DenyReason::ChannelLive)
        );
    }

    #[test]
    fn gate_ignores_non_redeemable_actions() {
        let status = Arc::new(ChannelStatus::new(true));
        let gate = EconomyModeGate::new(status.clone());
        let caller = CallerContext::session(PlayerId(4));
        assert!(gate.check(&caller, ActionKind::CrateOpen).is_ok());
        assert!(matches!(
            gate.check(&caller, ActionKind::Play),
            Err(EconomyError::EconomyModeDenied)
        ));
        status.set_live(false);
        assert!(gate.check(&caller, ActionKind::Play).is_ok());
    }

    #[test]
    fn bot_secret_must_match() {
        let auth = BotAuthenticator::new(Some("hunter22-secret"));
        let caller = auth.authorize("hunter22-secret", PlayerId(9)).unwrap();
        assert_eq!(caller.kind(), CallerKind::Bot);
        assert_eq!(caller.player_id(), PlayerId(9));
        assert!(matches!(
            auth.authorize("wrong", PlayerId(9)),
            Err(EconomyError::Unauthorized)
        ));
        let closed = BotAuthenticator::new(None);
        assert!(closed.authorize("anything", PlayerId(9)).is_err());
    }

    #[test]
    fn only_an_authorized_bot_bypasses_the_live_gate() {
        let gate = EconomyModeGate::new(Arc::new(ChannelStatus::new(true)));
        let auth = BotAuthenticator::new(Some("hunter22-secret"));
        let bot = auth.authorize("hunter22-secret", PlayerId(3)).unwrap();
        assert!(gate.check(&bot, ActionKind::Rob).is_ok());
        assert!(auth.authorize("hunter22-secreT", PlayerId(3)).is_err());
        assert!(matches!(
            gate.check(&CallerContext::session(PlayerId(3)), ActionKind::Rob),
            Err(EconomyError::EconomyModeDenied)
        ));
    }
}
