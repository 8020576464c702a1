use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{IVec, Transactional};
use uuid::Uuid;

use crate::config::TerritorySeed;
use crate::economy::cooldown::CooldownWrite;
use crate::economy::errors::EconomyError;
use crate::economy::escrow::EscrowWrite;
use crate::economy::types::{
    Balance, Cooldown, EscrowedReward, ExternalLink, PlayerAccount, PlayerId, Registration,
    Territory, TransactionOutcome, ACCOUNT_SCHEMA_VERSION, ESCROW_SCHEMA_VERSION,
    OUTCOME_SCHEMA_VERSION,
};

const TREE_ACCOUNTS: &str = "economy_accounts";
const TREE_LINKS: &str = "economy_links";
const TREE_COOLDOWNS: &str = "economy_cooldowns";
const TREE_ESCROW: &str = "economy_escrow";
const TREE_ESCROW_PENDING: &str = "economy_escrow_pending";
const TREE_OUTCOMES: &str = "economy_outcomes";
const TREE_IDEMPOTENCY: &str = "economy_idempotency";
const TREE_TERRITORIES: &str = "economy_territories";

/// Everything one unit of work writes. Applied all-or-nothing by [`EconomyStore::commit`].
///
/// Accounts carry the version they were read at; the commit refuses to write if the stored
/// version moved in the meantime.
#[derive(Debug, Default)]
pub struct Changeset {
    pub accounts: Vec<PlayerAccount>,
    pub cooldowns: Vec<CooldownWrite>,
    pub escrow: Vec<EscrowWrite>,
    pub outcomes: Vec<TransactionOutcome>,
}

/// Persistence collaborator used by the engine.
pub trait EconomyStore: Send + Sync {
    fn read_player(&self, id: PlayerId) -> Result<PlayerAccount, EconomyError>;
    fn list_players(&self) -> Result<Vec<PlayerAccount>, EconomyError>;
    fn create_player(
        &self,
        registration: &Registration,
        balance: Balance,
        now: DateTime<Utc>,
    ) -> Result<PlayerAccount, EconomyError>;
    fn link_external(&self, id: PlayerId, link: ExternalLink) -> Result<PlayerAccount, EconomyError>;
    fn find_by_link(&self, link: &ExternalLink) -> Result<Option<PlayerId>, EconomyError>;

    fn read_cooldowns(&self, id: PlayerId) -> Result<Vec<Cooldown>, EconomyError>;

    fn read_escrow(&self, escrow_id: Uuid) -> Result<EscrowedReward, EconomyError>;
    /// Unclaimed escrow records owned by `id`, oldest first.
    fn list_pending_escrow(&self, id: PlayerId) -> Result<Vec<EscrowedReward>, EconomyError>;

    fn find_outcome_by_key(&self, key: &str) -> Result<Option<TransactionOutcome>, EconomyError>;
    /// Most recent outcomes where `id` was the actor, newest first.
    fn recent_outcomes(&self, id: PlayerId, limit: usize)
        -> Result<Vec<TransactionOutcome>, EconomyError>;

    fn put_territory(&self, territory: Territory) -> Result<(), EconomyError>;
    fn list_territories(&self) -> Result<Vec<Territory>, EconomyError>;

    /// Apply a changeset atomically. Returns the recorded outcomes with their ids assigned.
    fn commit(&self, changeset: Changeset) -> Result<Vec<TransactionOutcome>, EconomyError>;
}

/// Helper builder so tests can easily create throwaway ledgers with custom paths.
pub struct LedgerStoreBuilder {
    path: PathBuf,
    territories: Vec<TerritorySeed>,
}

impl LedgerStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            territories: Vec::new(),
        }
    }

    /// Territories inserted on open when they are not stored yet.
    pub fn with_territories(mut self, seeds: Vec<TerritorySeed>) -> Self {
        self.territories = seeds;
        self
    }

    pub fn open(self) -> Result<LedgerStore, EconomyError> {
        let store = LedgerStore::open(&self.path)?;
        store.seed_territories_if_needed(&self.territories)?;
        Ok(store)
    }
}

/// Sled-backed ledger for accounts, cooldowns, escrow and the outcome log.
pub struct LedgerStore {
    db: sled::Db,
    accounts: sled::Tree,
    links: sled::Tree,
    cooldowns: sled::Tree,
    escrow: sled::Tree,
    escrow_pending: sled::Tree,
    outcomes: sled::Tree,
    idempotency: sled::Tree,
    territories: sled::Tree,
}

impl LedgerStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EconomyError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        Ok(Self {
            accounts: db.open_tree(TREE_ACCOUNTS)?,
            links: db.open_tree(TREE_LINKS)?,
            cooldowns: db.open_tree(TREE_COOLDOWNS)?,
            escrow: db.open_tree(TREE_ESCROW)?,
            escrow_pending: db.open_tree(TREE_ESCROW_PENDING)?,
            outcomes: db.open_tree(TREE_OUTCOMES)?,
            idempotency: db.open_tree(TREE_IDEMPOTENCY)?,
            territories: db.open_tree(TREE_TERRITORIES)?,
            db,
        })
    }

    pub fn seed_territories_if_needed(&self, seeds: &[TerritorySeed]) -> Result<usize, EconomyError> {
        let mut inserted = 0;
        for seed in seeds {
            if self.territories.contains_key(seed.territory_id.as_bytes())? {
                continue;
            }
            self.put_territory(Territory {
                territory_id: seed.territory_id.clone(),
                controlling_faction_id: seed.controlling_faction_id.clone(),
                is_contested: seed.is_contested,
            })?;
            inserted += 1;
        }
        if inserted > 0 {
            log::info!("economy: seeded {} territories", inserted);
        }
        Ok(inserted)
    }

    fn link_key(link: &ExternalLink) -> Vec<u8> {
        format!("{}:{}", link.platform, link.external_id).into_bytes()
    }

    fn cooldown_key(player_id: PlayerId, tag: u8) -> Vec<u8> {
        let mut key = player_id.to_key().to_vec();
        key.push(tag);
        key
    }

    fn pending_key(player_id: PlayerId, created_at: DateTime<Utc>, escrow_id: Uuid) -> Vec<u8> {
        let mut key = player_id.to_key().to_vec();
        key.extend_from_slice(&created_at.timestamp_micros().to_be_bytes());
        key.extend_from_slice(escrow_id.as_bytes());
        key
    }

    fn outcome_key(player_id: PlayerId, outcome_id: u64) -> Vec<u8> {
        let mut key = player_id.to_key().to_vec();
        key.extend_from_slice(&outcome_id.to_be_bytes());
        key
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, EconomyError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, EconomyError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    fn decode_account(bytes: &[u8]) -> Result<PlayerAccount, EconomyError> {
        let record: PlayerAccount = Self::deserialize(bytes)?;
        if record.schema_version != ACCOUNT_SCHEMA_VERSION {
            return Err(EconomyError::SchemaMismatch {
                entity: "account",
                expected: ACCOUNT_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn decode_escrow(bytes: &[u8]) -> Result<EscrowedReward, EconomyError> {
        let record: EscrowedReward = Self::deserialize(bytes)?;
        if record.schema_version != ESCROW_SCHEMA_VERSION {
            return Err(EconomyError::SchemaMismatch {
                entity: "escrow",
                expected: ESCROW_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn decode_outcome(bytes: &[u8]) -> Result<TransactionOutcome, EconomyError> {
        let record: TransactionOutcome = Self::deserialize(bytes)?;
        if record.schema_version != OUTCOME_SCHEMA_VERSION {
            return Err(EconomyError::SchemaMismatch {
                entity: "outcome",
                expected: OUTCOME_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn finish<T>(result: Result<T, TransactionError<EconomyError>>) -> Result<T, EconomyError> {
        match result {
            Ok(value) => Ok(value),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(EconomyError::Storage(e)),
        }
    }
}

fn abort<T>(err: EconomyError) -> Result<T, ConflictableTransactionError<EconomyError>> {
    Err(ConflictableTransactionError::Abort(err))
}

fn decode_in_txn<T>(
    bytes: &IVec,
    decode: fn(&[u8]) -> Result<T, EconomyError>,
) -> Result<T, ConflictableTransactionError<EconomyError>> {
    decode(&bytes[..]).map_err(ConflictableTransactionError::Abort)
}

/// Pre-encoded writes, so the transaction closure can be re-run cheaply on conflict.
struct PreparedAccount {
    key: [u8; 8],
    expected_version: u64,
    bytes: Vec<u8>,
}

enum PreparedCooldown {
    Put { key: Vec<u8>, bytes: Vec<u8> },
    Remove { key: Vec<u8> },
}

struct PreparedEscrow {
    claim: bool,
    key: [u8; 16],
    pending_key: Vec<u8>,
    bytes: Vec<u8>,
}

struct PreparedOutcome {
    key: Vec<u8>,
    idempotency_key: Option<String>,
    bytes: Vec<u8>,
}

impl EconomyStore for LedgerStore {
    fn read_player(&self, id: PlayerId) -> Result<PlayerAccount, EconomyError> {
        let Some(bytes) = self.accounts.get(id.to_key())? else {
            return Err(EconomyError::NotFound(format!("player {}", id)));
        };
        Self::decode_account(&bytes)
    }

    fn list_players(&self) -> Result<Vec<PlayerAccount>, EconomyError> {
        let mut players = Vec::new();
        for entry in self.accounts.iter() {
            let (_, bytes) = entry?;
            players.push(Self::decode_account(&bytes)?);
        }
        Ok(players)
    }

    fn create_player(
        &self,
        registration: &Registration,
        balance: Balance,
        now: DateTime<Utc>,
    ) -> Result<PlayerAccount, EconomyError> {
        let id = PlayerId(self.db.generate_id()? + 1);
        let mut account = PlayerAccount::new(id, &registration.display_name, balance, now);
        account.status_tier = registration.status_tier;
        account.faction_id = registration.faction_id.clone();
        if let Some(link) = &registration.link {
            account.links.push(link.clone());
        }
        let bytes = Self::serialize(&account)?;
        let link_key = registration.link.as_ref().map(Self::link_key);
        let id_key = id.to_key();

        let result = (&self.accounts, &self.links).transaction(|(accounts, links)| {
            if let Some(link_key) = &link_key {
                if links.get(&link_key[..])?.is_some() {
                    return abort(EconomyError::InvalidArgument(
                        "external account is already linked".to_string(),
                    ));
                }
                links.insert(&link_key[..], &id_key[..])?;
            }
            accounts.insert(&id_key[..], bytes.as_slice())?;
            Ok(())
        });
        Self::finish(result)?;
        self.db.flush()?;
        Ok(account)
    }

    fn link_external(&self, id: PlayerId, link: ExternalLink) -> Result<PlayerAccount, EconomyError> {
        let link_key = Self::link_key(&link);
        let id_key = id.to_key();

        let result = (&self.accounts, &self.links).transaction(|(accounts, links)| {
            let Some(bytes) = accounts.get(&id_key[..])? else {
                return abort(EconomyError::NotFound(format!("player {}", id)));
            };
            let mut account = decode_in_txn(&bytes, Self::decode_account)?;
            if let Some(owner) = links.get(&link_key[..])? {
                if owner[..] == id_key[..] {
                    return Ok(account);
                }
                return abort(EconomyError::InvalidArgument(
                    "external account is already linked".to_string(),
                ));
            }
            account.links.push(link.clone());
            account.version += 1;
            let encoded = Self::serialize(&account).map_err(ConflictableTransactionError::Abort)?;
            accounts.insert(&id_key[..], encoded)?;
            links.insert(&link_key[..], &id_key[..])?;
            Ok(account)
        });
        let account = Self::finish(result)?;
        self.db.flush()?;
        Ok(account)
    }

    fn find_by_link(&self, link: &ExternalLink) -> Result<Option<PlayerId>, EconomyError> {
        let Some(bytes) = self.links.get(Self::link_key(link))? else {
            return Ok(None);
        };
        let raw = <[u8; 8]>::try_from(&bytes[..])
            .map_err(|_| EconomyError::Internal("corrupt link index entry".to_string()))?;
        Ok(Some(PlayerId(u64::from_be_bytes(raw))))
    }

    fn read_cooldowns(&self, id: PlayerId) -> Result<Vec<Cooldown>, EconomyError> {
        let mut cooldowns = Vec::new();
        for entry in self.cooldowns.scan_prefix(id.to_key()) {
            let (_, bytes) = entry?;
            cooldowns.push(Self::deserialize::<Cooldown>(&bytes)?);
        }
        Ok(cooldowns)
    }

    fn read_escrow(&self, escrow_id: Uuid) -> Result<EscrowedReward, EconomyError> {
        let Some(bytes) = self.escrow.get(escrow_id.as_bytes())? else {
            return Err(EconomyError::NotFound(format!("escrow {}", escrow_id)));
        };
        Self::decode_escrow(&bytes)
    }

    fn list_pending_escrow(&self, id: PlayerId) -> Result<Vec<EscrowedReward>, EconomyError> {
        let mut records = Vec::new();
        for entry in self.escrow_pending.scan_prefix(id.to_key()) {
            let (_, escrow_key) = entry?;
            if let Some(bytes) = self.escrow.get(&escrow_key)? {
                records.push(Self::decode_escrow(&bytes)?);
            }
        }
        Ok(records)
    }

    fn find_outcome_by_key(&self, key: &str) -> Result<Option<TransactionOutcome>, EconomyError> {
        let Some(outcome_key) = self.idempotency.get(key.as_bytes())? else {
            return Ok(None);
        };
        match self.outcomes.get(&outcome_key)? {
            Some(bytes) => Ok(Some(Self::decode_outcome(&bytes)?)),
            None => Err(EconomyError::Internal(format!(
                "idempotency key {} points at a missing outcome",
                key
            ))),
        }
    }

    fn recent_outcomes(
        &self,
        id: PlayerId,
        limit: usize,
    ) -> Result<Vec<TransactionOutcome>, EconomyError> {
        let mut outcomes = Vec::new();
        for entry in self.outcomes.scan_prefix(id.to_key()).rev().take(limit) {
            let (_, bytes) = entry?;
            outcomes.push(Self::decode_outcome(&bytes)?);
        }
        Ok(outcomes)
    }

    fn put_territory(&self, territory: Territory) -> Result<(), EconomyError> {
        let bytes = Self::serialize(&territory)?;
        self.territories
            .insert(territory.territory_id.as_bytes(), bytes)?;
        self.territories.flush()?;
        Ok(())
    }

    fn list_territories(&self) -> Result<Vec<Territory>, EconomyError> {
        let mut territories = Vec::new();
        for entry in self.territories.iter() {
            let (_, bytes) = entry?;
            territories.push(Self::deserialize::<Territory>(&bytes)?);
        }
        Ok(territories)
    }

    fn commit(&self, changeset: Changeset) -> Result<Vec<TransactionOutcome>, EconomyError> {
        let mut accounts = Vec::with_capacity(changeset.accounts.len());
        for mut account in changeset.accounts {
            let expected_version = account.version;
            account.version = expected_version + 1;
            account.schema_version = ACCOUNT_SCHEMA_VERSION;
            accounts.push(PreparedAccount {
                key: account.id.to_key(),
                expected_version,
                bytes: Self::serialize(&account)?,
            });
        }

        let mut cooldowns = Vec::with_capacity(changeset.cooldowns.len());
        for write in &changeset.cooldowns {
            cooldowns.push(match write {
                CooldownWrite::Set(cooldown) => PreparedCooldown::Put {
                    key: Self::cooldown_key(cooldown.player_id, cooldown.action.tag()),
                    bytes: Self::serialize(cooldown)?,
                },
                CooldownWrite::Clear { player_id, action } => PreparedCooldown::Remove {
                    key: Self::cooldown_key(*player_id, action.tag()),
                },
            });
        }

        let mut escrow = Vec::with_capacity(changeset.escrow.len());
        for write in &changeset.escrow {
            let record = write.record();
            escrow.push(PreparedEscrow {
                claim: matches!(write, EscrowWrite::Claim(_)),
                key: *record.id.as_bytes(),
                pending_key: Self::pending_key(record.player_id, record.created_at, record.id),
                bytes: Self::serialize(record)?,
            });
        }

        let mut recorded = Vec::with_capacity(changeset.outcomes.len());
        let mut outcomes = Vec::with_capacity(changeset.outcomes.len());
        for mut outcome in changeset.outcomes {
            outcome.id = self.db.generate_id()?;
            outcome.schema_version = OUTCOME_SCHEMA_VERSION;
            outcomes.push(PreparedOutcome {
                key: Self::outcome_key(outcome.player_id, outcome.id),
                idempotency_key: outcome.idempotency_key.clone(),
                bytes: Self::serialize(&outcome)?,
            });
            recorded.push(outcome);
        }

        let trees = (
            &self.accounts,
            &self.cooldowns,
            &self.escrow,
            &self.escrow_pending,
            &self.outcomes,
            &self.idempotency,
        );
        let result = trees.transaction(
            |(accounts_tx, cooldowns_tx, escrow_tx, pending_tx, outcomes_tx, idempotency_tx)| {
                for prepared in &accounts {
                    let Some(current) = accounts_tx.get(&prepared.key[..])? else {
                        return abort(EconomyError::NotFound(format!(
                            "player {}",
                            u64::from_be_bytes(prepared.key)
                        )));
                    };
                    let stored = decode_in_txn(&current, Self::decode_account)?;
                    if stored.version != prepared.expected_version {
                        return abort(EconomyError::Conflict);
                    }
                    accounts_tx.insert(&prepared.key[..], prepared.bytes.as_slice())?;
                }

                for prepared in &cooldowns {
                    match prepared {
                        PreparedCooldown::Put { key, bytes } => {
                            cooldowns_tx.insert(key.as_slice(), bytes.as_slice())?;
                        }
                        PreparedCooldown::Remove { key } => {
                            cooldowns_tx.remove(key.as_slice())?;
                        }
                    }
                }

                for prepared in &escrow {
                    let existing = escrow_tx.get(&prepared.key[..])?;
                    if prepared.claim {
                        let Some(existing) = existing else {
                            return abort(EconomyError::NotFound("escrow".to_string()));
                        };
                        if decode_in_txn(&existing, Self::decode_escrow)?.claimed {
                            return abort(EconomyError::AlreadyClaimed);
                        }
                        pending_tx.remove(prepared.pending_key.as_slice())?;
                    } else {
                        if existing.is_some() {
                            return abort(EconomyError::Internal(
                                "escrow id collision".to_string(),
                            ));
                        }
                        pending_tx.insert(prepared.pending_key.as_slice(), &prepared.key[..])?;
                    }
                    escrow_tx.insert(&prepared.key[..], prepared.bytes.as_slice())?;
                }

                for prepared in &outcomes {
                    if let Some(key) = &prepared.idempotency_key {
                        // Another unit of work recorded this key first; the retry replays it.
                        if idempotency_tx.get(key.as_bytes())?.is_some() {
                            return abort(EconomyError::Conflict);
                        }
                        idempotency_tx.insert(key.as_bytes(), prepared.key.as_slice())?;
                    }
                    outcomes_tx.insert(prepared.key.as_slice(), prepared.bytes.as_slice())?;
                }
                Ok(())
            },
        );
        Self::finish(result)?;
        self.db.flush()?;
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::types::{
        ActionKind, OutcomeDetails, OutcomeKind, Reward, StatusTier, Wealth,
    };
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> LedgerStore {
        LedgerStoreBuilder::new(dir.path()).open().expect("store")
    }

    fn starting_balance() -> Balance {
        Balance::new(Wealth::from(100u32), 100)
    }

    #[test]
    fn store_round_trip_player() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        let link = ExternalLink::new("Twitch", "alice_tv");
        let registration = Registration::new("alice")
            .with_link(link.clone())
            .with_tier(StatusTier::Vip)
            .with_faction("gulls");
        let created = store
            .create_player(&registration, starting_balance(), Utc::now())
            .expect("create");
        let fetched = store.read_player(created.id).expect("read");
        assert_eq!(fetched.display_name, "alice");
        assert_eq!(fetched.status_tier, StatusTier::Vip);
        assert_eq!(fetched.faction_id.as_deref(), Some("gulls"));
        assert_eq!(fetched.wealth(), &Wealth::from(100u32));
        assert_eq!(fetched.schema_version, ACCOUNT_SCHEMA_VERSION);
        assert_eq!(store.find_by_link(&link).unwrap(), Some(created.id));
    }

    #[test]
    fn duplicate_link_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        let link = ExternalLink::new("discord", "42");
        let first = store
            .create_player(&Registration::new("a").with_link(link.clone()), starting_balance(), Utc::now())
            .unwrap();
        let err = store
            .create_player(&Registration::new("b").with_link(link.clone()), starting_balance(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EconomyError::InvalidArgument(_)));

        let second = store
            .create_player(&Registration::new("b"), starting_balance(), Utc::now())
            .unwrap();
        assert!(store.link_external(second.id, link.clone()).is_err());
        let relinked = store.link_external(first.id, link).unwrap();
        assert_eq!(relinked.links.len(), 1);
    }

    #[test]
    fn stale_version_conflicts() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        let account = store
            .create_player(&Registration::new("c"), starting_balance(), Utc::now())
            .unwrap();

        let first = Changeset {
            accounts: vec![account.clone()],
            ..Changeset::default()
        };
        store.commit(first).expect("first commit");
        assert_eq!(store.read_player(account.id).unwrap().version, 1);

        let stale = Changeset {
            accounts: vec![account.clone()],
            ..Changeset::default()
        };
        assert!(matches!(store.commit(stale), Err(EconomyError::Conflict)));
        assert_eq!(store.read_player(account.id).unwrap().version, 1);
    }

    #[test]
    fn escrow_claim_lands_once() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        let now = Utc::now();
        let record = EscrowedReward::new(PlayerId(5), Reward::Crates { count: 2 }, now);
        store
            .commit(Changeset {
                escrow: vec![EscrowWrite::Deposit(record.clone())],
                ..Changeset::default()
            })
            .unwrap();
        assert_eq!(store.list_pending_escrow(PlayerId(5)).unwrap().len(), 1);

        let claimed = crate::economy::escrow::mark_claimed(record, now);
        store
            .commit(Changeset {
                escrow: vec![EscrowWrite::Claim(claimed.clone())],
                ..Changeset::default()
            })
            .unwrap();
        assert!(store.list_pending_escrow(PlayerId(5)).unwrap().is_empty());
        assert!(store.read_escrow(claimed.id).unwrap().claimed);

        let again = store.commit(Changeset {
            escrow: vec![EscrowWrite::Claim(claimed)],
            ..Changeset::default()
        });
        assert!(matches!(again, Err(EconomyError::AlreadyClaimed)));
    }

    #[test]
    fn outcomes_are_indexed_by_key_and_listed_newest_first() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        let now = Utc::now();
        for reason in ["one", "two", "three"] {
            let mut outcome = TransactionOutcome::new(
                ActionKind::Grant,
                PlayerId(8),
                OutcomeKind::Granted,
                OutcomeDetails::Grant {
                    reason: reason.to_string(),
                },
                now,
            );
            outcome.idempotency_key = Some(format!("evt-{}", reason));
            store
                .commit(Changeset {
                    outcomes: vec![outcome],
                    ..Changeset::default()
                })
                .unwrap();
        }

        let recent = store.recent_outcomes(PlayerId(8), 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(
            recent[0].details,
            OutcomeDetails::Grant {
                reason: "three".to_string()
            }
        );
        let found = store.find_outcome_by_key("evt-one").unwrap().unwrap();
        assert_eq!(found.idempotency_key.as_deref(), Some("evt-one"));
        assert!(store.find_outcome_by_key("evt-missing").unwrap().is_none());
    }

    #[test]
    fn territories_seed_only_once() {
        let dir = TempDir::new().expect("tempdir");
        let seeds = vec![TerritorySeed {
            territory_id: "docks".to_string(),
            controlling_faction_id: Some("gulls".to_string()),
            is_contested: false,
        }];
        {
            let store = LedgerStoreBuilder::new(dir.path())
                .with_territories(seeds.clone())
                .open()
                .unwrap();
            assert_eq!(store.list_territories().unwrap().len(), 1);
            store
                .put_territory(Territory {
                    territory_id: "docks".to_string(),
                    controlling_faction_id: None,
                    is_contested: true,
                })
                .unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.seed_territories_if_needed(&seeds).unwrap(), 0);
        assert!(store.list_territories().unwrap()[0].is_contested);
    }

    #[test]
    fn cooldown_writes_are_keyed_per_action() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir);
        let now = Utc::now();
        let set = |action| {
            CooldownWrite::Set(Cooldown {
                player_id: PlayerId(3),
                action,
                expires_at: now,
            })
        };
        store
            .commit(Changeset {
                cooldowns: vec![set(ActionKind::Play), set(ActionKind::Jail)],
                ..Changeset::default()
            })
            .unwrap();
        assert_eq!(store.read_cooldowns(PlayerId(3)).unwrap().len(), 2);
        store
            .commit(Changeset {
                cooldowns: vec![CooldownWrite::Clear {
                    player_id: PlayerId(3),
                    action: ActionKind::Jail,
                }],
                ..Changeset::default()
            })
            .unwrap();
        let left = store.read_cooldowns(PlayerId(3)).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].action, ActionKind::Play);
    }
}
