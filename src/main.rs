//! Binary entrypoint for the Lootline CLI.
//!
//! Commands:
//! - `init` - write a starter `lootline.toml`
//! - `register <name>` - open an account, optionally linked to a chat platform user
//! - `play`, `rob`, `bail`, `reroll`, `mission`, `open-crates`, `convert`, `buy`, `supply`,
//!   `claim`, `equip`, `grant` - run one economy action and print the receipt as JSON
//! - `status`, `escrow`, `leaderboard` - read-only views
//! - `simulate` - drive a throwaway ledger with seeded random play and print metrics
//!
//! Action commands act as the chat bot when `--secret` is given and as a web session otherwise.
//!
//! See the library crate docs for module-level details: `lootline::`.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use num_bigint::BigUint;
use serde::Serialize;
use uuid::Uuid;

use lootline::config::Config;
use lootline::economy::{
    BotAuthenticator, CallerContext, ChannelStatus, EconomyEngine, EconomyError,
    ExternalLink, LedgerStoreBuilder, ManualClock, PlayerId, Registration, SeededRandom,
    StatusTier, TargetRef,
};
use lootline::metrics;

/// Secret for the throwaway authenticator `simulate` uses to act as the bot.
const SIMULATE_BOT_SECRET: &str = "simulate-bot";

#[derive(Parser)]
#[command(name = "lootline")]
#[command(about = "Player economy transaction engine for chat-integrated stream games")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "lootline.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Bot shared secret; action commands run as the chat bot when present
    #[arg(long, global = true)]
    secret: Option<String>,

    /// Idempotency key attached to the action
    #[arg(short, long, global = true)]
    key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum TierArg {
    Regular,
    Subscriber,
    Vip,
}

impl From<TierArg> for StatusTier {
    fn from(t: TierArg) -> Self {
        match t {
            TierArg::Regular => StatusTier::Regular,
            TierArg::Subscriber => StatusTier::Subscriber,
            TierArg::Vip => StatusTier::Vip,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Open a new player account
    Register {
        name: String,
        /// Chat platform of the linked user (e.g. twitch)
        #[arg(long, requires = "external_id")]
        platform: Option<String>,
        /// User id on that platform
        #[arg(long, requires = "platform")]
        external_id: Option<String>,
        #[arg(long, value_enum, default_value = "regular")]
        tier: TierArg,
        #[arg(long)]
        faction: Option<String>,
    },
    /// Link an existing account to a chat platform user
    Link {
        player: u64,
        platform: String,
        external_id: String,
    },
    /// Show an account with its cooldowns, escrow and recent history
    Status {
        player: u64,
        #[arg(long, default_value_t = 5)]
        history: usize,
    },
    /// Play for coins
    Play {
        player: u64,
        /// Spend a bonus token for a bigger payout
        #[arg(long)]
        token: bool,
    },
    /// Rob another player (numeric id or platform:user)
    Rob { player: u64, target: String },
    /// Pay to get out of jail
    Bail { player: u64 },
    /// Reroll shop offers
    Reroll { player: u64 },
    /// Claim the mission reward
    Mission { player: u64 },
    /// Open crates; rewards land in escrow
    OpenCrates {
        player: u64,
        #[arg(default_value_t = 1)]
        count: u32,
    },
    /// Convert coins into a bonus token
    Convert { player: u64 },
    /// Buy one of the current shop offers
    Buy { player: u64, entry: String },
    /// Buy from the supply catalog
    Supply { player: u64, entry: String },
    /// Claim an escrowed reward
    Claim { player: u64, escrow_id: Uuid },
    /// List unclaimed escrow
    Escrow { player: u64 },
    /// Equip or unequip an inventory item
    Equip {
        player: u64,
        item: Uuid,
        #[arg(long)]
        off: bool,
    },
    /// Credit coins to a player (bot only)
    Grant {
        player: u64,
        amount: BigUint,
        #[arg(default_value = "manual grant")]
        reason: String,
    },
    /// Richest players
    Leaderboard {
        #[arg(default_value_t = 10)]
        limit: usize,
    },
    /// Run seeded random play against a scratch ledger and print metrics
    Simulate {
        /// Ledger directory to create (must not be the live ledger)
        #[arg(long)]
        ledger: String,
        #[arg(long, default_value_t = 12)]
        players: u32,
        #[arg(long, default_value_t = 40)]
        rounds: u32,
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        Config::create_default(&cli.config).await?;
        info!("Configuration file created at {}", cli.config);
        return Ok(());
    }

    let config = match Config::load(&cli.config).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}; using defaults (run `lootline init` to create one)");
            Config::default()
        }
    };
    init_logging(&Some(config.clone()), cli.verbose);
    config.validate()?;

    if let Commands::Simulate {
        ledger,
        players,
        rounds,
        seed,
    } = &cli.command
    {
        return simulate(&config, ledger, *players, *rounds, *seed).await;
    }

    let store = LedgerStoreBuilder::new(config.storage.ledger_path())
        .with_territories(config.economy.factions.territories.clone())
        .open()?;
    let engine = EconomyEngine::builder(config.economy.clone(), Arc::new(store))
        .with_live_status(Arc::new(ChannelStatus::new(config.channel.assume_live)))
        .build();
    let auth = BotAuthenticator::new(config.auth.bot_secret.as_deref());
    let caller = |player: u64| -> Result<CallerContext> {
        let id = PlayerId(player);
        match &cli.secret {
            Some(secret) => Ok(auth.authorize(secret, id)?),
            None => Ok(CallerContext::session(id)),
        }
    };
    let key = cli.key.as_deref();

    match &cli.command {
        Commands::Init | Commands::Simulate { .. } => Ok(()),
        Commands::Register {
            name,
            platform,
            external_id,
            tier,
            faction,
        } => {
            let mut registration = Registration::new(name).with_tier((*tier).into());
            if let (Some(platform), Some(external_id)) = (platform, external_id) {
                registration = registration.with_link(ExternalLink::new(platform, external_id));
            }
            if let Some(faction) = faction {
                registration = registration.with_faction(faction);
            }
            emit(engine.register_player(registration).await)
        }
        Commands::Link {
            player,
            platform,
            external_id,
        } => emit(
            engine
                .link_external(PlayerId(*player), ExternalLink::new(platform, external_id))
                .await
                .map(|()| serde_json::json!({ "linked": true })),
        ),
        Commands::Status { player, history } => {
            let id = PlayerId(*player);
            let view = async {
                let account = engine.player(id).await?;
                Ok::<_, EconomyError>(serde_json::json!({
                    "player": account.snapshot(),
                    "inventory": account.inventory,
                    "buffs": account.buffs,
                    "shop": account.shop,
                    "cooldowns": engine.cooldowns(id).await?,
                    "bail_quote": engine.bail_quote(id).await?,
                    "pending_escrow": engine.pending_escrow(id).await?.len(),
                    "recent": engine.recent_outcomes(id, *history).await?,
                }))
            };
            emit(view.await)
        }
        Commands::Play { player, token } => emit(engine.play(&caller(*player)?, *token, key).await),
        Commands::Rob { player, target } => {
            let target = parse_target(target)?;
            emit(engine.rob(&caller(*player)?, &target, key).await)
        }
        Commands::Bail { player } => emit(engine.bail(&caller(*player)?, key).await),
        Commands::Reroll { player } => emit(engine.reroll_shop(&caller(*player)?, key).await),
        Commands::Mission { player } => emit(engine.claim_mission(&caller(*player)?, key).await),
        Commands::OpenCrates { player, count } => {
            emit(engine.open_crates(&caller(*player)?, *count, key).await)
        }
        Commands::Convert { player } => emit(engine.convert_tokens(&caller(*player)?, key).await),
        Commands::Buy { player, entry } => {
            emit(engine.purchase(&caller(*player)?, entry, key).await)
        }
        Commands::Supply { player, entry } => {
            emit(engine.purchase_supply(&caller(*player)?, entry, key).await)
        }
        Commands::Claim { player, escrow_id } => {
            emit(engine.claim_escrow(&caller(*player)?, *escrow_id, key).await)
        }
        Commands::Escrow { player } => emit(engine.pending_escrow(PlayerId(*player)).await),
        Commands::Equip { player, item, off } => {
            emit(engine.equip_item(&caller(*player)?, *item, !*off).await)
        }
        Commands::Grant {
            player,
            amount,
            reason,
        } => emit(
            engine
                .grant(&caller(*player)?, amount.clone(), reason, key)
                .await,
        ),
        Commands::Leaderboard { limit } => emit(engine.leaderboard(*limit).await),
    }
}

/// `42` is a player id; `twitch:somebody` is a linked platform user.
fn parse_target(raw: &str) -> Result<TargetRef> {
    if let Ok(id) = raw.parse::<u64>() {
        return Ok(TargetRef::Id(PlayerId(id)));
    }
    match raw.split_once(':') {
        Some((platform, user)) if !platform.is_empty() && !user.is_empty() => {
            Ok(TargetRef::External(ExternalLink::new(platform, user)))
        }
        _ => Err(anyhow!("target must be a player id or platform:user, got {raw}")),
    }
}

/// Print a result as JSON. Rejections are printed too and end the process with status 1.
fn emit<T: Serialize>(result: Result<T, EconomyError>) -> Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            let payload = serde_json::json!({
                "error": e.code(),
                "message": e.to_string(),
                "retryable": e.is_retryable(),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
            std::process::exit(1);
        }
    }
}

async fn simulate(config: &Config, ledger: &str, players: u32, rounds: u32, seed: u64) -> Result<()> {
    if ledger == config.storage.ledger_path() {
        return Err(anyhow!("refusing to simulate against the configured ledger"));
    }
    let store = LedgerStoreBuilder::new(ledger)
        .with_territories(config.economy.factions.territories.clone())
        .open()?;
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let engine = EconomyEngine::builder(config.economy.clone(), Arc::new(store))
        .with_random(Box::new(SeededRandom::new(seed)))
        .with_clock(clock.clone())
        .build();

    let sim_bot = BotAuthenticator::new(Some(SIMULATE_BOT_SECRET));

    let mut ids = Vec::with_capacity(players as usize);
    for n in 0..players {
        ids.push(engine.register_player(Registration::new(&format!("sim{n}"))).await?.id);
    }
    let step = chrono::Duration::seconds(
        config
            .economy
            .play
            .cooldown_secs
            .max(config.economy.rob.cooldown_secs),
    );

    for round in 0..rounds {
        for (idx, id) in ids.iter().enumerate() {
            let caller = sim_bot.authorize(SIMULATE_BOT_SECRET, *id)?;
            let result = match (round as usize + idx) % 4 {
                0 | 1 => engine.play(&caller, false, None).await,
                2 => {
                    let victim = ids[(idx + 1 + round as usize) % ids.len()];
                    engine.rob(&caller, &TargetRef::Id(victim), None).await
                }
                _ => engine.convert_tokens(&caller, None).await,
            };
            if let Err(EconomyError::Jailed { .. }) = result {
                if let Err(e) = engine.bail(&caller, None).await {
                    warn!("simulate: {} stays in jail: {}", id, e);
                }
            }
        }
        clock.advance(step);
    }

    let report = serde_json::json!({
        "rounds": rounds,
        "players": players,
        "metrics": metrics::snapshot(),
        "top": engine.leaderboard(5).await?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // sled is chatty at debug
    builder.filter_module("sled", log::LevelFilter::Warn);

    let file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    match file {
        Some(f) => {
            let sink = std::sync::Mutex::new(f);
            // Mirror to the console only when a human is watching.
            let is_tty = atty::is(atty::Stream::Stderr);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = sink.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
