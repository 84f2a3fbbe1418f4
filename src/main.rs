//! Roundhouse binary
//!
//! Opens every configured table against an in-memory wallet, optionally
//! with simulated players, and runs until interrupted.

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roundhouse::{
    config::generate_sample_config,
    games::types::{
        AndarBaharSide, BaccaratBet, BetKind, DragonTigerSide, FiveDBet, GameType, K3Bet, Multiplier, Parity,
        Phase, RouletteBet, SicBoBet, Size, TeenPattiSide, UserId, WinGoColor,
    },
    logging::init_tracing,
    AutoRule, BetRequest, Casino, ConfigLoader, EngineResult, InMemoryWallet, TableEvent, TableHandle,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Roundhouse casino round engine
#[derive(Parser)]
#[command(name = "roundhouse")]
#[command(about = "Round-based casino outcome and settlement engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(short, long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured table
    Run {
        /// Simulated players per table
        #[arg(short, long, default_value = "0")]
        demo_players: usize,

        /// Starting balance of each simulated player
        #[arg(short, long, default_value = "100000")]
        balance: u64,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// Write a sample configuration file
    GenerateConfig {
        #[arg(short, long, default_value = "roundhouse.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> EngineResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateConfig { output } => {
            generate_sample_config(&output.to_string_lossy())?;
            println!("Sample configuration written to {}", output.display());
            Ok(())
        }
        Commands::Run {
            demo_players,
            balance,
            seconds,
        } => {
            let mut loader = ConfigLoader::new();
            if let Some(path) = &cli.config {
                loader = loader.with_path(path);
            }
            let config = loader.load()?;
            init_tracing(cli.log_level.as_deref().unwrap_or(&config.logging.level));
            run(config, demo_players, balance, seconds).await
        }
    }
}

async fn run(
    config: roundhouse::EngineConfig,
    demo_players: usize,
    balance: u64,
    seconds: Option<u64>,
) -> EngineResult<()> {
    let wallet = Arc::new(InMemoryWallet::new());
    let casino = Casino::builder(config).with_wallet(wallet.clone()).build()?;
    info!(
        tables = casino.table_ids().len(),
        fairness_key = %casino.fairness_key(),
        "Casino running"
    );

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    for table_id in casino.table_ids() {
        let table = casino.table(&table_id)?;
        tasks.push(tokio::spawn(log_events(table.clone())));

        for n in 0..demo_players {
            let user_id = UserId(format!("{}-player-{}", table_id, n));
            wallet.deposit(&user_id, balance);
            tasks.push(tokio::spawn(demo_player(table.clone(), user_id)));
        }
    }

    match seconds {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutting down");
    casino.shutdown().await;
    for task in tasks {
        task.abort();
    }

    println!("{}", casino.metrics().to_prometheus_format());
    Ok(())
}

async fn log_events(table: Arc<TableHandle>) {
    let mut events = table.subscribe();
    loop {
        match events.recv().await {
            Ok(TableEvent::OutcomeRevealed { round_id, outcome, .. }) => {
                let outcome = serde_json::to_string(&outcome).unwrap_or_default();
                info!(round = %round_id, %outcome, "Outcome revealed");
            }
            Ok(TableEvent::RoundVoided { round_id, reason, refunded }) => {
                warn!(round = %round_id, %reason, refunded, "Round voided");
            }
            Ok(TableEvent::CashedOut { user_id, multiplier, automatic, .. }) => {
                debug!(user = %user_id, %multiplier, automatic, "Cash-out");
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(table = %table.id(), skipped, "Event logger lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Place one random bet every round while the player can afford it
async fn demo_player(table: Arc<TableHandle>, user_id: UserId) {
    let mut rng = StdRng::from_entropy();
    let game = table.config().game_type;
    let limits = table.config().stakes;

    if game.is_continuous() {
        let target = Multiplier::from_hundredths(rng.gen_range(110..=400));
        let rule = AutoRule {
            cash_out_at: Some(target),
            auto_rebet: false,
        };
        if let Err(e) = table.register_auto_action(user_id.clone(), 0, rule) {
            warn!(user = %user_id, error = %e, "Auto cash-out not registered");
        }
    }

    let mut snapshots = table.watch();
    let mut last_round = 0;
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        if snapshot.round.phase == Phase::Betting && snapshot.round.id.number != last_round {
            last_round = snapshot.round.id.number;
            let stake = rng.gen_range(limits.min..=limits.max.min(limits.min * 50));
            let request = BetRequest {
                user_id: user_id.clone(),
                slot: 0,
                kind: random_bet(game, &mut rng),
                stake,
            };
            match table.place_bet(request).await {
                Ok(bet) => debug!(user = %user_id, bet = %bet.id, stake, "Demo bet placed"),
                Err(e) if e.code() == "insufficient_funds" => {
                    info!(user = %user_id, "Demo player out of funds");
                    return;
                }
                Err(e) => debug!(user = %user_id, error = %e, "Demo bet rejected"),
            }
        }
        if snapshots.changed().await.is_err() {
            return;
        }
    }
}

fn random_bet(game: GameType, rng: &mut StdRng) -> BetKind {
    let size = if rng.gen_bool(0.5) { Size::Big } else { Size::Small };
    match game {
        GameType::WinGo => match rng.gen_range(0..3) {
            0 => BetKind::WinGoNumber(rng.gen_range(0..=9)),
            1 => BetKind::WinGoColor([WinGoColor::Red, WinGoColor::Green, WinGoColor::Violet][rng.gen_range(0..3)]),
            _ => BetKind::WinGoSize(size),
        },
        GameType::Aviator => BetKind::Crash,
        GameType::Mines => {
            let picks = rng.gen_range(1..=3);
            let cells = rand::seq::index::sample(rng, 25, picks);
            BetKind::MinesPicks(cells.iter().map(|c| c as u8).collect())
        }
        GameType::DragonTiger => BetKind::DragonTiger(
            [DragonTigerSide::Dragon, DragonTigerSide::Tiger, DragonTigerSide::Tie][rng.gen_range(0..3)],
        ),
        GameType::Baccarat => BetKind::Baccarat(
            [BaccaratBet::Player, BaccaratBet::Banker, BaccaratBet::Tie, BaccaratBet::PlayerPair][rng.gen_range(0..4)],
        ),
        GameType::TeenPatti => BetKind::TeenPatti(
            [TeenPattiSide::PlayerA, TeenPattiSide::PlayerB][rng.gen_range(0..2)],
        ),
        GameType::AndarBahar => BetKind::AndarBahar(
            [AndarBaharSide::Andar, AndarBaharSide::Bahar][rng.gen_range(0..2)],
        ),
        GameType::SicBo => match rng.gen_range(0..3) {
            0 => BetKind::SicBo(if size == Size::Big { SicBoBet::Big } else { SicBoBet::Small }),
            1 => BetKind::SicBo(SicBoBet::Single(rng.gen_range(1..=6))),
            _ => BetKind::SicBo(SicBoBet::Total(rng.gen_range(4..=17))),
        },
        GameType::K3 => match rng.gen_range(0..3) {
            0 => BetKind::K3(K3Bet::Sum(rng.gen_range(3..=18))),
            1 => BetKind::K3(K3Bet::Size(size)),
            _ => BetKind::K3(K3Bet::Parity(if rng.gen_bool(0.5) { Parity::Odd } else { Parity::Even })),
        },
        GameType::FiveD => match rng.gen_range(0..3) {
            0 => BetKind::FiveD(FiveDBet::Digit {
                position: rng.gen_range(0..5),
                digit: rng.gen_range(0..=9),
            }),
            1 => BetKind::FiveD(FiveDBet::PositionSize {
                position: rng.gen_range(0..5),
                size,
            }),
            _ => BetKind::FiveD(FiveDBet::SumSize(size)),
        },
        GameType::Roulette => match rng.gen_range(0..3) {
            0 => BetKind::Roulette(RouletteBet::Straight(rng.gen_range(0..=36))),
            1 => BetKind::Roulette([RouletteBet::Red, RouletteBet::Black][rng.gen_range(0..2)]),
            _ => BetKind::Roulette(RouletteBet::Dozen(rng.gen_range(1..=3))),
        },
    }
}
