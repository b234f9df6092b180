//! `repertoire` - build and inspect a player's opening repertoire.
//!
//! `repertoire build <player>` replays the player's games against an opening
//! directory, scores every recognised position with Stockfish and stores the
//! resulting tree. `repertoire show <player>` prints per-opening statistics
//! from a stored tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chess::{PlayerColour, PositionKey};
use engine::{EngineConfig, StockfishEvaluator};
use openings::{config, GameCache, OpeningDirectory, OpeningTree, TreeStore};

mod table;

#[derive(Parser)]
#[command(name = "repertoire", about = "Opening repertoire statistics from your games")]
struct Cli {
    /// Where trees and game caches are stored.
    #[arg(long, global = true, env = "REPERTOIRE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Write logs to daily files in this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) a player's opening tree.
    Build(BuildArgs),
    /// Print opening statistics from a stored tree.
    Show(ShowArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Player name as it appears in the White/Black headers.
    player: String,

    /// A multi-game PGN file or a JSON array of PGN strings. Defaults to the
    /// games cached by the previous build.
    #[arg(short, long)]
    games: Option<PathBuf>,

    /// Opening directory: a JSON array of `{eco, name, fen, moves}` rows.
    #[arg(short, long, env = "REPERTOIRE_DIRECTORY")]
    directory: PathBuf,

    /// Parallel workers, one engine each.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Engine search depth per position.
    #[arg(long)]
    depth: Option<u8>,

    /// Stockfish binary.
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Rebuild even if a tree is already stored.
    #[arg(short, long)]
    force: bool,
}

#[derive(Args)]
struct ShowArgs {
    player: String,

    /// Only games where the player had this colour.
    #[arg(short, long)]
    colour: Option<PlayerColour>,

    /// Restrict to lines through this position.
    #[arg(long, conflicts_with = "name")]
    fen: Option<String>,

    /// Restrict to lines through the named opening at `--ply`.
    #[arg(long, requires = "ply")]
    name: Option<String>,

    #[arg(long)]
    ply: Option<usize>,

    /// Hide openings seen fewer times than this.
    #[arg(short, long, default_value_t = 1)]
    min_occurrence: usize,
}

fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "repertoire");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();
    Ok(Some(guard))
}

async fn build(data_dir: &Path, args: BuildArgs) -> anyhow::Result<()> {
    let trees = TreeStore::new(data_dir);
    if !args.force {
        if let Some(tree) = trees.load(&args.player)? {
            println!(
                "Tree for {} already built ({} openings); pass --force to rebuild.",
                args.player,
                tree.node_count() - 1
            );
            return Ok(());
        }
    }

    let cache = GameCache::new(data_dir);
    let games = match &args.games {
        Some(path) => openings::load_games(path)
            .with_context(|| format!("Failed to read games from {}", path.display()))?,
        None => match cache.load(&args.player)? {
            Some(games) => games,
            None => bail!("No cached games for {}; pass --games", args.player),
        },
    };

    let directory = OpeningDirectory::load(&args.directory).with_context(|| {
        format!(
            "Failed to load opening directory {}",
            args.directory.display()
        )
    })?;

    let workers = args.workers.unwrap_or_else(config::get_worker_count).max(1);
    let depth = args.depth.unwrap_or_else(config::get_analysis_depth);
    let engine_config = EngineConfig {
        path: args.engine.clone().or_else(config::get_stockfish_path),
        ..Default::default()
    };

    tracing::info!(workers, depth, "Starting engines");
    let mut evaluators = Vec::with_capacity(workers);
    for _ in 0..workers {
        let evaluator = StockfishEvaluator::spawn(engine_config.clone(), depth)
            .await
            .context("Failed to start Stockfish")?;
        evaluators.push(evaluator);
    }

    let output = openings::build_tree(
        games.clone(),
        &args.player,
        Arc::new(directory),
        evaluators,
    )
    .await?;

    for evaluator in output.evaluators {
        evaluator.shutdown().await;
    }

    trees.save(&args.player, &output.tree)?;
    if args.games.is_some() {
        cache.save(&args.player, &games)?;
    }

    println!("{}: {}", args.player, output.report);
    println!("{} openings recorded", output.tree.node_count() - 1);
    Ok(())
}

/// Narrow a stored tree to what `show` was asked for.
fn select(tree: OpeningTree, args: &ShowArgs) -> anyhow::Result<OpeningTree> {
    let tree = match (&args.fen, &args.name, args.ply) {
        (Some(fen), _, _) => {
            let key = PositionKey::canonicalize(fen)?;
            tree.filter_by_opening(&key)
        }
        (None, Some(name), Some(ply)) => match tree.find_by_name_and_ply(name, ply) {
            Some(opening) => tree.filter_by_opening(opening.key()),
            None => bail!("No opening named {name:?} at ply {ply}"),
        },
        _ => tree,
    };

    Ok(match args.colour {
        Some(colour) => tree.partition_by_colour(colour),
        None => tree,
    })
}

fn show(data_dir: &Path, args: ShowArgs) -> anyhow::Result<()> {
    let Some(tree) = TreeStore::new(data_dir).load(&args.player)? else {
        bail!("No tree stored for {}; run `repertoire build` first", args.player);
    };

    let tree = select(tree, &args)?;
    let rows = openings::strength_summary(&tree, args.min_occurrence);
    print!("{}", table::render(&rows));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref())?;

    let data_dir = cli.data_dir.unwrap_or_else(config::get_data_dir);
    tracing::debug!("Using data directory: {}", data_dir.display());

    match cli.command {
        Commands::Build(args) => build(&data_dir, args).await,
        Commands::Show(args) => show(&data_dir, args),
    }
}
