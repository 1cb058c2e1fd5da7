//! CLI definition and dispatch.
//!
//! Thin presentation adapter over the engine's command surface. Every
//! command returns a structured result or a tagged error mapped to a
//! process exit code; `--json` renders results for a dashboard
//! collaborator.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_feed_adapter::CsvFeedAdapter;
use crate::adapters::file_config_adapter::{build_sim_config, FileConfigAdapter};
#[cfg(feature = "sqlite")]
use crate::adapters::sqlite_store_adapter::SqliteStoreAdapter;
use crate::domain::asset::{infer_class, normalize_symbol, AssetClass};
use crate::domain::engine::{SimContext, SimulationEngine, StalePolicy};
use crate::domain::error::PapertradeError;
use crate::domain::price_cache::PriceCache;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_feed_port::PriceFeed;
use crate::ports::store_port::StorePort;

#[derive(Parser, Debug)]
#[command(name = "papertrade", about = "Educational market trading simulator")]
pub struct Cli {
    /// Path to the INI configuration file
    #[arg(short, long, global = true, default_value = "papertrade.ini")]
    pub config: PathBuf,

    /// Emit results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new player
    CreatePlayer {
        #[arg(long)]
        name: String,
        /// Override the configured starting cash
        #[arg(long)]
        cash: Option<f64>,
    },
    /// Register a tradable asset
    RegisterAsset {
        #[arg(long)]
        symbol: String,
        /// equity or crypto; inferred from the symbol when omitted
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        exchange: Option<String>,
    },
    /// Buy an asset at the current quoted price
    Buy {
        #[arg(long)]
        player: u64,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        quantity: f64,
        /// Fail instead of filling against a stale fallback quote
        #[arg(long)]
        reject_stale: bool,
    },
    /// Sell an asset at the current quoted price
    Sell {
        #[arg(long)]
        player: u64,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        quantity: f64,
    },
    /// Show a player's portfolio
    Portfolio {
        #[arg(long)]
        player: u64,
    },
    /// Manage a player's watchlist
    Watchlist {
        #[command(subcommand)]
        action: WatchlistCommand,
    },
    /// Rank all players by portfolio value
    Leaderboard,
    /// Show a player's transaction history
    History {
        #[arg(long)]
        player: u64,
    },
    /// List registered assets
    ListAssets,
}

#[derive(Subcommand, Debug)]
pub enum WatchlistCommand {
    Add {
        #[arg(long)]
        player: u64,
        #[arg(long)]
        symbol: String,
    },
    Remove {
        #[arg(long)]
        player: u64,
        #[arg(long)]
        symbol: String,
    },
    List {
        #[arg(long)]
        player: u64,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(&err)
        }
    }
}

fn dispatch(cli: &Cli) -> Result<(), PapertradeError> {
    let config =
        FileConfigAdapter::from_file(&cli.config).map_err(|e| PapertradeError::ConfigParse {
            file: cli.config.display().to_string(),
            reason: e.to_string(),
        })?;
    let engine = build_engine(&config)?;
    execute(&engine, cli)
}

/// Wire the engine from configuration: CSV feed, price cache, and (with a
/// `[sqlite] path`) a durable store restored into the context.
pub fn build_engine(config: &dyn ConfigPort) -> Result<SimulationEngine, PapertradeError> {
    let sim_config = build_sim_config(config);
    sim_config.validate()?;

    let csv_dir =
        config
            .get_string("feed", "csv_dir")
            .ok_or_else(|| PapertradeError::ConfigMissing {
                section: "feed".into(),
                key: "csv_dir".into(),
            })?;
    let feed: Arc<dyn PriceFeed> = Arc::new(CsvFeedAdapter::new(PathBuf::from(csv_dir)));
    let cache = Arc::new(PriceCache::new(feed, sim_config.cache));

    match build_store(config)? {
        Some(store) => {
            let ctx = Arc::new(SimContext::restore(store.as_ref())?);
            Ok(SimulationEngine::new(ctx, cache, sim_config).with_store(store))
        }
        None => Ok(SimulationEngine::new(
            Arc::new(SimContext::new()),
            cache,
            sim_config,
        )),
    }
}

#[cfg(feature = "sqlite")]
fn build_store(config: &dyn ConfigPort) -> Result<Option<Arc<dyn StorePort>>, PapertradeError> {
    if config.get_string("sqlite", "path").is_none() {
        return Ok(None);
    }
    let store = SqliteStoreAdapter::from_config(config)?;
    store.initialize_schema()?;
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "sqlite"))]
fn build_store(_config: &dyn ConfigPort) -> Result<Option<Arc<dyn StorePort>>, PapertradeError> {
    Ok(None)
}

fn execute(engine: &SimulationEngine, cli: &Cli) -> Result<(), PapertradeError> {
    match &cli.command {
        Command::CreatePlayer { name, cash } => {
            let player = match cash {
                Some(cash) => engine.create_player_with_cash(name, *cash)?,
                None => engine.create_player(name)?,
            };
            if cli.json {
                print_json(&player)?;
            } else {
                println!(
                    "created player {} ({}) with {:.2} cash",
                    player.id, player.name, player.starting_cash
                );
            }
        }
        Command::RegisterAsset {
            symbol,
            class,
            exchange,
        } => {
            let class = match class {
                Some(value) => {
                    AssetClass::parse(value).ok_or_else(|| PapertradeError::ConfigInvalid {
                        section: "asset".into(),
                        key: "class".into(),
                        reason: "expected equity or crypto".into(),
                    })?
                }
                None => infer_class(&normalize_symbol(symbol)),
            };
            let asset = engine.register_asset(symbol, class, exchange.as_deref())?;
            if cli.json {
                print_json(&asset)?;
            } else {
                println!("registered {} ({})", asset.symbol, asset.class.as_str());
            }
        }
        Command::Buy {
            player,
            symbol,
            quantity,
            reject_stale,
        } => {
            let policy = if *reject_stale {
                StalePolicy::Reject
            } else {
                StalePolicy::Accept
            };
            let receipt = engine.buy(*player, symbol, *quantity, policy)?;
            if cli.json {
                print_json(&receipt)?;
            } else {
                let txn = &receipt.transaction;
                println!(
                    "bought {} {} @ {:.2} (fee {:.2}); cash {:.2}",
                    txn.quantity, txn.symbol, txn.price, txn.fee, txn.cash_after
                );
            }
        }
        Command::Sell {
            player,
            symbol,
            quantity,
        } => {
            let receipt = engine.sell(*player, symbol, *quantity)?;
            if cli.json {
                print_json(&receipt)?;
            } else {
                let txn = &receipt.transaction;
                println!(
                    "sold {} {} @ {:.2} (fee {:.2}); cash {:.2}",
                    txn.quantity, txn.symbol, txn.price, txn.fee, txn.cash_after
                );
                if let Some(pnl) = receipt.realized_pnl {
                    println!("realized P&L {pnl:+.2}");
                }
            }
        }
        Command::Portfolio { player } => {
            let view = engine.portfolio_view(*player)?;
            if cli.json {
                print_json(&view)?;
            } else {
                println!("{} (player {})", view.name, view.player_id);
                println!("cash: {:.2}", view.cash);
                for holding in &view.holdings {
                    let marker = if holding.price_degraded { " *" } else { "" };
                    println!(
                        "  {:<10} {:>12.4} @ {:>10.2} = {:>12.2} (P&L {:+.2}){}",
                        holding.symbol,
                        holding.quantity,
                        holding.last_price,
                        holding.market_value,
                        holding.unrealized_pnl,
                        marker
                    );
                }
                let qualifier = if view.partial { " (partial)" } else { "" };
                println!("total value: {:.2}{}", view.total_value, qualifier);
            }
        }
        Command::Watchlist { action } => match action {
            WatchlistCommand::Add { player, symbol } => {
                let added = engine.watchlist_add(*player, symbol)?;
                if cli.json {
                    print_json(&WatchlistChange { changed: added })?;
                } else if added {
                    println!("added {} to watchlist", normalize_symbol(symbol));
                } else {
                    println!("{} already on watchlist", normalize_symbol(symbol));
                }
            }
            WatchlistCommand::Remove { player, symbol } => {
                let removed = engine.watchlist_remove(*player, symbol)?;
                if cli.json {
                    print_json(&WatchlistChange { changed: removed })?;
                } else if removed {
                    println!("removed {} from watchlist", normalize_symbol(symbol));
                } else {
                    println!("{} was not on watchlist", normalize_symbol(symbol));
                }
            }
            WatchlistCommand::List { player } => {
                let symbols = engine.watchlist(*player)?;
                if cli.json {
                    print_json(&symbols)?;
                } else if symbols.is_empty() {
                    println!("watchlist is empty");
                } else {
                    for symbol in symbols {
                        println!("{symbol}");
                    }
                }
            }
        },
        Command::Leaderboard => {
            let entries = engine.leaderboard();
            if cli.json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("no players yet");
            } else {
                for entry in entries {
                    let qualifier = if entry.partial { " (partial)" } else { "" };
                    println!(
                        "{:>3}. {:<20} {:>14.2}{}",
                        entry.rank, entry.name, entry.total_value, qualifier
                    );
                }
            }
        }
        Command::History { player } => {
            let transactions = engine.history(*player)?;
            if cli.json {
                print_json(&transactions)?;
            } else if transactions.is_empty() {
                println!("no trades yet");
            } else {
                for txn in transactions {
                    println!(
                        "#{:<4} {} {:<4} {:>12.4} {:<10} @ {:>10.2} fee {:>8.2} cash {:>12.2}",
                        txn.id,
                        txn.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        txn.side.as_str(),
                        txn.quantity,
                        txn.symbol,
                        txn.price,
                        txn.fee,
                        txn.cash_after
                    );
                }
            }
        }
        Command::ListAssets => {
            let assets = engine.context().assets();
            if cli.json {
                print_json(&assets)?;
            } else if assets.is_empty() {
                println!("no assets registered");
            } else {
                for asset in assets {
                    let exchange = asset.exchange.as_deref().unwrap_or("-");
                    println!("{:<10} {:<7} {}", asset.symbol, asset.class.as_str(), exchange);
                }
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct WatchlistChange {
    changed: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), PapertradeError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| PapertradeError::Io(std::io::Error::other(e)))?;
    println!("{rendered}");
    Ok(())
}
