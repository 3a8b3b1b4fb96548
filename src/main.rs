use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use household_merge::db::EntityTable;
use household_merge::{
    derived_cache, get_all_households, household_counts, wipe_all_local_data, MergeConfig,
    MergeSnapshot, Store,
};

#[derive(Parser)]
#[command(name = "household-merge", version, about = "Inspect a local household store")]
struct Cli {
    /// JSON config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overrides the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the schema if it doesn't exist yet
    Setup,
    /// List households with live item/location counts
    Homes,
    /// Show what a merge snapshot would capture right now
    Snapshot,
    /// Delete every local record and the photo cache
    Wipe {
        /// Required; there is no undo
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MergeConfig::load(path)?,
        None => MergeConfig::default().with_env_overrides(),
    };
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let store = Store::open(&config.database_path)
        .with_context(|| format!("Failed to open store at {}", config.database_path.display()))?;

    match cli.command {
        Command::Setup => {
            println!("✓ Store ready at {}", config.database_path.display());
        }
        Command::Homes => run_homes(&store)?,
        Command::Snapshot => run_snapshot(&store)?,
        Command::Wipe { yes } => run_wipe(&store, &config, yes)?,
    }

    Ok(())
}

fn run_homes(store: &Store) -> Result<()> {
    let households = store.read(|conn| get_all_households(conn))?;

    if households.is_empty() {
        println!("No households in this store.");
        return Ok(());
    }

    println!("🏠 {} household(s)", households.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for household in households {
        let counts = store.read(|conn| household_counts(conn, &household.id))?;
        let origin = match &household.sync_record {
            Some(record) => format!("shared by {} ({})", record.owner_name, record.zone_name),
            None => "local".to_string(),
        };
        println!(
            "{}  {}  items: {}  locations: {}  [{}]",
            household.id, household.name, counts.items, counts.locations, origin
        );
    }

    Ok(())
}

fn run_snapshot(store: &Store) -> Result<()> {
    let snapshot = MergeSnapshot::capture(store).context("Failed to capture snapshot")?;

    println!("📸 Snapshot: {} record(s)", snapshot.total());
    for table in EntityTable::ALL {
        println!("  {:<20} {}", table.table_name(), snapshot.ids(table).len());
    }

    Ok(())
}

fn run_wipe(store: &Store, config: &MergeConfig, confirmed: bool) -> Result<()> {
    if !confirmed {
        println!("Refusing to wipe without --yes");
        return Ok(());
    }

    let cache = derived_cache(config);
    let summary = wipe_all_local_data(store, cache.as_ref()).context("Failed to wipe local data")?;

    println!("🧹 Wiped {} record(s)", summary.total());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  households           {}", summary.households);
    println!("  locations            {}", summary.locations);
    println!("  items                {}", summary.items);
    println!("  labels               {}", summary.labels);
    println!("  insurance_policies   {}", summary.policies);

    Ok(())
}
