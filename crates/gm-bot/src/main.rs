use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nostr_sdk::ToBech32;
use tokio::sync::watch;

use gm_core::{
    keys, logging, BotConfig, CommandParser, DedupGuard, Dispatcher, EventStore, NdbStore,
    PoolRelaySet, RelaySet, ReplyPublisher, StatsEngine,
};

#[derive(Parser)]
#[command(name = "gm-bot")]
#[command(about = "Answers GM statistics requests from the relay's stored notes")]
#[command(
    long_about = "Answers GM statistics requests from the relay's stored notes.\n\n\
        gm-bot only reads the nostrdb directory. The relay process that accepts \
        notes fills it, admitting them through gm_core::AdmissionPolicy \
        (registered as a gm_core::WritePolicy)."
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// nostrdb directory shared with the relay
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Relay to listen and publish on; repeat to give several. Replaces the
    /// configured list.
    #[arg(long = "relay")]
    relays: Vec<String>,
}

fn load_config(cli: &Cli) -> Result<BotConfig> {
    let mut config = match &cli.config {
        Some(path) => BotConfig::load(path)?,
        None => BotConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if !cli.relays.is_empty() {
        config.relays = cli.relays.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).context("failed to load configuration")?;
    let keys = keys::load_from_env().context("failed to load bot key")?;

    tracing::info!(
        npub = %keys.public_key().to_bech32().unwrap_or_else(|_| keys.public_key().to_hex()),
        relays = config.relays.len(),
        data_dir = %config.data_dir.display(),
        "starting gm-bot"
    );

    let store: Arc<dyn EventStore> = Arc::new(
        NdbStore::open(&config.data_dir)
            .with_context(|| format!("failed to open store at {}", config.data_dir.display()))?,
    );
    let pool = Arc::new(
        PoolRelaySet::connect(&keys, &config.relays, config.connect_timeout())
            .await
            .context("failed to set up relay pool")?,
    );
    let relays: Arc<dyn RelaySet> = pool.clone();

    let guard = Arc::new(DedupGuard::new(relays.clone(), keys.public_key(), &config));
    let stats = StatsEngine::new(store, relays.clone(), guard.clone(), &config);
    let publisher = ReplyPublisher::new(relays.clone(), keys.clone(), &config);
    let parser = CommandParser::new(&config.command_keywords)?;
    let dispatcher = Arc::new(Dispatcher::new(
        relays,
        parser,
        guard,
        stats,
        publisher,
        keys.public_key(),
        &config,
    ));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let worker = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(cancel_rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    let _ = cancel_tx.send(true);
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "dispatcher task failed");
    }
    pool.disconnect().await;

    Ok(())
}
