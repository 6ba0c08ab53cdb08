mod gateway;

use clap::{Parser, Subcommand};
use gateway::{Gateway, LaunchServices, StagePolicies};
use mintwatch_core::{
    command::CommandInterpreter,
    config::{self, shellexpand, Config},
    traits::KeyProvider,
};
use mintwatch_feed::{BrowserFeed, ChromeDriver, FeedScanner, ReplyDispatcher, SessionManager};
use mintwatch_launch::{
    HttpAssetSource, HttpIssuanceService, LocalKeyProvider, PinataAssetStore, PoolKeyProvider,
};
use mintwatch_memory::Store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "mintwatch",
    version,
    about = "mintwatch: launches tokens from social feed mentions"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "MINTWATCH_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the poll loop.
    Start,
    /// Show configuration and store summary.
    Status,
    /// List unfinished and failed claims for reconciliation.
    Claims {
        /// How many failed claims to show.
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// Dry-run the command interpreter on a post text.
    Parse {
        /// The post text.
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load(&cli.config)?;
    cfg.apply_env_overrides()?;
    cfg.validate()?;

    let _log_guard = init_logging(&cfg, matches!(cli.command, Commands::Start))?;

    match cli.command {
        Commands::Start => start(cfg).await?,
        Commands::Status => {
            println!("mintwatch status\n");
            println!("Config: {}", cli.config);
            println!("Handle: @{}", cfg.bot.handle);
            println!("Search query: {}", cfg.bot.search_query);
            println!("Poll interval: {}s", cfg.bot.poll_interval_secs);
            println!(
                "Chrome: {}",
                if cfg.browser.chrome_path.is_empty() {
                    "auto-detect"
                } else {
                    cfg.browser.chrome_path.as_str()
                }
            );
            println!(
                "Feed credentials: {}",
                if cfg.auth.username.is_empty() || cfg.auth.password.is_empty() {
                    "missing"
                } else {
                    "configured"
                }
            );
            println!(
                "Asset store: {}",
                if cfg.assets.jwt.is_empty() {
                    "missing JWT"
                } else {
                    "configured"
                }
            );
            println!(
                "Key provider: {}",
                if cfg.issuance.use_key_pool {
                    "pool"
                } else {
                    "local"
                }
            );
            println!();

            let store = Store::new(&cfg.memory).await?;
            println!("Claims:");
            let counts = store.claim_counts().await?;
            if counts.is_empty() {
                println!("  (none)");
            }
            for (status, count) in counts {
                println!("  {status}: {count}");
            }
            println!("Processed mentions: {}", store.processed_count().await?);
        }
        Commands::Claims { limit } => {
            let store = Store::new(&cfg.memory).await?;
            let pending = store.pending_claims().await?;
            println!("Unfinished claims ({}):", pending.len());
            for claim in &pending {
                println!(
                    "  {} ${} {} since {}{}",
                    claim.mention_id,
                    claim.request.symbol,
                    claim.status,
                    claim.created_at.format("%Y-%m-%d %H:%M:%S"),
                    if claim.issuance_started_at.is_some() {
                        " [issuance started]"
                    } else {
                        ""
                    }
                );
            }
            let failed = store.failed_claims(limit).await?;
            println!("\nFailed claims ({}):", failed.len());
            for claim in &failed {
                println!(
                    "  {} ${} {} at {} authority={}",
                    claim.mention_id,
                    claim.request.symbol,
                    claim.status,
                    claim.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    claim.authority.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Parse { text } => {
            if text.is_empty() {
                anyhow::bail!("no text provided. Usage: mintwatch parse <text>");
            }
            let text = text.join(" ");
            let interpreter = CommandInterpreter::new(&cfg.bot.handle);
            match interpreter.interpret(&text, "dry-run") {
                Some(request) => println!("{}", serde_json::to_string_pretty(&request)?),
                None => println!("not a launch command for @{}", cfg.bot.handle),
            }
        }
    }

    Ok(())
}

/// Wire up the adapters and run the gateway until shutdown.
async fn start(cfg: Config) -> anyhow::Result<()> {
    let retry = &cfg.retry;
    let memory = Store::new(&cfg.memory).await?;

    println!("mintwatch starting...");
    let driver = Arc::new(ChromeDriver::launch(&cfg.browser).await?);
    let feed = Arc::new(BrowserFeed::new(driver.clone(), &cfg.browser, &cfg.auth));
    let session = Arc::new(SessionManager::new(
        feed.clone(),
        retry.policy(retry.auth_attempts),
    ));
    let scanner = FeedScanner::new(
        feed.clone(),
        session.clone(),
        retry.policy(retry.scan_attempts),
        cfg.bot.search_query.clone(),
    );
    let replies = ReplyDispatcher::new(feed, session.clone(), retry.policy(retry.reply_attempts));

    let keys: Arc<dyn KeyProvider> = if cfg.issuance.use_key_pool {
        Arc::new(PoolKeyProvider::from_config(&cfg.key_pool)?)
    } else {
        Arc::new(LocalKeyProvider)
    };
    let launch = LaunchServices {
        assets: Arc::new(HttpAssetSource::new(cfg.assets.timeout_secs)?),
        pins: Arc::new(PinataAssetStore::from_config(&cfg.assets)?),
        keys,
        issuer: Arc::new(HttpIssuanceService::from_config(&cfg.issuance)?),
    };
    let policies = StagePolicies {
        publish: retry.policy(retry.publish_attempts),
        issuance: retry.policy(retry.issuance_attempts),
    };

    let gw = Arc::new(Gateway::new(
        session,
        scanner,
        replies,
        launch,
        memory,
        &cfg.bot.handle,
        policies,
        Duration::from_secs(cfg.bot.poll_interval_secs),
    ));
    let result = gw.run().await;

    if let Err(e) = driver.close().await {
        tracing::warn!("failed to close browser session: {e}");
    }
    result
}

/// Stderr logging, plus a daily file under `{data_dir}/logs` when asked.
fn init_logging(cfg: &Config, to_file: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.bot.log_level));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if !to_file {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    }

    let log_dir = PathBuf::from(shellexpand(&cfg.bot.data_dir)).join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let appender = tracing_appender::rolling::daily(&log_dir, "mintwatch.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();
    Ok(Some(guard))
}
