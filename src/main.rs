use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tidings::app::AppContext;
use tidings::cli::{commands, Cli, Commands};
use tidings::config::Config;
use tidings::connectivity::{probe_once, spawn_probe};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    // Seed connectivity with one probe so the first load takes the right branch
    let online = if cli.offline {
        false
    } else {
        let probe = &config.connectivity;
        probe_once(&probe.target, Duration::from_millis(probe.timeout_ms)).await
    };
    if !online && !cli.offline {
        warn!("{} is unreachable, working offline", config.connectivity.target);
    }

    let ctx = AppContext::new(config, cli.db, online)?;

    if ctx.config.storage.cleanup_on_start {
        let days = ctx.config.storage.eviction_days;
        match ctx.cache.evict_older_than(days, true) {
            Ok(n) if n > 0 => info!("Startup cleanup evicted {} articles", n),
            Ok(_) => {}
            Err(e) => warn!("Startup cleanup failed: {}", e),
        }
    }

    let probe = (!cli.offline)
        .then(|| spawn_probe(ctx.connectivity.clone(), ctx.config.connectivity.clone()));
    // Images are fetched in the foreground so they land before the process exits
    let sync = ctx.spawn_sync_with(None);

    let result = match cli.command {
        Commands::Load => commands::load_articles(&ctx, &sync).await,
        Commands::Refresh => commands::refresh_articles(&ctx, &sync).await,
        Commands::List { bookmarked } => commands::list_articles(&ctx, bookmarked),
        Commands::Search { query } => commands::search(&sync, &query).await,
        Commands::Bookmark { id } => commands::toggle_bookmark(&ctx, &sync, &id).await,
        Commands::Bookmarks => commands::list_bookmarks(&sync).await,
        Commands::Evict { days } => commands::evict(&ctx, &sync, days).await,
        Commands::Stats => commands::stats(&ctx),
        Commands::Clear { bookmarks } => commands::clear(&sync, bookmarks).await,
    };

    sync.shutdown().await;
    if let Some(probe) = probe {
        probe.abort();
    }

    result?;
    Ok(())
}
