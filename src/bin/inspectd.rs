//! inspectd: operator interface to the inspect dispatch service.

use inspect_dispatch::config::Config;
use inspect_dispatch::engine::{DispatchQueue, InspectService, Rescaler, TokioClock};
use inspect_dispatch::http::{AppState, HttpOptions, Keys, build_router};
use inspect_dispatch::model::InspectLink;
use inspect_dispatch::pool::relay::{RelaySession, spawn_lifecycle};
use inspect_dispatch::pool::{BotController, WorkerPool};
use inspect_dispatch::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "inspectd", about = "Inspect link lookup service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the lookup service
    Serve {
        /// Config file location
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Parse an inspect link and print its fields
    CheckLink {
        /// Raw inspect link, percent-escaped or not
        link: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => cmd_serve(config).await,
        Command::CheckLink { link } => cmd_check_link(&link),
    }
}

async fn cmd_serve(path: PathBuf) -> anyhow::Result<()> {
    let mut config = Config::load(&path)?;

    let _guard = init_telemetry(TelemetryConfig::from_config(&config))?;

    let logins = std::mem::take(&mut config.logins);
    let bot_count = logins.len();
    let bots = Arc::new(BotController::new());
    for (i, login) in logins.into_iter().enumerate() {
        let session = Arc::new(RelaySession::new(
            &login.endpoint,
            config.proxy_for(i),
            config.request_ttl,
            config.request_delay,
        )?);
        let bot = bots.add_bot(login.credentials.user.clone(), session.clone());
        spawn_lifecycle(bot, session, login.credentials, config.status_poll);
    }

    let pool: Arc<dyn WorkerPool> = bots;
    let clock = Arc::new(TokioClock);
    let queue = DispatchQueue::new(Arc::clone(&pool), bot_count, clock.clone());

    let rescaler = Rescaler::new(queue.clone(), Arc::clone(&pool), clock, config.rescale_interval);
    let rescale_task = {
        let rescaler = rescaler.clone();
        tokio::spawn(async move { rescaler.run().await })
    };

    let service = Arc::new(InspectService::new(queue, pool, config.limits()));
    let state = AppState::new(
        service,
        Keys {
            price_key: config.price_key.take(),
            bulk_key: config.bulk_key.take(),
        },
    );
    let router = build_router(state, &HttpOptions::from_config(&config));

    let shutdown = Arc::new(Notify::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            shutdown.notify_one();
        });
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, bots = bot_count, "listening for HTTP");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.notified().await })
    .await?;

    rescaler.shutdown();
    rescale_task.await.ok();
    tracing::info!("inspectd stopped");
    Ok(())
}

fn cmd_check_link(raw: &str) -> anyhow::Result<()> {
    let Some(link) = InspectLink::try_parse(raw) else {
        anyhow::bail!("not an inspect link");
    };
    println!("{link}");
    println!("valid:  {}", link.is_valid());
    println!("market: {}", link.is_market_link());
    match link.to_link() {
        Some(canonical) => println!("link:   {canonical}"),
        None => anyhow::bail!("not a valid inspect link"),
    }
    Ok(())
}
