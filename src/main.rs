mod collectors;
mod config;
mod health;
mod http;
mod metrics;
mod remediation;
mod state;
mod watchdog;

use axum::serve;
use clap::Parser;
use collectors::status::StatusCollector;
use collectors::system::SysinfoSource;
use config::Config;
use metrics::Metrics;
use remediation::platform::{select_strategy, Platform};
use remediation::Actuator;
use state::State;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use watchdog::{Agent, Watchdog};

#[derive(Parser, Debug)]
#[command(name = "sunshine-watchdog")]
#[command(version)]
struct Cli {
    /// YAML config; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides `listen` from the config.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
        if let Err(err) = cfg.validate() {
            error!(error = %err, "invalid --listen override");
            std::process::exit(1);
        }
    }

    let platform = Platform::current();
    info!(
        listen = %cfg.listen,
        interval_secs = cfg.interval_secs,
        platform = ?platform,
        "starting sunshine-watchdog"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let agent = Agent {
        collector: StatusCollector::new(
            Box::new(SysinfoSource::new(cfg.cpu_sample_window())),
            cfg.target.process_names.clone(),
        ),
        actuator: Arc::new(Actuator::new(
            select_strategy(platform, &cfg.target),
            cfg.target.settle(),
        )),
        state: Arc::new(RwLock::new(State::new(now_unix()))),
        metrics,
    };

    let listener = match http::bind(&cfg.listen).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "failed to bind HTTP server");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let app = http::build_router(agent.clone());
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    };

    let watchdog_task = {
        let watchdog = Watchdog::new(agent, cfg.health.clone(), cfg.interval());
        let interval = cfg.interval();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(watchdog.run(interval, shutdown))
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for Ctrl+C");
    }
    info!("Ctrl+C received, shutting down");

    let _ = shutdown_tx.send(true);

    let _ = watchdog_task.await;
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
