mod collectors;
mod config;
mod environment;
mod http;
mod metrics;
mod overview;
mod state;

use axum::serve;
use clap::Parser;
use collectors::backend::select_backend;
use collectors::collector::Collector;
use collectors::runner::ProcessRunner;
use config::Config;
use environment::{Environment, SystemEnvironment};
use metrics::Metrics;
use overview::Platform;
use state::State;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostpulse")]
#[command(version)]
struct Cli {
    /// YAML config; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    /// Take two samples one interval apart, print the second as JSON and exit.
    #[arg(long)]
    once: bool,
    /// Print the disk-usage overview roots as JSON and exit.
    #[arg(long)]
    overview: bool,
    #[arg(long, value_name = "PATH", conflicts_with = "reveal")]
    open: Option<PathBuf>,
    #[arg(long, value_name = "PATH", conflicts_with = "open")]
    reveal: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let env: Arc<dyn Environment> = Arc::new(SystemEnvironment);

    if cli.overview {
        let entries = overview::overview_entries(env.as_ref(), Platform::current());
        print_json(&entries);
        return;
    }
    if let Some(path) = cli.open.as_deref() {
        exit_on_launch_error(overview::open_path(path).await);
        return;
    }
    if let Some(path) = cli.reveal.as_deref() {
        info!(
            file_manager = Platform::current().file_manager_name(),
            path = %path.display(),
            "revealing path"
        );
        exit_on_launch_error(overview::reveal_path(path).await);
        return;
    }

    let cfg = match &cli.config {
        Some(path) => Config::load_from_file(path),
        None => Ok(Config::default()),
    };
    let cfg = match cfg {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    let timeouts = match cfg.tool_timeouts() {
        Ok(t) => t,
        Err(err) => {
            error!(error = %err, "invalid collector timeouts");
            std::process::exit(1);
        }
    };

    let runner = Arc::new(ProcessRunner::new(env.clone()));
    let backend = select_backend(
        cfg.collector.backend,
        runner,
        timeouts,
        cfg.collector.disk_limits(),
    );
    let collector = Arc::new(Collector::new(backend));
    let interval = Duration::from_secs(cfg.interval_secs);

    if cli.once {
        collector.collect(now_unix()).await;
        debug!(phase = ?collector.phase().await, "baseline sample taken");
        tokio::time::sleep(interval).await;
        let snapshot = collector.collect(now_unix()).await;
        print_json(&snapshot);
        return;
    }

    info!(
        listen = %cfg.listen,
        interval_secs = cfg.interval_secs,
        backend = collector.backend_name(),
        "starting hostpulse"
    );

    let shared_state = Arc::new(RwLock::new(State::new(
        now_unix(),
        collector.backend_name(),
    )));
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = if cfg.http_enabled {
        let listen = cfg.listen.clone();
        let metrics = metrics.clone();
        let http_state = shared_state.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let app = http::build_router(metrics, http_state);
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "invalid listen address");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start HTTP server");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        }))
    } else {
        None
    };

    let collector_task = {
        let metrics = metrics.clone();
        let shared_state = shared_state.clone();
        let collector = collector.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("collector loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let now = now_unix();
                        let snapshot = collector.collect(now).await;
                        for (capability, err) in &snapshot.errors {
                            metrics.inc_collect_error(capability);
                            debug!(capability, error = %err, "capability failed this pass");
                        }

                        let mut guard = shared_state.write().await;
                        guard.update_collected(now, snapshot);
                        metrics.update_from_state(&guard);
                    }
                }
            }
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("Ctrl+C received, shutting down");

    let _ = shutdown_tx.send(true);

    let _ = collector_task.await;
    if let Some(task) = http_task {
        let _ = task.await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            error!(error = %err, "failed to encode JSON");
            std::process::exit(1);
        }
    }
}

fn exit_on_launch_error(result: Result<(), collectors::error::CollectError>) {
    if let Err(err) = result {
        error!(error = %err, "launch failed");
        std::process::exit(1);
    }
}
