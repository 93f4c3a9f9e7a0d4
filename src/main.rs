//! # ontap-mcp
//!
//! Process entry point. Parses flags, installs logging, loads cluster
//! configuration from `ONTAP_CLUSTERS`, then either checks connectivity
//! to the clusters (`--test-connection`) or serves MCP on stdio (default) or HTTP (`--http`).
//!
//! Logs always go to stderr: in stdio mode stdout carries the protocol.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ontap_mcp::config::{self, Cli, Config};
use ontap_mcp::http::{self, HttpState};
use ontap_mcp::mcp::{McpServer, SERVER_TITLE, SERVER_VERSION};
use ontap_mcp::{stdio, tools, ClusterRegistry, SessionStore};

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("ontap-mcp: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run());
    // The stdin reader blocks on a pool thread that cannot be interrupted. Waiting
    // for it would keep the process alive after a signal until the pipe closes.
    runtime.shutdown_background();
    code
}

async fn run() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("{SERVER_TITLE} v{SERVER_VERSION}");
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ontap-mcp: configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&cli, &config);

    let cluster_configs = match config::load_clusters_from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid {}: {e}", config::CLUSTERS_ENV);
            eprintln!("ontap-mcp: configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let clusters = match ClusterRegistry::from_configs(cluster_configs).await {
        Ok(r) => Arc::new(r),
        Err(e) => {
            eprintln!("ontap-mcp: failed to initialize cluster clients: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "{SERVER_TITLE} v{SERVER_VERSION} starting with {} cluster(s)",
        clusters.len().await
    );

    let root = CancellationToken::new();
    spawn_signal_handler(root.clone());

    if cli.test_connection {
        return test_connection(&clusters, &root).await;
    }

    let tools = Arc::new(tools::default_registry());
    info!("{} tools registered", tools.len());
    let server = Arc::new(McpServer::new(tools));

    let result = match cli.http {
        Some(port) => {
            let host = cli.host.clone().unwrap_or_else(|| config.server.host.clone());
            let state = HttpState {
                server,
                sessions: SessionStore::new(
                    config.server.idle_timeout(),
                    config.server.max_lifetime(),
                ),
                shutdown: root.clone(),
            };
            if !clusters.is_empty().await {
                info!(
                    "{} applies to stdio mode only; HTTP sessions register clusters via initialize or add_cluster",
                    config::CLUSTERS_ENV
                );
            }
            http::serve(&format!("{host}:{port}"), state, config.server.shutdown_drain()).await
        }
        None => stdio::run_stdio(server, clusters, root.clone()).await,
    };

    match result {
        Ok(()) => {
            info!("Goodbye");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Transport error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Filter precedence: `RUST_LOG` > `--log-level` > config file > `info`.
fn init_logging(cli: &Cli, config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `root` on SIGINT or SIGTERM.
fn spawn_signal_handler(root: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("Received SIGINT"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {e}");
                    if ctrl_c.await.is_ok() {
                        info!("Received SIGINT");
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            if ctrl_c.await.is_ok() {
                info!("Received SIGINT");
            }
        }
        root.cancel();
    });
}

async fn test_connection(clusters: &ClusterRegistry, cancel: &CancellationToken) -> ExitCode {
    if clusters.is_empty().await {
        warn!("No clusters configured; set {}", config::CLUSTERS_ENV);
        println!("No clusters configured. Set {} to test connections.", config::CLUSTERS_ENV);
        return ExitCode::SUCCESS;
    }

    let results = clusters.check_all(cancel).await;
    let total = results.len();
    let mut reachable = 0;
    for check in &results {
        match &check.outcome {
            Ok(info) => {
                reachable += 1;
                println!("✅ {}: Connected successfully", check.name);
                println!("   ONTAP Version: {}", or_unknown(&info.version.full));
                println!("   UUID: {}", or_unknown(&info.uuid));
                println!("   State: {}", or_unknown(&info.state));
            }
            Err(e) => println!("❌ {}: Connection failed - {e}", check.name),
        }
    }
    println!();
    println!("Results: {reachable}/{total} clusters reachable");

    if reachable == total {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() {
        "unknown"
    } else {
        s
    }
}
