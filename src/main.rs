//! statevault -- Terraform HTTP remote-state backend over a secrets store.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

/// Command-line arguments for the statevault server.
#[derive(Parser, Debug)]
#[command(
    name = "statevault",
    version,
    about = "Terraform remote-state backend storing state in a secrets store"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "statevault.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = statevault::config::load_config(&cli.config)?;

    // Initialize tracing / logging. RUST_LOG wins over the config level.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize the secrets store client based on config.
    let secrets: Arc<dyn statevault::secrets::SecretsClient> =
        match config.secrets.engine.as_str() {
            "memory" => {
                info!("In-memory secrets engine initialized (state is not persisted)");
                Arc::new(statevault::secrets::memory::MemorySecretsClient::new())
            }
            other => {
                anyhow::bail!("unknown secrets.engine '{other}' (expected 'memory')");
            }
        };

    // Assemble the storage pipeline: gzip -> base64 -> chunking -> secrets.
    let storer = statevault::storer::pipeline(secrets.clone(), config.backend.chunk_size);
    let locks = statevault::lock::LockStore::new(secrets.clone());

    info!(
        "Backend '{}' storing under {} (chunk size {} bytes)",
        config.backend.name,
        config.base_path(),
        config.backend.chunk_size
    );
    if config.auth.username.is_empty() {
        info!("Basic authentication disabled");
    } else {
        info!("Basic authentication enabled for user '{}'", config.auth.username);
    }

    let state = Arc::new(statevault::AppState {
        config,
        storer,
        locks,
        secrets,
    });

    let app = statevault::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("statevault listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections
    // and let in-flight requests finish.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("statevault shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
