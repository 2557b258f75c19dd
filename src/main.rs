use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use waitlist_gate::config::{Config, StoreConfig};
use waitlist_gate::server::{build_router, serve, shutdown_signal, AppState};
use waitlist_gate::store::{MemoryStore, RestStore, SubmissionStore};
use waitlist_gate::GateBuilder;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("Loading configuration...");
    let config = Config::from_env()?;

    let store: Arc<dyn SubmissionStore> = match config.store.clone() {
        StoreConfig::Rest(rest) => {
            info!(table = %rest.table, "Using hosted store at {}", rest.base_url);
            Arc::new(RestStore::new(rest)?)
        }
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    };

    let gate = GateBuilder::new()
        .policy(config.policy.clone())
        .survey_rules(config.survey.clone())
        .store(store)
        .build()?;

    let (cleanup, stop_cleanup) = gate.limiter().start_stoppable_cleanup_thread()?;

    let app = build_router(
        AppState::new(gate, config.admin_token.clone())
            .trust_proxy_headers(config.trust_proxy_headers),
        &config.cors_origins,
    );

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("Server running on {}", listener.local_addr()?);

    serve(listener, app, shutdown_signal()).await?;
    info!("Server shutting down...");

    let _ = stop_cleanup.send(());
    if cleanup.join().is_err() {
        warn!("Cleanup thread panicked");
    }

    Ok(())
}
