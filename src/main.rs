use chaintrace::{Config, LedgerService, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so logging can honor it
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    init_logging(&config)?;

    info!("Starting chaintrace supply-chain ledger client v{}", chaintrace::VERSION);
    info!("Client configuration:");
    info!("  Primary RPC endpoints: {}", config.node.primary_endpoints.len());
    info!("  Ledger program: {}", config.ledger.program_address);
    info!("  Chain id: {}", config.ledger.chain_id);
    info!("  Gas price strategy: {}", config.fees.gas_price_strategy);

    let service = match LedgerService::new(&config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to construct ledger service: {}", e);
            return Err(e);
        }
    };

    // Periodically report submission metrics while serving callers
    let reporter = {
        let service = service.clone();
        let interval = config.metrics_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let snapshot = service.metrics();
                info!(
                    "Submissions: {} submitted, {} confirmed, {} rejected, {} unknown, {} resends, {} resyncs",
                    snapshot.submitted,
                    snapshot.confirmed,
                    snapshot.rejected,
                    snapshot.unknown,
                    snapshot.send_retries,
                    snapshot.sequence_resyncs
                );
            }
        })
    };

    info!("Ledger service is ready");
    info!("Press Ctrl+C to stop");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, stopping chaintrace");
    reporter.abort();

    let snapshot = service.metrics();
    info!(
        "Final counters: {} confirmed, {} rejected, {} unknown",
        snapshot.confirmed, snapshot.rejected, snapshot.unknown
    );

    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));

    if config.monitoring.json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    Ok(())
}
