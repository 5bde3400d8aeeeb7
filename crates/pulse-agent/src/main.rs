//! pulse-agent — the pulsegrid collection agent.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulse_agent::{Agent, AgentConfig, CountingAllocator};

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

fn print_build_info() {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = option_env!("BUILD_COMMIT").unwrap_or("N/A"),
        date = option_env!("BUILD_DATE").unwrap_or("N/A"),
        "pulse-agent"
    );
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pulse_agent=info")),
        )
        .init();

    print_build_info();

    let config = AgentConfig::load();
    info!(
        address = %config.address,
        report_interval_secs = config.report_interval.as_secs(),
        poll_interval_secs = config.poll_interval.as_secs(),
        rate_limit = config.rate_limit,
        "starting agent"
    );

    let agent = match Agent::new(config) {
        Ok(agent) => agent,
        Err(e) => {
            error!(error = %e, "agent failed to start");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("signal received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    agent.run(shutdown_rx).await;
}
