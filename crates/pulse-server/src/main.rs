//! pulse-server — the pulsegrid metrics server.

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulse_server::ServerConfig;

fn print_build_info() {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = option_env!("BUILD_COMMIT").unwrap_or("N/A"),
        date = option_env!("BUILD_DATE").unwrap_or("N/A"),
        "pulse-server"
    );
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pulse_server=info,pulse_storage=info")),
        )
        .init();

    print_build_info();

    let config = ServerConfig::load();
    if let Err(e) = pulse_server::run(config).await {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
