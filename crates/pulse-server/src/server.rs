//! Process lifecycle: storage selection, serving, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio::net::lookup_host;
use tracing::{error, info, warn};

use pulse_storage::{FileStorage, MemoryStorage, PostgresStorage, Storage};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::routes::build_router;
use crate::service::MetricsService;
use crate::state::AppState;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Runs the server until a termination signal arrives, then drains
/// in-flight requests (bounded by a 5 s deadline), flushes storage and
/// closes the database pool.
///
/// # Errors
///
/// Returns an error when the address cannot be bound or the final
/// storage flush fails.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let db = connect_database(&config.database_dsn).await;
    let storage = select_storage(&config, db.clone()).await;
    let service = MetricsService::new(Arc::clone(&storage));

    let mut state = AppState::new(service).with_signing_key(config.key.clone());
    if let Some(pool) = db.clone() {
        state = state.with_db(pool);
    }
    if !config.crypto_key_path.is_empty() {
        match pulse_codec::load_private_key(&config.crypto_key_path) {
            Ok(key) => state = state.with_private_key(key),
            Err(e) => warn!(error = %e, "private key unavailable, serving without decryption"),
        }
    }

    let router = build_router(Arc::new(state));
    let addr = resolve_addr(&config.address).await?;

    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    info!(addr = %addr, "server listening");
    let served = if config.enable_https {
        match tls_config().await {
            Some(tls) => {
                axum_server::bind_rustls(addr, tls)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await
            }
            None => {
                warn!("HTTPS enabled but certificate files are missing, falling back to HTTP");
                axum_server::bind(addr)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await
            }
        }
    } else {
        axum_server::bind(addr)
            .handle(handle)
            .serve(router.into_make_service())
            .await
    };
    served.map_err(|source| ServerError::Bind {
        address: config.address.clone(),
        source,
    })?;

    info!("flushing storage");
    storage.shutdown().await?;
    if let Some(pool) = db {
        pool.close().await;
    }
    info!("server stopped");
    Ok(())
}

async fn resolve_addr(address: &str) -> Result<SocketAddr, ServerError> {
    lookup_host(address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| ServerError::Bind {
            address: address.to_string(),
            source: std::io::Error::other("address resolves to nothing"),
        })
}

/// Connects the pool used by the Postgres backend and `/ping`.
///
/// `extra_float_digits=3` keeps gauge text round-trips exact.
async fn connect_database(dsn: &str) -> Option<PgPool> {
    if dsn.is_empty() {
        return None;
    }
    let options: PgConnectOptions = match dsn.parse() {
        Ok(options) => options,
        Err(e) => {
            warn!(error = %e, "bad database DSN, falling back to file or memory");
            return None;
        }
    };
    let options = options.options([("extra_float_digits", "3")]);
    match PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .connect_with(options)
        .await
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!(error = %e, "database unreachable, falling back to file or memory");
            None
        }
    }
}

/// Startup fallback chain: Postgres → file → memory.
async fn select_storage(config: &ServerConfig, db: Option<PgPool>) -> Arc<dyn Storage> {
    if let Some(pool) = db {
        match PostgresStorage::new(pool).await {
            Ok(storage) => {
                info!("using postgres storage");
                return Arc::new(storage);
            }
            Err(e) => warn!(error = %e, "postgres schema setup failed, falling back"),
        }
    }
    if !config.file_storage_path.is_empty() {
        info!(path = %config.file_storage_path, "using file-backed storage");
        return Arc::new(
            FileStorage::open(
                &config.file_storage_path,
                config.store_interval,
                config.restore,
            )
            .await,
        );
    }
    info!("using in-memory storage");
    Arc::new(MemoryStorage::new())
}

/// Certificate resolution: `TLS_CERT_FILE`/`TLS_KEY_FILE`, else
/// `server.crt`/`server.key` in the working directory.
async fn tls_config() -> Option<RustlsConfig> {
    let cert = std::env::var("TLS_CERT_FILE")
        .ok()
        .filter(|p| !p.is_empty())
        .or_else(|| exists("server.crt"))?;
    let key = std::env::var("TLS_KEY_FILE")
        .ok()
        .filter(|p| !p.is_empty())
        .or_else(|| exists("server.key"))?;

    match RustlsConfig::from_pem_file(&cert, &key).await {
        Ok(tls) => {
            info!(cert = %cert, key = %key, "serving HTTPS");
            Some(tls)
        }
        Err(e) => {
            error!(error = %e, "failed to load TLS material");
            None
        }
    }
}

fn exists(path: &str) -> Option<String> {
    std::path::Path::new(path)
        .exists()
        .then(|| path.to_string())
}

async fn shutdown_on_signal(handle: Handle) {
    wait_for_signal().await;
    info!(deadline_secs = SHUTDOWN_DEADLINE.as_secs(), "shutting down");
    handle.graceful_shutdown(Some(SHUTDOWN_DEADLINE));
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
