//! Shared request state.

use rsa::RsaPrivateKey;
use sqlx::postgres::PgPool;

use crate::service::MetricsService;

/// Everything the handlers and middleware need per request.
pub struct AppState {
    /// Update/read semantics over the configured backend.
    pub service: MetricsService,
    /// Database pool, present only when a DSN is configured; `/ping`
    /// reports 500 without it.
    pub db: Option<PgPool>,
    /// HMAC signing key; empty or `"none"` disables the signature paths.
    pub signing_key: String,
    /// RSA private key for unwrapping encrypted payloads.
    pub private_key: Option<RsaPrivateKey>,
}

impl AppState {
    /// Creates state with no database, signing key or decryption key.
    #[must_use]
    pub fn new(service: MetricsService) -> Self {
        Self {
            service,
            db: None,
            signing_key: String::new(),
            private_key: None,
        }
    }

    /// Attaches a database pool.
    #[must_use]
    pub fn with_db(mut self, db: PgPool) -> Self {
        self.db = Some(db);
        self
    }

    /// Sets the HMAC signing key.
    #[must_use]
    pub fn with_signing_key(mut self, key: impl Into<String>) -> Self {
        self.signing_key = key.into();
        self
    }

    /// Sets the RSA private key used to unwrap encrypted payloads.
    #[must_use]
    pub fn with_private_key(mut self, key: RsaPrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }
}
