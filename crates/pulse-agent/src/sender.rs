//! HTTP shipping of metric batches.

use pulse_codec::sign;
use pulse_proto::Metric;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use rsa::RsaPublicKey;
use tracing::debug;

use crate::error::AgentError;

/// Encodes and posts metric payloads to the server.
///
/// The encode pipeline is JSON → optional hybrid encryption → gzip →
/// optional HMAC header, and the signature covers the gzipped bytes —
/// exactly what travels on the wire.
pub struct Sender {
    address: String,
    key: String,
    use_https: bool,
    public_key: Option<RsaPublicKey>,
    client: reqwest::Client,
}

impl Sender {
    /// Creates a sender for `host:port`.
    #[must_use]
    pub fn new(address: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            key: key.into(),
            use_https: false,
            public_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Switches outgoing requests to `https://`.
    #[must_use]
    pub fn with_https(mut self, enabled: bool) -> Self {
        self.use_https = enabled;
        self
    }

    /// Enables hybrid encryption under the server's public key.
    #[must_use]
    pub fn with_public_key(mut self, key: RsaPublicKey) -> Self {
        self.public_key = Some(key);
        self
    }

    fn url(&self, path: &str) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{scheme}://{}{path}", self.address)
    }

    fn encode(&self, plain: &[u8]) -> Result<(Vec<u8>, Option<String>), AgentError> {
        let sealed = match &self.public_key {
            Some(public) => pulse_codec::seal(public, plain)?,
            None => plain.to_vec(),
        };
        let wire = pulse_codec::gzip::compress(&sealed)?;
        let signature = sign::key_enabled(&self.key).then(|| sign::sign(&self.key, &wire));
        Ok((wire, signature))
    }

    async fn post(&self, path: &str, plain: &[u8]) -> Result<(), AgentError> {
        let (wire, signature) = self.encode(plain)?;
        let url = self.url(path);

        pulse_retry::retry(|| {
            let wire = wire.clone();
            let signature = signature.clone();
            let url = url.clone();
            async move {
                let mut request = self
                    .client
                    .post(url.as_str())
                    .header(CONTENT_TYPE, "application/json")
                    .header(CONTENT_ENCODING, "gzip")
                    .header(ACCEPT_ENCODING, "gzip")
                    .body(wire);
                if let Some(signature) = &signature {
                    request = request.header(sign::SIGNATURE_HEADER, signature);
                }

                let response = request.send().await?;
                if response.status().is_server_error() {
                    return Err(AgentError::ServerStatus(response.status().as_u16()));
                }
                debug!(url = %url, status = response.status().as_u16(), "payload delivered");
                Ok(())
            }
        })
        .await
    }

    /// Ships a whole snapshot as one batch to `/updates/`.
    ///
    /// # Errors
    ///
    /// Returns the last error once transient retries are exhausted.
    pub async fn send_batch(&self, batch: &[Metric]) -> Result<(), AgentError> {
        if batch.is_empty() {
            return Ok(());
        }
        let plain = serde_json::to_vec(batch)?;
        self.post("/updates/", &plain).await
    }

    /// Ships a single record to `/update/`.
    ///
    /// # Errors
    ///
    /// Returns the last error once transient retries are exhausted.
    pub async fn send_single(&self, metric: &Metric) -> Result<(), AgentError> {
        let plain = serde_json::to_vec(metric)?;
        self.post("/update/", &plain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::Router;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Captured {
        bodies: Mutex<Vec<(HeaderMap, Vec<u8>)>>,
    }

    async fn capture(
        State(captured): State<Arc<Captured>>,
        headers: HeaderMap,
        body: axum::body::Bytes,
    ) -> &'static str {
        captured.bodies.lock().push((headers, body.to_vec()));
        "[]"
    }

    async fn spawn_capture_server() -> (std::net::SocketAddr, Arc<Captured>) {
        let captured = Arc::new(Captured::default());
        let app = Router::new()
            .route("/updates/", post(capture))
            .route("/update/", post(capture))
            .with_state(Arc::clone(&captured));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, captured)
    }

    #[tokio::test]
    async fn batch_is_gzipped_json_on_the_wire() {
        let (addr, captured) = spawn_capture_server().await;
        let sender = Sender::new(addr.to_string(), "");

        sender
            .send_batch(&[Metric::counter("PollCount", 3), Metric::gauge("Alloc", 1.5)])
            .await
            .unwrap();

        let bodies = captured.bodies.lock();
        let (headers, wire) = &bodies[0];
        assert_eq!(headers[CONTENT_ENCODING.as_str()], "gzip");
        assert_eq!(headers[CONTENT_TYPE.as_str()], "application/json");
        assert!(!headers.contains_key(sign::SIGNATURE_HEADER));

        let plain = pulse_codec::gzip::decompress(wire).unwrap();
        let batch: Vec<Metric> = serde_json::from_slice(&plain).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], Metric::counter("PollCount", 3));
    }

    #[tokio::test]
    async fn signature_covers_the_wire_bytes() {
        let (addr, captured) = spawn_capture_server().await;
        let sender = Sender::new(addr.to_string(), "shared-secret");

        sender
            .send_batch(&[Metric::counter("C", 1)])
            .await
            .unwrap();

        let bodies = captured.bodies.lock();
        let (headers, wire) = &bodies[0];
        let signature = headers[sign::SIGNATURE_HEADER].to_str().unwrap();
        assert!(sign::verify("shared-secret", wire, signature));
    }

    #[tokio::test]
    async fn encrypted_batch_unwraps_with_the_private_key() {
        use rand::rngs::OsRng;
        use rsa::RsaPrivateKey;

        let private = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let (addr, captured) = spawn_capture_server().await;
        let sender =
            Sender::new(addr.to_string(), "").with_public_key(private.to_public_key());

        sender
            .send_batch(&[Metric::gauge("G", 2.5)])
            .await
            .unwrap();

        let bodies = captured.bodies.lock();
        let (_, wire) = &bodies[0];
        let sealed = pulse_codec::gzip::decompress(wire).unwrap();
        let plain = pulse_codec::open_if_sealed(&private, &sealed)
            .unwrap()
            .expect("payload should be an envelope");
        let batch: Vec<Metric> = serde_json::from_slice(&plain).unwrap();
        assert_eq!(batch[0], Metric::gauge("G", 2.5));
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let (addr, captured) = spawn_capture_server().await;
        let sender = Sender::new(addr.to_string(), "");
        sender.send_batch(&[]).await.unwrap();
        assert!(captured.bodies.lock().is_empty());
    }

    #[tokio::test]
    async fn single_update_hits_the_single_endpoint() {
        let (addr, captured) = spawn_capture_server().await;
        let sender = Sender::new(addr.to_string(), "");
        sender
            .send_single(&Metric::counter("PollCount", 1))
            .await
            .unwrap();

        let bodies = captured.bodies.lock();
        let (_, wire) = &bodies[0];
        let plain = pulse_codec::gzip::decompress(wire).unwrap();
        let metric: Metric = serde_json::from_slice(&plain).unwrap();
        assert_eq!(metric, Metric::counter("PollCount", 1));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_server_surfaces_an_error() {
        // paused clock fast-forwards the backoff sleeps between attempts
        let sender = Sender::new("127.0.0.1:9", "");
        let result = sender.send_batch(&[Metric::counter("C", 1)]).await;
        assert!(result.is_err());
    }
}
