use std::sync::Arc;

use api_key::{KeyRepository, OwnerId, VerificationService};
use async_trait::async_trait;
use pingora::http::{RequestHeader, ResponseHeader};
use pingora::prelude::*;

use crate::configuration::{ServerConfig, UpstreamConfig};
use crate::metric::{Metrics, Outcome};

pub const AUTHORIZATION_HEADER: &str = "authorization";
/// `Authorization: Api-Key <key>`, scheme matched case-insensitively.
pub const AUTHORIZATION_SCHEME: &str = "Api-Key";

pub type SharedRepository = Arc<dyn KeyRepository>;

/// Pull the presented key from the configured header, falling back to the
/// `Authorization: Api-Key` scheme.
pub fn extract_key(req: &RequestHeader, header: &str) -> Option<String> {
    if let Some(key) = req.headers.get(header).and_then(|v| v.to_str().ok()) {
        return Some(key.trim().to_owned());
    }
    req.headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(api_key_credentials)
        .map(|key| key.trim().to_owned())
}

/// Credentials of an `Api-Key` authorization value, `None` for other schemes.
fn api_key_credentials(value: &str) -> Option<&str> {
    let (scheme, credentials) = value.trim_start().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case(AUTHORIZATION_SCHEME)
        .then_some(credentials)
}

fn uses_api_key_scheme(req: &RequestHeader) -> bool {
    req.headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(api_key_credentials)
        .is_some()
}

/// Reverse proxy that only forwards requests carrying a valid API key.
pub struct Gateway {
    verifier: Arc<VerificationService<SharedRepository>>,
    upstream: UpstreamConfig,
    header: String,
    owner_header: String,
    metrics: Arc<Metrics>,
}

impl Gateway {
    pub fn new(
        verifier: Arc<VerificationService<SharedRepository>>,
        upstream: UpstreamConfig,
        config: &ServerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            verifier,
            upstream,
            header: config.header.clone(),
            owner_header: config.owner_header.clone(),
            metrics,
        }
    }

    async fn reject(&self, session: &mut Session, challenge: &'static str) -> Result<bool> {
        let mut header = ResponseHeader::build(401, None)?;
        header.insert_header("WWW-Authenticate", challenge)?;
        header.insert_header("Content-Length", "0")?;
        session.set_keepalive(None);
        session
            .write_response_header(Box::new(header), true)
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl ProxyHttp for Gateway {
    type CTX = Option<OwnerId>;

    fn new_ctx(&self) -> Self::CTX {
        None
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool>
    where
        Self::CTX: Send + Sync,
    {
        let Some(presented) = extract_key(session.req_header(), &self.header) else {
            self.metrics.record(Outcome::Missing);
            return self.reject(session, "API key missing").await;
        };

        // Argon2 verification is deliberately slow; keep it off the proxy's workers.
        let verifier = Arc::clone(&self.verifier);
        let checked = tokio::task::spawn_blocking(move || verifier.check(&presented))
            .await
            .map_err(|e| {
                Error::explain(
                    ErrorType::InternalError,
                    format!("key verification task failed: {e}"),
                )
            })?;

        match checked {
            Ok(owner) => {
                self.metrics.record(Outcome::Accepted);
                *ctx = Some(owner);
                Ok(false)
            }
            Err(reason) => {
                self.metrics.record(Outcome::Rejected(reason));
                self.reject(session, "API key invalid").await
            }
        }
    }

    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        upstream_request.remove_header(self.header.as_str());
        if uses_api_key_scheme(upstream_request) {
            upstream_request.remove_header(AUTHORIZATION_HEADER);
        }
        // Never trust an owner header supplied by the client.
        upstream_request.remove_header(self.owner_header.as_str());
        if let Some(owner) = ctx.as_ref() {
            upstream_request.insert_header(self.owner_header.clone(), owner.as_str())?;
        }
        Ok(())
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        Ok(Box::new(HttpPeer::new(
            self.upstream.addr(),
            self.upstream.tls,
            self.upstream.sni.clone(),
        )))
    }
}
