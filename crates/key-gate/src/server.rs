use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use api_key::{KeyHasher, VerificationService};
use async_trait::async_trait;
use pingora::prelude::*;
use pingora::server::RunArgs;
use pingora::server::Server as PingoraServer;
use pingora::server::configuration::Opt;
use pingora::services::background::{BackgroundService, GenBackgroundService};

use crate::configuration::ServerConfig;
use crate::gateway::{Gateway, SharedRepository};
use crate::metric::Metrics;
use crate::sqlite::SqliteRepository;

/// How long per-minute metrics are kept.
const METRICS_RETENTION: Duration = Duration::from_secs(60 * 60);
const METRICS_PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Periodically drops expired metric buckets.
pub struct MetricsJanitor {
    metrics: Arc<Metrics>,
}

#[async_trait]
impl BackgroundService for MetricsJanitor {
    async fn start(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    return;
                }
                _ = tokio::time::sleep(METRICS_PRUNE_INTERVAL) => {}
            }

            let cutoff = SystemTime::now()
                .checked_sub(METRICS_RETENTION)
                .unwrap_or(SystemTime::UNIX_EPOCH);
            self.metrics.prune(cutoff);
        }
    }
}

pub struct Server {
    server: PingoraServer,
}

impl Server {
    pub fn new(opt: Option<Opt>) -> Result<Self> {
        let server = PingoraServer::new(opt)?;
        Ok(Server { server })
    }

    pub fn bootstrap(
        &mut self,
        config: &ServerConfig,
        config_base_path: &Path,
        metrics: Arc<Metrics>,
    ) -> Result<()> {
        self.server.bootstrap();

        let upstream = config.require_upstream().map_err(|e| {
            Error::explain(ErrorType::InternalError, format!("invalid config: {e}"))
        })?;

        let db_path = config.database_path(config_base_path);
        let repo = SqliteRepository::open(&db_path).map_err(|e| {
            Error::explain(
                ErrorType::InternalError,
                format!("failed to open key database {}: {e}", db_path.display()),
            )
        })?;
        let repo: SharedRepository = Arc::new(repo);

        // Refuse to start rather than verify with a broken random source or bad cost parameters.
        let hasher = KeyHasher::new(&config.api_key.hasher).map_err(|e| {
            Error::explain(
                ErrorType::InternalError,
                format!("failed to initialise key hasher: {e}"),
            )
        })?;
        let verifier = Arc::new(VerificationService::new(repo, hasher));

        log::info!(
            "Authenticating with keys from {:?}, forwarding to {}",
            db_path,
            upstream.addr()
        );

        let janitor = GenBackgroundService::new(
            "metrics janitor".to_string(),
            Arc::new(MetricsJanitor {
                metrics: metrics.clone(),
            }),
        );
        self.server.add_service(janitor);

        let mut gateway_service = http_proxy_service(
            &self.server.configuration,
            Gateway::new(verifier, upstream.clone(), config, metrics),
        );
        gateway_service.add_tcp(&config.listen);
        self.server.add_service(gateway_service);

        Ok(())
    }

    pub fn run_forever(self) {
        self.server.run_forever();
    }

    pub fn run(self, args: RunArgs) {
        self.server.run(args);
    }
}
