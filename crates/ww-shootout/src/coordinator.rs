use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinSet;

use ww_types::CombatantId;

use crate::error::BoxError;
use crate::identity::replica_host;

/// Upper bound for the exponential resolve backoff.
const MAX_RESOLVE_DELAY: Duration = Duration::from_secs(60);

#[derive(thiserror::Error, Debug)]
pub enum CoordinatorError {
    #[error("replica {host} did not resolve after {attempts} attempts")]
    Unresolvable { host: String, attempts: u32 },
    #[error("readiness task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("invalid endpoint {uri}: {source}")]
    Endpoint {
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("deliver start instant: {0}")]
    Rpc(#[source] BoxError),
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub replicas: u64,
    pub app_name: String,
    pub service_name: String,
    pub grpc_port: u16,
    /// Lead time between the broadcast and the start instant.
    pub skew: Duration,
    pub resolve_delay: Duration,
    /// Retry count after which each further failed lookup logs a warning.
    pub resolve_warn_after: u32,
    /// `None` keeps resolving until the replica shows up.
    pub resolve_max_attempts: Option<u32>,
    pub resolve_backoff: bool,
    pub broadcast_base: Duration,
    pub replicas_per_broadcast_sec: u64,
}

impl CoordinatorConfig {
    /// Overall broadcast deadline: the base plus one second per
    /// `replicas_per_broadcast_sec` replicas.
    pub fn broadcast_deadline(&self) -> Duration {
        let per_sec = self.replicas_per_broadcast_sec.max(1);
        self.broadcast_base + Duration::from_secs(self.replicas / per_sec)
    }
}

/// Answers whether a replica's network name resolves yet.
pub trait NameResolver: Send + Sync + 'static {
    fn resolve(&self, host: &str) -> impl Future<Output = std::io::Result<()>> + Send;
}

/// Delivers the start instant to one replica.
pub trait StartBroadcaster: Send + Sync + 'static {
    fn deliver(
        &self,
        id: CombatantId,
        timestamp: i64,
    ) -> impl Future<Output = Result<bool, DeliveryError>> + Send;
}

/// Resolves names through the system resolver.
pub struct DnsResolver {
    pub port: u16,
}

impl NameResolver for DnsResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<()> {
        tokio::net::lookup_host((host, self.port)).await.map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub start_timestamp: i64,
    pub delivered: Vec<CombatantId>,
    pub failed: Vec<CombatantId>,
}

/// Controller-side protocol: wait until every replica resolves, then fan out
/// one agreed start instant.
pub struct BroadcastCoordinator<R, B> {
    config: CoordinatorConfig,
    resolver: Arc<R>,
    broadcaster: Arc<B>,
}

impl<R: NameResolver, B: StartBroadcaster> BroadcastCoordinator<R, B> {
    pub fn new(config: CoordinatorConfig, resolver: R, broadcaster: B) -> Self {
        BroadcastCoordinator { config, resolver: Arc::new(resolver), broadcaster: Arc::new(broadcaster) }
    }

    pub async fn run(&self) -> Result<BroadcastReport, CoordinatorError> {
        self.await_replicas().await?;
        Ok(self.broadcast(SystemTime::now()).await)
    }

    /// Readiness barrier: resolve every replica name concurrently, retrying
    /// each one independently.
    pub async fn await_replicas(&self) -> Result<(), CoordinatorError> {
        let mut tasks = JoinSet::new();
        for id in 0..self.config.replicas {
            let host = replica_host(&self.config.app_name, &self.config.service_name, id);
            let resolver = self.resolver.clone();
            let config = self.config.clone();
            tasks.spawn(async move { wait_until_resolvable(&*resolver, host, &config).await });
        }
        while let Some(res) = tasks.join_next().await {
            res??;
        }
        tracing::info!(replicas = self.config.replicas, "all replicas resolvable");
        Ok(())
    }

    /// Best-effort fan-out bounded by [`CoordinatorConfig::broadcast_deadline`].
    /// Failed deliveries are logged, not retried.
    pub async fn broadcast(&self, now: SystemTime) -> BroadcastReport {
        let start_timestamp = start_timestamp(now, self.config.skew);
        tracing::info!(start_timestamp, "broadcasting shootout beginning time...");

        let mut tasks = JoinSet::new();
        for id in 0..self.config.replicas {
            let broadcaster = self.broadcaster.clone();
            tasks.spawn(async move { (id, broadcaster.deliver(id, start_timestamp).await) });
        }

        let mut report = BroadcastReport { start_timestamp, delivered: Vec::new(), failed: Vec::new() };
        let collect = async {
            while let Some(res) = tasks.join_next().await {
                match res {
                    Ok((id, Ok(_))) => report.delivered.push(id),
                    Ok((id, Err(e))) => {
                        tracing::error!(id, error = %e, "failed to send shootout beginning time");
                        report.failed.push(id);
                    }
                    Err(e) => tracing::error!(error = %e, "broadcast task failed"),
                }
            }
        };
        if tokio::time::timeout(self.config.broadcast_deadline(), collect).await.is_err() {
            tracing::error!("broadcast deadline exceeded");
        }
        // Anything neither delivered nor failed was cut off by the deadline.
        let mut missing: Vec<CombatantId> = (0..self.config.replicas)
            .filter(|id| !report.delivered.contains(id) && !report.failed.contains(id))
            .collect();
        report.failed.append(&mut missing);
        report.delivered.sort_unstable();
        report.failed.sort_unstable();
        report
    }
}

async fn wait_until_resolvable<R: NameResolver>(
    resolver: &R,
    host: String,
    config: &CoordinatorConfig,
) -> Result<(), CoordinatorError> {
    let mut delay = config.resolve_delay;
    let mut retries = 0u32;
    loop {
        match resolver.resolve(&host).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                retries += 1;
                if config.resolve_max_attempts.is_some_and(|max| retries >= max) {
                    return Err(CoordinatorError::Unresolvable { host, attempts: retries });
                }
                if retries > config.resolve_warn_after {
                    tracing::warn!(%host, retries, error = %e, "replica still not resolvable");
                }
            }
        }
        tokio::time::sleep(delay).await;
        if config.resolve_backoff {
            delay = (delay * 2).min(MAX_RESOLVE_DELAY);
        }
    }
}

/// `now + skew`, rounded to the nearest whole second, as Unix seconds.
pub fn start_timestamp(now: SystemTime, skew: Duration) -> i64 {
    let at = (now + skew).duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = at.as_secs() + u64::from(at.subsec_millis() >= 500);
    secs as i64
}
