use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use ww_shootout::CoordinatorConfig;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Deserialize)]
pub struct ShootoutConfig {
    pub roster_path: PathBuf,
    pub replicas: usize,
    pub shot_interval_ms: u64,
    pub store_timeout_ms: u64,
    pub shot_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    pub app_name: String,
    pub service_name: String,
    pub grpc_port: u16,
    pub readiness_port: u16,
    pub store_endpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct CoordinatorSection {
    pub skew_secs: u64,
    pub resolve_delay_ms: u64,
    pub resolve_warn_after: u32,
    pub resolve_max_attempts: u32,
    pub resolve_backoff: bool,
    pub broadcast_base_secs: u64,
    pub replicas_per_broadcast_sec: u64,
    pub start_wait_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub shootout: ShootoutConfig,
    pub network: NetworkConfig,
    pub coordinator: CoordinatorSection,
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Embedded defaults, then the optional TOML file, then `WILDWEST_*`
    /// environment variables (`__` separates sections).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));
        if let Some(path) = path {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment
            .merge(Env::prefixed("WILDWEST_").split("__"))
            .extract()
            .context("failed to load configuration")
    }
}

impl ShootoutConfig {
    pub fn shot_interval(&self) -> Duration {
        Duration::from_millis(self.shot_interval_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn shot_timeout(&self) -> Duration {
        Duration::from_millis(self.shot_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl CoordinatorSection {
    /// `None` waits for the controller forever.
    pub fn start_wait_timeout(&self) -> Option<Duration> {
        (self.start_wait_timeout_secs > 0).then(|| Duration::from_secs(self.start_wait_timeout_secs))
    }
}

impl Config {
    pub fn coordinator(&self) -> CoordinatorConfig {
        let c = &self.coordinator;
        CoordinatorConfig {
            replicas: self.shootout.replicas as u64,
            app_name: self.network.app_name.clone(),
            service_name: self.network.service_name.clone(),
            grpc_port: self.network.grpc_port,
            skew: Duration::from_secs(c.skew_secs),
            resolve_delay: Duration::from_millis(c.resolve_delay_ms),
            resolve_warn_after: c.resolve_warn_after,
            resolve_max_attempts: (c.resolve_max_attempts > 0).then_some(c.resolve_max_attempts),
            resolve_backoff: c.resolve_backoff,
            broadcast_base: Duration::from_secs(c.broadcast_base_secs),
            replicas_per_broadcast_sec: c.replicas_per_broadcast_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let config: Config = Figment::new().merge(Toml::string(DEFAULT_CONFIG)).extract().unwrap();
        assert_eq!(config.shootout.replicas, 5);
        assert_eq!(config.network.grpc_port, 50051);
        assert_eq!(config.coordinator.start_wait_timeout(), None);

        let coordinator = config.coordinator();
        assert_eq!(coordinator.resolve_max_attempts, None);
        assert_eq!(coordinator.skew, Duration::from_secs(10));
        assert_eq!(coordinator.broadcast_deadline(), Duration::from_secs(3));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[shootout]\nreplicas = 1000\n\n[coordinator]\nresolve_max_attempts = 7\nstart_wait_timeout_secs = 30").unwrap();

        let config: Config = Figment::new()
            .merge(Toml::string(DEFAULT_CONFIG))
            .merge(Toml::file_exact(file.path()))
            .extract()
            .unwrap();
        assert_eq!(config.shootout.replicas, 1000);
        assert_eq!(config.shootout.shot_interval(), Duration::from_secs(1));
        assert_eq!(config.coordinator().resolve_max_attempts, Some(7));
        assert_eq!(config.coordinator.start_wait_timeout(), Some(Duration::from_secs(30)));
    }
}
