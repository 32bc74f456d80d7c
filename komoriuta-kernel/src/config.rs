use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::wol::{UdpWaker, DEFAULT_WOL_PORTS};

pub const CONFIG_ENV: &str = "KOMORIUTA_KERNEL_CONFIG";
pub const API_KEY_ENV: &str = "KOMORIUTA_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub store: StoreConf,
    pub monitor: MonitorConf,
    pub wol: WolConf,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: SocketAddr,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConf {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConf {
    pub tick_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct WolConf {
    pub broadcast: Ipv4Addr,
    pub ports: Vec<u16>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: SocketAddr::from(([0, 0, 0, 0], 8080)) }
    }
}

impl Default for StoreConf {
    fn default() -> Self {
        Self { path: PathBuf::from("./data/machines.json") }
    }
}

impl Default for MonitorConf {
    fn default() -> Self {
        Self { tick_seconds: crate::monitor::MONITOR_TICK_PERIOD.as_secs() }
    }
}

impl Default for WolConf {
    fn default() -> Self {
        Self {
            broadcast: Ipv4Addr::BROADCAST,
            ports: DEFAULT_WOL_PORTS.to_vec(),
        }
    }
}

impl WolConf {
    pub fn waker(&self) -> UdpWaker {
        UdpWaker { broadcast: self.broadcast, ports: self.ports.clone() }
    }
}

impl KernelConfig {
    pub fn parse(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(txt)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.tick_seconds == 0 {
            return Err(ConfigError::Invalid("monitor.tick_seconds must be >= 1".into()));
        }
        if self.wol.ports.is_empty() {
            return Err(ConfigError::Invalid("wol.ports must not be empty".into()));
        }
        Ok(())
    }

    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let txt = fs::read_to_string(path).await?;
        Self::parse(&txt)
    }
}

/// Charge kernel.yaml (ou $KOMORIUTA_KERNEL_CONFIG) ; défauts si absent ou invalide
pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "kernel.yaml".into());
    let path = Path::new(&path);
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no kernel config, using defaults");
        return KernelConfig::default();
    }

    match KernelConfig::from_file(path).await {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "invalid kernel config, using defaults");
            KernelConfig::default()
        }
    }
}

/// Clé API depuis l'environnement ; None si absente ou vide
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        let cfg = KernelConfig::parse("").unwrap();
        assert_eq!(cfg.monitor.tick_seconds, 10);
        assert_eq!(cfg.http.bind.port(), 8080);
        assert_eq!(cfg.wol.ports, vec![9, 7]);
        assert!(cfg.mqtt.is_none());
    }

    #[test]
    fn test_partial_yaml() {
        let cfg = KernelConfig::parse(
            "store:\n  path: /var/lib/komoriuta/machines.json\nmqtt:\n  host: broker.lan\n  port: 1884\nwol:\n  broadcast: 192.168.1.255\n",
        )
        .unwrap();
        assert_eq!(cfg.store.path, PathBuf::from("/var/lib/komoriuta/machines.json"));
        assert_eq!(cfg.mqtt.as_ref().map(|m| m.port), Some(1884));
        assert_eq!(cfg.wol.broadcast, Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(cfg.wol.ports, vec![9, 7]);
        assert_eq!(cfg.monitor.tick_seconds, 10);
    }

    #[test]
    fn test_rejects_zero_tick() {
        assert!(matches!(
            KernelConfig::parse("monitor:\n  tick_seconds: 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_yaml() {
        assert!(matches!(KernelConfig::parse("http: [1, 2"), Err(ConfigError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "monitor:\n  tick_seconds: 5\n").unwrap();
        let cfg = KernelConfig::from_file(&path).await.unwrap();
        assert_eq!(cfg.monitor.tick_seconds, 5);
    }
}
