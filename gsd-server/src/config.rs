//! Server configuration
//!
//! Defaults suit a single simulated detector on a workstation. Every field
//! can be overridden from the environment:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `GSD_BIND_ADDR` | listen address | `0.0.0.0:9200` |
//! | `GSD_OUTPUT_DIR` | spectrum directory | platform data dir + `gamma-spectra` |
//! | `GSD_OPERATOR` | operator recorded in spectra | `operator` |
//! | `GSD_DETECTORS` | comma-separated instrument names | `D1` |
//! | `GSD_MONITOR_INTERVAL_MS` | connectivity poll period | `1000` |

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub output_dir: PathBuf,
    pub operator: String,
    pub detectors: Vec<String>,
    pub monitor_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9200)),
            output_dir: gsd_core::default_output_dir(),
            operator: "operator".to_string(),
            detectors: vec!["D1".to_string()],
            monitor_interval: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `GSD_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("GSD_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("Invalid GSD_BIND_ADDR: {}", addr))?;
        }
        if let Some(dir) = lookup("GSD_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(operator) = lookup("GSD_OPERATOR") {
            config.operator = operator;
        }
        if let Some(list) = lookup("GSD_DETECTORS") {
            config.detectors = list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
            if config.detectors.is_empty() {
                bail!("GSD_DETECTORS names no detectors");
            }
        }
        if let Some(ms) = lookup("GSD_MONITOR_INTERVAL_MS") {
            let ms: u64 = ms
                .parse()
                .with_context(|| format!("Invalid GSD_MONITOR_INTERVAL_MS: {}", ms))?;
            if ms == 0 {
                bail!("GSD_MONITOR_INTERVAL_MS must be positive");
            }
            config.monitor_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.detectors, vec!["D1"]);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GSD_BIND_ADDR", "127.0.0.1:8080"),
            ("GSD_OUTPUT_DIR", "/data/spectra"),
            ("GSD_OPERATOR", "bdrum"),
            ("GSD_DETECTORS", "D1, D2,,D4"),
            ("GSD_MONITOR_INTERVAL_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.output_dir, PathBuf::from("/data/spectra"));
        assert_eq!(config.operator, "bdrum");
        assert_eq!(config.detectors, vec!["D1", "D2", "D4"]);
        assert_eq!(config.monitor_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ServerConfig::from_lookup(lookup(&[("GSD_BIND_ADDR", "nowhere")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("GSD_DETECTORS", " , ")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("GSD_MONITOR_INTERVAL_MS", "0")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("GSD_MONITOR_INTERVAL_MS", "soon")])).is_err());
    }
}
