//! Service configuration

use advisor_lib::{OffPeak, ProfilerConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_PATH_ENV: &str = "ADVISOR_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "advisor.toml";

/// Advisor configuration, layered as file then `ADVISOR_*` environment
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorConfig {
    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Prometheus server used for telemetry
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    #[serde(default = "default_telemetry_timeout")]
    pub telemetry_timeout_secs: u64,

    #[serde(default = "default_policy_store_path")]
    pub policy_store_path: PathBuf,

    /// Seed policies inserted at startup when their id is absent
    #[serde(default = "default_policy_seeds_path")]
    pub policy_seeds_path: Option<PathBuf>,

    #[serde(default = "default_job_store_path")]
    pub job_store_path: PathBuf,

    #[serde(default = "default_cpu_hot_pct")]
    pub cpu_hot_pct: f64,

    #[serde(default = "default_mem_hot_pct")]
    pub mem_hot_pct: f64,

    #[serde(default = "default_disk_hot_pct")]
    pub disk_hot_pct: f64,

    #[serde(default = "default_recent_jobs_limit")]
    pub recent_jobs_limit: usize,

    /// Local hour of the daily off-peak slot
    #[serde(default = "default_offpeak_hour")]
    pub offpeak_hour: u32,

    #[serde(default)]
    pub offpeak_utc_offset_minutes: i32,
}

fn default_api_port() -> u16 {
    5057
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_telemetry_timeout() -> u64 {
    15
}

fn default_policy_store_path() -> PathBuf {
    PathBuf::from("data/policies.json")
}

fn default_policy_seeds_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/policy_seeds.json"))
}

fn default_job_store_path() -> PathBuf {
    PathBuf::from("data/jobs.json")
}

fn default_cpu_hot_pct() -> f64 {
    80.0
}

fn default_mem_hot_pct() -> f64 {
    80.0
}

fn default_disk_hot_pct() -> f64 {
    85.0
}

fn default_recent_jobs_limit() -> usize {
    10
}

fn default_offpeak_hour() -> u32 {
    1
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            prometheus_url: default_prometheus_url(),
            telemetry_timeout_secs: default_telemetry_timeout(),
            policy_store_path: default_policy_store_path(),
            policy_seeds_path: default_policy_seeds_path(),
            job_store_path: default_job_store_path(),
            cpu_hot_pct: default_cpu_hot_pct(),
            mem_hot_pct: default_mem_hot_pct(),
            disk_hot_pct: default_disk_hot_pct(),
            recent_jobs_limit: default_recent_jobs_limit(),
            offpeak_hour: default_offpeak_hour(),
            offpeak_utc_offset_minutes: 0,
        }
    }
}

impl AdvisorConfig {
    /// Load from `$ADVISOR_CONFIG` (or `advisor.toml`) and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load with `path` as the optional file layer
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("ADVISOR").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let parsed: Self = config
            .try_deserialize()
            .context("Invalid advisor configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.offpeak_hour > 23 {
            anyhow::bail!("offpeak_hour must be 0-23, got {}", self.offpeak_hour);
        }
        if self.offpeak_utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!(
                "offpeak_utc_offset_minutes out of range: {}",
                self.offpeak_utc_offset_minutes
            );
        }
        Ok(())
    }

    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_secs(self.telemetry_timeout_secs)
    }

    pub fn profiler(&self) -> ProfilerConfig {
        ProfilerConfig {
            cpu_hot_pct: self.cpu_hot_pct,
            mem_hot_pct: self.mem_hot_pct,
            disk_hot_pct: self.disk_hot_pct,
            recent_jobs: self.recent_jobs_limit,
        }
    }

    pub fn offpeak(&self) -> OffPeak {
        OffPeak {
            hour: self.offpeak_hour,
            utc_offset_minutes: self.offpeak_utc_offset_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AdvisorConfig::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.policy_store_path, PathBuf::from("data/policies.json"));
        assert_eq!(config.disk_hot_pct, 85.0);
        assert_eq!(config.profiler().recent_jobs, config.recent_jobs_limit);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("advisor.toml");
        fs::write(
            &path,
            "api_port = 6000\ncpu_hot_pct = 70.5\noffpeak_hour = 3\noffpeak_utc_offset_minutes = -300\n",
        )
        .unwrap();

        let config = AdvisorConfig::load_from(&path).unwrap();
        assert_eq!(config.api_port, 6000);
        assert_eq!(config.profiler().cpu_hot_pct, 70.5);
        assert_eq!(
            config.offpeak(),
            OffPeak {
                hour: 3,
                utc_offset_minutes: -300
            }
        );
        assert_eq!(config.mem_hot_pct, 80.0);
    }

    #[test]
    fn test_rejects_invalid_offpeak_hour() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("advisor.toml");
        fs::write(&path, "offpeak_hour = 24\n").unwrap();
        assert!(AdvisorConfig::load_from(&path).is_err());
    }
}
