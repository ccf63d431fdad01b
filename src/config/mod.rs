use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Without it jobs live in memory only.
    pub database_url: Option<String>,

    /// Base URL of the inference service used by the compute worker
    #[serde(default = "default_inference_url")]
    pub inference_url: String,

    /// Seconds a dispatched job may run before it is failed. Unset means no limit.
    pub job_lease_secs: Option<u64>,

    /// Largest accepted image upload, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Capacity of the coordinator's request inbox
    #[serde(default = "default_coordinator_inbox")]
    pub coordinator_inbox: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_inference_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_coordinator_inbox() -> usize {
    64
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn job_lease(&self) -> Option<Duration> {
        self.job_lease_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
