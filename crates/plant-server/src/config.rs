use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

const DEFAULT_LOCAL_BUCKET: &str = "plant-share";
const DEFAULT_STORAGE_HOST: &str = "firebasestorage.googleapis.com";

/// Where photos and their records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// The hosted platform over REST.
    Firebase {
        bucket: String,
        project_id: String,
        /// Base of retrieval URLs, with scheme.
        storage_host: String,
        poll_interval: Duration,
    },
    /// Filesystem objects and a SQLite document store.
    Local {
        bucket: String,
        dir: PathBuf,
        db_path: PathBuf,
        /// Base of retrieval URLs; the server answers them itself.
        public_url: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub backend: Backend,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var("PLANT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(var("PLANT_PORT"), "PLANT_PORT", 3000)?;
        let max_upload_bytes: usize =
            parse_or(var("PLANT_MAX_UPLOAD_BYTES"), "PLANT_MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?;

        let backend = match var("PLANT_BACKEND").as_deref().unwrap_or("firebase") {
            "firebase" => {
                let bucket = var("PLANT_STORAGE_BUCKET")
                    .context("PLANT_STORAGE_BUCKET is required for the firebase backend")?;
                let project_id = var("PLANT_FIREBASE_PROJECT_ID")
                    .context("PLANT_FIREBASE_PROJECT_ID is required for the firebase backend")?;
                let storage_host = with_scheme(
                    &var("PLANT_STORAGE_HOST").unwrap_or_else(|| DEFAULT_STORAGE_HOST.into()),
                );
                let secs: u64 = parse_or(var("PLANT_POLL_INTERVAL_SECS"), "PLANT_POLL_INTERVAL_SECS", 5)?;
                if secs == 0 {
                    bail!("PLANT_POLL_INTERVAL_SECS must be at least 1");
                }
                Backend::Firebase {
                    bucket,
                    project_id,
                    storage_host,
                    poll_interval: Duration::from_secs(secs),
                }
            }
            "local" => Backend::Local {
                bucket: var("PLANT_STORAGE_BUCKET").unwrap_or_else(|| DEFAULT_LOCAL_BUCKET.into()),
                dir: var("PLANT_LOCAL_DIR")
                    .unwrap_or_else(|| "./plant-data".into())
                    .into(),
                db_path: var("PLANT_DB_PATH")
                    .unwrap_or_else(|| "plant-share.db".into())
                    .into(),
                public_url: var("PLANT_PUBLIC_URL")
                    .unwrap_or_else(|| default_public_url(&host, port))
                    .trim_end_matches('/')
                    .to_string(),
            },
            other => bail!("PLANT_BACKEND must be \"firebase\" or \"local\", got {:?}", other),
        };

        Ok(Self {
            host,
            port,
            max_upload_bytes,
            backend,
        })
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, v)),
        None => Ok(default),
    }
}

/// Browsers cannot fetch from a wildcard bind address.
fn default_public_url(host: &str, port: u16) -> String {
    match host {
        "0.0.0.0" | "::" | "[::]" => format!("http://localhost:{}", port),
        _ => format!("http://{}:{}", host, port),
    }
}

fn with_scheme(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}
