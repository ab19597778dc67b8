//! Server configuration from `TRAIL_*` environment variables

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::types::{TrailError, TrailResult};
use crate::version_store::VersionStoreConfig;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3080";

#[derive(Debug, Clone)]
pub struct TrailConfig {
    /// Directory holding `versions.jsonl`
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    /// Entity type declarations (`{"types": [...]}`)
    pub registry_path: Option<PathBuf>,
    /// Current entity states, one JSON object per line
    pub entities_path: Option<PathBuf>,
    /// Actor id -> display name map
    pub actors_path: Option<PathBuf>,
    pub sync_writes: bool,
    /// Association hops followed by deep history; unbounded when absent
    pub deep_max_depth: Option<usize>,
}

impl TrailConfig {
    pub fn from_env() -> TrailResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> TrailResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let path = |key: &str| lookup(key).map(|p| resolve_path(&current_dir, &p));

        let bind_addr = lookup("TRAIL_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|e| TrailError::Config(format!("TRAIL_BIND_ADDR '{}': {}", bind_addr, e)))?;

        let log_format = lookup("TRAIL_LOG_FORMAT").unwrap_or_else(|| "text".to_string());
        if log_format != "text" && log_format != "json" {
            return Err(TrailError::Config(format!(
                "TRAIL_LOG_FORMAT must be 'text' or 'json', got '{}'",
                log_format
            )));
        }

        let sync_writes = match lookup("TRAIL_SYNC_WRITES").as_deref() {
            None => true,
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            Some(other) => {
                return Err(TrailError::Config(format!(
                    "TRAIL_SYNC_WRITES must be true or false, got '{}'",
                    other
                )))
            }
        };

        let deep_max_depth = lookup("TRAIL_DEEP_MAX_DEPTH")
            .map(|raw| {
                raw.parse::<usize>().map_err(|e| {
                    TrailError::Config(format!("TRAIL_DEEP_MAX_DEPTH '{}': {}", raw, e))
                })
            })
            .transpose()?;

        Ok(Self {
            data_dir: path("TRAIL_DATA_DIR").unwrap_or_else(|| current_dir.join("data")),
            bind_addr,
            log_level: lookup("TRAIL_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            registry_path: path("TRAIL_REGISTRY_PATH"),
            entities_path: path("TRAIL_ENTITIES_PATH"),
            actors_path: path("TRAIL_ACTORS_PATH"),
            sync_writes,
            deep_max_depth,
        })
    }

    pub fn store_config(&self) -> VersionStoreConfig {
        VersionStoreConfig {
            sync_writes: self.sync_writes,
            ..VersionStoreConfig::new(&self.data_dir)
        }
    }
}

fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
