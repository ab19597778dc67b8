//! Actor display resolution

use std::collections::HashMap;
use std::path::Path;

use crate::types::{TrailError, TrailResult};

/// Display name used whenever an actor cannot be resolved
pub const UNKNOWN_ACTOR: &str = "unknown";

/// Maps a stored actor identifier to a display identity
pub trait ActorResolver: Send + Sync {
    fn resolve(&self, actor_id: &str) -> Option<String>;
}

/// Resolver backed by a fixed identifier -> name map
#[derive(Debug, Clone, Default)]
pub struct StaticActorResolver {
    names: HashMap<String, String>,
}

impl StaticActorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(actor_id.into(), name.into());
        self
    }

    /// Load `{"<id>": "<name>", ...}` from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> TrailResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let names: HashMap<String, String> = serde_json::from_str(&content).map_err(|e| {
            TrailError::Config(format!("invalid actor map {}: {}", path.display(), e))
        })?;
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl ActorResolver for StaticActorResolver {
    fn resolve(&self, actor_id: &str) -> Option<String> {
        self.names.get(actor_id).cloned()
    }
}

/// Display identity for an optional actor, falling back to `"unknown"`
pub fn display_actor(resolver: &dyn ActorResolver, actor: Option<&str>) -> String {
    actor
        .and_then(|id| resolver.resolve(id))
        .unwrap_or_else(|| UNKNOWN_ACTOR.to_string())
}
