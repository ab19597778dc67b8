//! Lifecycle events that produce versions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::TrailError;

/// The mutation a version record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionEvent {
    /// The subject was inserted
    Create,
    /// The subject's attributes were saved
    Update,
    /// The subject was removed
    Destroy,
}

impl VersionEvent {
    pub const ALL: [VersionEvent; 3] = [
        VersionEvent::Create,
        VersionEvent::Update,
        VersionEvent::Destroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionEvent::Create => "create",
            VersionEvent::Update => "update",
            VersionEvent::Destroy => "destroy",
        }
    }
}

impl fmt::Display for VersionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionEvent {
    type Err = TrailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(VersionEvent::Create),
            "update" => Ok(VersionEvent::Update),
            "destroy" => Ok(VersionEvent::Destroy),
            other => Err(TrailError::Config(format!("unknown event '{}'", other))),
        }
    }
}

/// Subset of lifecycle events a policy tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSet {
    create: bool,
    update: bool,
    destroy: bool,
}

impl EventSet {
    /// Track create, update and destroy
    pub const fn all() -> Self {
        Self {
            create: true,
            update: true,
            destroy: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            create: false,
            update: false,
            destroy: false,
        }
    }

    pub fn only<I: IntoIterator<Item = VersionEvent>>(events: I) -> Self {
        let mut set = Self::none();
        for event in events {
            set.insert(event);
        }
        set
    }

    pub fn insert(&mut self, event: VersionEvent) {
        match event {
            VersionEvent::Create => self.create = true,
            VersionEvent::Update => self.update = true,
            VersionEvent::Destroy => self.destroy = true,
        }
    }

    pub fn contains(&self, event: VersionEvent) -> bool {
        match event {
            VersionEvent::Create => self.create,
            VersionEvent::Update => self.update,
            VersionEvent::Destroy => self.destroy,
        }
    }
}

impl Default for EventSet {
    fn default() -> Self {
        Self::all()
    }
}
