//! Subject references - (type, id) pairs identifying tracked entities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::TrailError;

/// Instance identifier of a tracked entity
pub type EntityId = u64;

/// Identifies a tracked entity instance by type and id
///
/// Version records hold this pair rather than a live reference, so the
/// subject may be destroyed or its type renamed without breaking history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectRef {
    #[serde(rename = "subjectType")]
    pub subject_type: String,
    #[serde(rename = "subjectId")]
    pub subject_id: EntityId,
}

impl SubjectRef {
    pub fn new(subject_type: impl Into<String>, subject_id: EntityId) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id,
        }
    }

    /// Parse a `"Type:id"` search token
    pub fn parse_composite(token: &str) -> Result<Self, TrailError> {
        let invalid = || TrailError::InvalidCompositeKey(token.to_string());

        let (subject_type, id) = token.split_once(':').ok_or_else(invalid)?;
        let subject_type = subject_type.trim();
        if subject_type.is_empty() {
            return Err(invalid());
        }
        let subject_id = id.trim().parse::<EntityId>().map_err(|_| invalid())?;

        Ok(Self::new(subject_type, subject_id))
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.subject_id)
    }
}

impl FromStr for SubjectRef {
    type Err = TrailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_composite(s)
    }
}
