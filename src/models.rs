//! Wire models shared between handlers and the lock coordinator.

use serde::{Deserialize, Serialize};

/// Lock metadata sent by Terraform with LOCK and UNLOCK requests.
///
/// Field names follow Terraform's JSON encoding.  Only `ID` is interpreted
/// (it decides ownership); the remaining fields are opaque context echoed
/// back to clients on conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Operation")]
    pub operation: String,
    #[serde(rename = "Info")]
    pub info: String,
    #[serde(rename = "Who")]
    pub who: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Created")]
    pub created: String,
    #[serde(rename = "Path")]
    pub path: String,
}

impl LockInfo {
    /// Lock info carrying only an owner ID, as reconstructed from the
    /// stored lock record.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// One row of the `GET /states` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSummary {
    /// Full entry path in the backing secrets store.
    pub backing_name: String,
    /// Display name: the state name with the namespace prefix stripped.
    pub name: String,
    /// Creation timestamp of the latest stored version.
    pub version_created_at: String,
    /// Whether a lock record currently exists for this state.
    pub is_locked: bool,
    /// Owner ID of the current lock, when locked.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_lock_id: String,
}
