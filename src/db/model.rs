use crate::model::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One watched manifest file and its fingerprint state machine.
///
/// `current_fp` is the last fully-applied fingerprint, `target_fp` the one
/// being reconciled (empty when idle) and `waiting_fp` the latest observed
/// one. At most one non-empty target exists per row; `current_fp` only
/// advances when a target completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchedManifest {
    pub id: i64,
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub git_ref: String,
    pub current_fp: String,
    pub target_fp: String,
    pub waiting_fp: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WatchedManifest {
    /// Idle means no reconciliation target is in flight.
    pub fn is_idle(&self) -> bool {
        self.target_fp.is_empty()
    }
}

/// Persisted fact that a repository exists under a watched manifest.
/// Created once, never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryRecord {
    pub id: i64,
    pub owner: String,
    pub repo: String,
    pub description: String,
    pub visibility: String,
    pub manifest_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A currently-granted role. Unique on (owner, repo, user).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Privilege {
    pub owner: String,
    pub repo: String,
    pub user: String,
    pub role: Role,
}
