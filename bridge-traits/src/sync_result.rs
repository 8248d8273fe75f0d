//! # Sync Result Records
//!
//! One `SyncResult` exists per synchronization attempt against a content
//! source or a repository.
//!
//! ## State Machine
//!
//! ```text
//! INPROGRESS → PACKAGEMETADATA → PACKAGEBITS → DISTROMETADATA → DISTROBITS
//!     → ADVISORYMETADATA → SUCCESS
//!
//! any non-terminal ──→ FAILURE
//! any non-terminal ──→ CANCELLING (external request) ──→ CANCELLED
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::model::{ContentSourceId, RepoId};

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncResultId(Uuid);

impl SyncResultId {
    /// Create a new random sync result ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a sync result ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid sync result id: {}", e)))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncResultId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncResultId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// Status of a synchronization run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    InProgress,
    PackageMetadata,
    PackageBits,
    DistroMetadata,
    DistroBits,
    AdvisoryMetadata,
    Success,
    Failure,
    /// Set by an external cancellation requester, never by the engine
    Cancelling,
    Cancelled,
}

impl SyncStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Success | SyncStatus::Failure | SyncStatus::Cancelled
        )
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::InProgress => "INPROGRESS",
            SyncStatus::PackageMetadata => "PACKAGEMETADATA",
            SyncStatus::PackageBits => "PACKAGEBITS",
            SyncStatus::DistroMetadata => "DISTROMETADATA",
            SyncStatus::DistroBits => "DISTROBITS",
            SyncStatus::AdvisoryMetadata => "ADVISORYMETADATA",
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Failure => "FAILURE",
            SyncStatus::Cancelling => "CANCELLING",
            SyncStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "INPROGRESS" => Ok(SyncStatus::InProgress),
            "PACKAGEMETADATA" => Ok(SyncStatus::PackageMetadata),
            "PACKAGEBITS" => Ok(SyncStatus::PackageBits),
            "DISTROMETADATA" => Ok(SyncStatus::DistroMetadata),
            "DISTROBITS" => Ok(SyncStatus::DistroBits),
            "ADVISORYMETADATA" => Ok(SyncStatus::AdvisoryMetadata),
            "SUCCESS" => Ok(SyncStatus::Success),
            "FAILURE" => Ok(SyncStatus::Failure),
            "CANCELLING" => Ok(SyncStatus::Cancelling),
            "CANCELLED" => Ok(SyncStatus::Cancelled),
            _ => Err(BridgeError::InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a sync result describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SyncTarget {
    Source(ContentSourceId),
    Repo(RepoId),
}

impl SyncTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncTarget::Source(_) => "source",
            SyncTarget::Repo(_) => "repo",
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            SyncTarget::Source(id) => id.get(),
            SyncTarget::Repo(id) => id.get(),
        }
    }

    /// Rebuild a target from its stored `kind` and id.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown kind
    pub fn from_parts(kind: &str, id: i64) -> Result<Self> {
        match kind {
            "source" => Ok(SyncTarget::Source(ContentSourceId(id))),
            "repo" => Ok(SyncTarget::Repo(RepoId(id))),
            other => Err(BridgeError::DatabaseError(format!(
                "Invalid sync target kind: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTarget::Source(id) => write!(f, "content source [{}]", id),
            SyncTarget::Repo(id) => write!(f, "repo [{}]", id),
        }
    }
}

// ============================================================================
// Sync Result
// ============================================================================

/// One synchronization attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub id: SyncResultId,
    pub target: SyncTarget,
    pub status: SyncStatus,
    /// Human-readable progress log
    pub results: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub percent_complete: u32,
    /// Bumped by the record store on every merge
    pub version: i64,
}

impl SyncResult {
    /// Create a fresh `INPROGRESS` result for `target`
    pub fn new(target: SyncTarget, start_time: DateTime<Utc>) -> Self {
        Self {
            id: SyncResultId::new(),
            target,
            status: SyncStatus::InProgress,
            results: String::new(),
            start_time,
            end_time: None,
            percent_complete: 0,
            version: 0,
        }
    }

    /// Append one line to the progress log
    pub fn append_results(&mut self, line: impl AsRef<str>) {
        if !self.results.is_empty() && !self.results.ends_with('\n') {
            self.results.push('\n');
        }
        self.results.push_str(line.as_ref());
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
