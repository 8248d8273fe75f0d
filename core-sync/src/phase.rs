//! Synchronization phases of a repository run.
//!
//! Phases run phase-major: every attached content source finishes a phase
//! before any source starts the next one. Progress is reset between phase
//! groups, so each group reports its own 0-100%.

use bridge_traits::{Capability, SyncStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncPhase {
    PackageMetadata,
    PackageBits,
    DistributionMetadata,
    DistributionBits,
    AdvisoryMetadata,
}

impl SyncPhase {
    /// Status persisted while this phase is running
    pub fn status(&self) -> SyncStatus {
        match self {
            SyncPhase::PackageMetadata => SyncStatus::PackageMetadata,
            SyncPhase::PackageBits => SyncStatus::PackageBits,
            SyncPhase::DistributionMetadata => SyncStatus::DistroMetadata,
            SyncPhase::DistributionBits => SyncStatus::DistroBits,
            SyncPhase::AdvisoryMetadata => SyncStatus::AdvisoryMetadata,
        }
    }

    /// Adapter capability the phase needs
    pub fn capability(&self) -> Capability {
        match self {
            SyncPhase::PackageMetadata | SyncPhase::PackageBits => Capability::PackageSource,
            SyncPhase::DistributionMetadata | SyncPhase::DistributionBits => {
                Capability::DistributionSource
            }
            SyncPhase::AdvisoryMetadata => Capability::AdvisorySource,
        }
    }

    /// Phases that download content for items found by a metadata phase
    pub fn is_bits(&self) -> bool {
        matches!(self, SyncPhase::PackageBits | SyncPhase::DistributionBits)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::PackageMetadata => "package metadata",
            SyncPhase::PackageBits => "package bits",
            SyncPhase::DistributionMetadata => "distribution metadata",
            SyncPhase::DistributionBits => "distribution bits",
            SyncPhase::AdvisoryMetadata => "advisory metadata",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phases grouped by progress reset, in execution order.
///
/// Distribution metadata and bits share one group.
pub const PHASE_GROUPS: [&[SyncPhase]; 4] = [
    &[SyncPhase::PackageMetadata],
    &[SyncPhase::PackageBits],
    &[SyncPhase::DistributionMetadata, SyncPhase::DistributionBits],
    &[SyncPhase::AdvisoryMetadata],
];
