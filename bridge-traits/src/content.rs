//! Content metadata exchanged between adapters and the record store.
//!
//! Adapters fill the `*SyncReport` types by diffing what the remote side holds
//! against the `existing` entries the engine hands them; the engine merges the
//! reports into the record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Packages
// ============================================================================

/// Natural key of a package version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageKey {
    pub name: String,
    pub version: String,
    pub package_type: String,
    pub architecture: String,
}

/// Metadata describing one package version offered by a content source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub key: PackageKey,
    pub display_name: Option<String>,
    pub file_name: String,
    pub file_created: Option<DateTime<Utc>>,
    pub file_size: Option<u64>,
    pub sha256: Option<String>,
    /// Adapter-specific location used to stream the bits
    pub location: String,
}

impl PackageDetails {
    pub fn new(key: PackageKey, file_name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            key,
            display_name: None,
            file_name: file_name.into(),
            file_created: None,
            file_size: None,
            sha256: None,
            location: location.into(),
        }
    }
}

/// Differences an adapter found between remote packages and known packages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSyncReport {
    pub new_packages: Vec<PackageDetails>,
    pub updated_packages: Vec<PackageDetails>,
    pub deleted_packages: Vec<PackageDetails>,
    pub summary: Option<String>,
}

impl PackageSyncReport {
    pub fn add_new_package(&mut self, package: PackageDetails) {
        self.new_packages.push(package);
    }

    pub fn add_updated_package(&mut self, package: PackageDetails) {
        self.updated_packages.push(package);
    }

    pub fn add_deleted_package(&mut self, package: PackageDetails) {
        self.deleted_packages.push(package);
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    /// Total number of package entries the report touches
    pub fn len(&self) -> usize {
        self.new_packages.len() + self.updated_packages.len() + self.deleted_packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Distributions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionFileDetails {
    pub relative_filename: String,
    pub sha256: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub file_size: Option<u64>,
}

/// A distribution tree (installer media and the like)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionDetails {
    pub label: String,
    pub dist_path: String,
    pub distribution_type: String,
    pub files: Vec<DistributionFileDetails>,
}

impl DistributionDetails {
    pub fn new(
        label: impl Into<String>,
        dist_path: impl Into<String>,
        distribution_type: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            dist_path: dist_path.into(),
            distribution_type: distribution_type.into(),
            files: Vec::new(),
        }
    }
}

/// A distribution file whose bits have not been downloaded yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionFileRef {
    pub label: String,
    pub dist_path: String,
    pub file: DistributionFileDetails,
}

impl DistributionFileRef {
    /// Location handed to the adapter when streaming this file
    pub fn location(&self) -> String {
        format!("{}/{}", self.dist_path, self.file.relative_filename)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSyncReport {
    pub new_distributions: Vec<DistributionDetails>,
    pub deleted_distributions: Vec<DistributionDetails>,
    pub summary: Option<String>,
}

impl DistributionSyncReport {
    pub fn add_new_distribution(&mut self, distribution: DistributionDetails) {
        self.new_distributions.push(distribution);
    }

    pub fn add_deleted_distribution(&mut self, distribution: DistributionDetails) {
        self.deleted_distributions.push(distribution);
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    pub fn len(&self) -> usize {
        self.new_distributions.len() + self.deleted_distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Advisories
// ============================================================================

/// Errata/advisory metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryDetails {
    pub advisory: String,
    pub advisory_type: String,
    pub synopsis: String,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub issue_date: Option<DateTime<Utc>>,
    /// Affected package file names
    pub packages: Vec<String>,
    pub cves: Vec<String>,
}

impl AdvisoryDetails {
    pub fn new(
        advisory: impl Into<String>,
        advisory_type: impl Into<String>,
        synopsis: impl Into<String>,
    ) -> Self {
        Self {
            advisory: advisory.into(),
            advisory_type: advisory_type.into(),
            synopsis: synopsis.into(),
            description: None,
            severity: None,
            issue_date: None,
            packages: Vec::new(),
            cves: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorySyncReport {
    pub new_advisories: Vec<AdvisoryDetails>,
    pub updated_advisories: Vec<AdvisoryDetails>,
    pub deleted_advisories: Vec<AdvisoryDetails>,
    pub summary: Option<String>,
}

impl AdvisorySyncReport {
    pub fn add_new_advisory(&mut self, advisory: AdvisoryDetails) {
        self.new_advisories.push(advisory);
    }

    pub fn add_updated_advisory(&mut self, advisory: AdvisoryDetails) {
        self.updated_advisories.push(advisory);
    }

    pub fn add_deleted_advisory(&mut self, advisory: AdvisoryDetails) {
        self.deleted_advisories.push(advisory);
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    pub fn len(&self) -> usize {
        self.new_advisories.len() + self.updated_advisories.len() + self.deleted_advisories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Candidate Repositories
// ============================================================================

/// A repository discovered on a content source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDetails {
    pub name: String,
    pub description: Option<String>,
    pub parent_name: Option<String>,
}

impl RepoDetails {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parent_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoImportReport {
    pub repos: Vec<RepoDetails>,
}

impl RepoImportReport {
    pub fn add_repo(&mut self, repo: RepoDetails) {
        self.repos.push(repo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(name: &str) -> PackageDetails {
        PackageDetails::new(
            PackageKey {
                name: name.to_string(),
                version: "1.0".to_string(),
                package_type: "file".to_string(),
                architecture: "noarch".to_string(),
            },
            format!("{}.bin", name),
            format!("repo/{}.bin", name),
        )
    }

    #[test]
    fn test_package_report_counts_every_change() {
        let mut report = PackageSyncReport::default();
        assert!(report.is_empty());

        report.add_new_package(package("a"));
        report.add_updated_package(package("b"));
        report.add_deleted_package(package("c"));

        assert_eq!(report.len(), 3);
    }

    #[test]
    fn test_distribution_file_location() {
        let file = DistributionFileRef {
            label: "rhel-6".to_string(),
            dist_path: "dist/rhel-6".to_string(),
            file: DistributionFileDetails {
                relative_filename: "images/boot.iso".to_string(),
                sha256: None,
                last_modified: None,
                file_size: None,
            },
        };
        assert_eq!(file.location(), "dist/rhel-6/images/boot.iso");
    }
}
