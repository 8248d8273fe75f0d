//! Disk source configuration

use std::path::{Path, PathBuf};

use bridge_traits::Configuration;
use regex::Regex;

use crate::error::{DiskError, Result};

pub const ROOT_DIRECTORY: &str = "rootDirectory";
pub const PACKAGE_SOURCE_ENABLED: &str = "packageSourceEnabled";
pub const REPO_SOURCE_ENABLED: &str = "repoSourceEnabled";
pub const FILENAME_FILTER: &str = "filenameFilter";
pub const PACKAGE_TYPE_NAME: &str = "packageTypeName";
pub const ARCHITECTURE_NAME: &str = "architectureName";

const DEFAULT_FILENAME_FILTER: &str = ".*";
const DEFAULT_PACKAGE_TYPE: &str = "file";
const DEFAULT_ARCHITECTURE: &str = "noarch";

/// Settings of one disk content source
#[derive(Debug, Clone)]
pub struct DiskConfig {
    /// Directory content is served from
    pub root_directory: PathBuf,
    pub package_source_enabled: bool,
    pub repo_source_enabled: bool,
    /// Filter applied to the whole absolute path of each file
    pub filename_filter: String,
    pub package_type_name: String,
    pub architecture_name: String,
    matcher: Regex,
}

impl DiskConfig {
    /// Read the settings out of a content source configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when `rootDirectory` is missing or a flag is
    /// not a boolean, `InvalidFilter` when the filter does not compile.
    pub fn from_configuration(configuration: &Configuration) -> Result<Self> {
        let root_directory = configuration
            .require(ROOT_DIRECTORY)
            .map_err(|e| DiskError::Configuration(e.to_string()))?;
        let flag = |key: &str| {
            configuration
                .get_bool(key, true)
                .map_err(|e| DiskError::Configuration(e.to_string()))
        };
        let text = |key: &str, default: &str| {
            configuration
                .get(key)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let filename_filter = text(FILENAME_FILTER, DEFAULT_FILENAME_FILTER);
        // The filter must match the whole path, not a substring of it
        let matcher = Regex::new(&format!("^(?:{})$", filename_filter)).map_err(|source| {
            DiskError::InvalidFilter {
                pattern: filename_filter.clone(),
                source,
            }
        })?;

        Ok(Self {
            root_directory: PathBuf::from(root_directory),
            package_source_enabled: flag(PACKAGE_SOURCE_ENABLED)?,
            repo_source_enabled: flag(REPO_SOURCE_ENABLED)?,
            filename_filter,
            package_type_name: text(PACKAGE_TYPE_NAME, DEFAULT_PACKAGE_TYPE),
            architecture_name: text(ARCHITECTURE_NAME, DEFAULT_ARCHITECTURE),
            matcher,
        })
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.matcher.is_match(&path.to_string_lossy())
    }
}
