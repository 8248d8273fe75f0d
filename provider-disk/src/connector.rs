//! Disk content provider implementation
//!
//! Implements `ContentProvider`, `RepoSource` and `PackageSource` over a
//! directory tree using `tokio::fs`.

use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use bridge_traits::{
    AdapterResult, Configuration, ContentProvider, ContentStream, PackageDetails, PackageKey,
    PackageSource, PackageSyncReport, RepoDetails, RepoImportReport, RepoSource,
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::error::{DiskError, Result};
use crate::types::DiskConfig;

/// Content source type name adapters of this crate register under
pub const DISK_SOURCE_TYPE: &str = "disk";

/// Hex digits of the SHA-256 digest used as a package version
const VERSION_DIGEST_LEN: usize = 16;

/// Content provider serving packages from a local directory tree
///
/// Repositories are directories; the packages of a repository are the files
/// directly inside the first directory carrying its name.
///
/// # Example
///
/// ```ignore
/// use provider_disk::DiskContentProvider;
/// use bridge_traits::{Configuration, ContentProvider};
///
/// let mut provider = DiskContentProvider::new();
/// provider
///     .initialize(&Configuration::new().with("rootDirectory", "/srv/content"))
///     .await?;
/// let report = provider.as_repo_source().unwrap().import_repos().await?;
/// ```
pub struct DiskContentProvider {
    /// Cleared on shutdown
    config: RwLock<Option<DiskConfig>>,
    package_source_enabled: bool,
    repo_source_enabled: bool,
}

impl DiskContentProvider {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(None),
            package_source_enabled: false,
            repo_source_enabled: false,
        }
    }

    async fn config(&self) -> Result<DiskConfig> {
        self.config
            .read()
            .await
            .clone()
            .ok_or(DiskError::NotInitialized)
    }

    /// Resolve the root to an absolute path and make sure it is a readable
    /// directory
    async fn check_root(root: &Path) -> Result<PathBuf> {
        let absolute = match fs::canonicalize(root).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DiskError::MissingRoot(root.to_path_buf()))
            }
            Err(source) => {
                return Err(DiskError::NotReadable {
                    path: root.to_path_buf(),
                    source,
                })
            }
        };

        let metadata = fs::metadata(&absolute)
            .await
            .map_err(|source| DiskError::NotReadable {
                path: absolute.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(DiskError::NotADirectory(absolute));
        }

        fs::read_dir(&absolute)
            .await
            .map_err(|source| DiskError::NotReadable {
                path: absolute.clone(),
                source,
            })?;
        Ok(absolute)
    }

    /// Entries of `path`, sorted by name, split into directories and files
    async fn list_directory(path: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut directories = Vec::new();
        let mut files = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(DiskError::io(path))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(DiskError::io(path))?
        {
            let file_type = entry.file_type().await.map_err(DiskError::io(entry.path()))?;
            if file_type.is_dir() {
                directories.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }

        directories.sort();
        files.sort();
        Ok((directories, files))
    }

    /// Every directory below `root` in depth-first order, with its parent's
    /// name (`None` for top-level directories)
    async fn walk_directories(root: &Path) -> Result<Vec<(PathBuf, Option<String>)>> {
        let mut found = Vec::new();
        let mut stack = vec![(root.to_path_buf(), None)];

        while let Some((directory, parent)) = stack.pop() {
            if directory != root {
                found.push((directory.clone(), parent));
            }
            let name = (directory != root).then(|| file_name(&directory));
            let (children, _) = Self::list_directory(&directory).await?;
            for child in children.into_iter().rev() {
                stack.push((child, name.clone()));
            }
        }
        Ok(found)
    }

    async fn find_repo_directory(root: &Path, repo_name: &str) -> Result<Option<PathBuf>> {
        let directories = Self::walk_directories(root).await?;
        Ok(directories
            .into_iter()
            .map(|(directory, _)| directory)
            .find(|directory| file_name(directory) == repo_name))
    }

    /// Describe `path` as a package, or `None` when the filter rejects it
    async fn describe_package(config: &DiskConfig, path: &Path) -> Result<Option<PackageDetails>> {
        if !config.accepts(path) {
            return Ok(None);
        }

        let bits = fs::read(path).await.map_err(DiskError::io(path))?;
        let metadata = fs::metadata(path).await.map_err(DiskError::io(path))?;
        let sha256 = format!("{:x}", Sha256::digest(&bits));
        let name = file_name(path);

        let key = PackageKey {
            name: name.clone(),
            version: sha256[..VERSION_DIGEST_LEN].to_string(),
            package_type: config.package_type_name.clone(),
            architecture: config.architecture_name.clone(),
        };
        let location = relative_location(&config.root_directory, path);
        let mut package = PackageDetails::new(key, name.clone(), location);
        package.display_name = Some(name);
        package.file_size = Some(metadata.len());
        package.file_created = metadata.modified().ok().map(DateTime::<Utc>::from);
        package.sha256 = Some(sha256);
        Ok(Some(package))
    }

    async fn scan_packages(
        &self,
        repo_name: &str,
        report: &mut PackageSyncReport,
        existing: &[PackageDetails],
    ) -> Result<()> {
        let config = self.config().await?;
        let started = Instant::now();

        // Whatever is not found on disk gets deleted
        let mut unseen: Vec<&PackageDetails> = existing.iter().collect();

        match Self::find_repo_directory(&config.root_directory, repo_name).await? {
            Some(directory) => {
                let (_, files) = Self::list_directory(&directory).await?;
                for path in files {
                    let Some(package) = Self::describe_package(&config, &path).await? else {
                        debug!("Ignoring [{}], it does not match the filename filter", path.display());
                        continue;
                    };

                    match unseen.iter().position(|known| known.key == package.key) {
                        None => report.add_new_package(package),
                        Some(index) => {
                            let known = unseen.swap_remove(index);
                            if package.file_created > known.file_created {
                                report.add_updated_package(package);
                            }
                        }
                    }
                }
            }
            None => debug!(
                "No directory named [{}] under [{}]",
                repo_name,
                config.root_directory.display()
            ),
        }

        for package in unseen {
            report.add_deleted_package(package.clone());
        }

        report.set_summary(format!(
            "Synchronized [{}]. Elapsed time=[{}] ms",
            config.root_directory.display(),
            started.elapsed().as_millis()
        ));
        Ok(())
    }
}

impl Default for DiskContentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentProvider for DiskContentProvider {
    async fn initialize(&mut self, configuration: &Configuration) -> AdapterResult<()> {
        let mut config = DiskConfig::from_configuration(configuration)?;
        config.root_directory = Self::check_root(&config.root_directory).await?;

        info!(
            root = %config.root_directory.display(),
            filter = %config.filename_filter,
            "Initialized disk content source"
        );
        self.package_source_enabled = config.package_source_enabled;
        self.repo_source_enabled = config.repo_source_enabled;
        *self.config.get_mut() = Some(config);
        Ok(())
    }

    async fn shutdown(&self) -> AdapterResult<()> {
        self.config.write().await.take();
        Ok(())
    }

    async fn test_connection(&self) -> AdapterResult<()> {
        let config = self.config().await?;
        Self::check_root(&config.root_directory).await?;
        Ok(())
    }

    fn as_repo_source(&self) -> Option<&dyn RepoSource> {
        self.repo_source_enabled.then_some(self as &dyn RepoSource)
    }

    fn as_package_source(&self) -> Option<&dyn PackageSource> {
        self.package_source_enabled.then_some(self as &dyn PackageSource)
    }
}

#[async_trait]
impl RepoSource for DiskContentProvider {
    #[instrument(skip(self))]
    async fn import_repos(&self) -> AdapterResult<RepoImportReport> {
        let config = self.config().await?;
        let mut report = RepoImportReport::default();

        for (directory, parent) in Self::walk_directories(&config.root_directory).await? {
            let mut repo = RepoDetails::new(file_name(&directory));
            repo.parent_name = parent;
            report.add_repo(repo);
        }

        debug!("Found {} candidate repositories", report.repos.len());
        Ok(report)
    }
}

#[async_trait]
impl PackageSource for DiskContentProvider {
    #[instrument(skip(self, report, existing), fields(existing = existing.len()))]
    async fn synchronize_packages(
        &self,
        repo_name: &str,
        report: &mut PackageSyncReport,
        existing: &[PackageDetails],
    ) -> AdapterResult<()> {
        self.scan_packages(repo_name, report, existing).await?;
        Ok(())
    }

    async fn open_package_bits(&self, location: &str) -> AdapterResult<Option<ContentStream>> {
        let config = self.config().await?;
        let relative = Path::new(location);
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(DiskError::InvalidLocation(location.to_string()).into());
        }

        let path = config.root_directory.join(relative);
        let file = fs::File::open(&path).await.map_err(DiskError::io(&path))?;
        debug!(path = %path.display(), "Opened package bits");
        let stream: ContentStream = Box::new(file);
        Ok(Some(stream))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `path` relative to `root`, `/`-separated
fn relative_location(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FILENAME_FILTER, PACKAGE_SOURCE_ENABLED, ROOT_DIRECTORY};
    use bridge_traits::AdapterError;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    /// root/
    ///   tree/
    ///     base/     a.rpm b.rpm notes.txt
    ///     updates/  c.rpm
    async fn content_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("tree").join("base");
        let updates = dir.path().join("tree").join("updates");
        fs::create_dir_all(&base).await.unwrap();
        fs::create_dir_all(&updates).await.unwrap();
        fs::write(base.join("a.rpm"), b"package a").await.unwrap();
        fs::write(base.join("b.rpm"), b"package b").await.unwrap();
        fs::write(base.join("notes.txt"), b"not a package").await.unwrap();
        fs::write(updates.join("c.rpm"), b"package c").await.unwrap();
        dir
    }

    async fn provider(root: &Path, configuration: Configuration) -> DiskContentProvider {
        let mut provider = DiskContentProvider::new();
        provider
            .initialize(&configuration.with(ROOT_DIRECTORY, root.to_string_lossy()))
            .await
            .unwrap();
        provider
    }

    fn rpm_only() -> Configuration {
        Configuration::new().with(FILENAME_FILTER, r".*\.rpm")
    }

    async fn sync(
        provider: &DiskContentProvider,
        repo: &str,
        existing: &[PackageDetails],
    ) -> PackageSyncReport {
        let mut report = PackageSyncReport::default();
        provider
            .synchronize_packages(repo, &mut report, existing)
            .await
            .unwrap();
        report
    }

    #[tokio::test]
    async fn test_initialize_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let mut provider = DiskContentProvider::new();

        let error = provider
            .initialize(
                &Configuration::new()
                    .with(ROOT_DIRECTORY, dir.path().join("missing").to_string_lossy()),
            )
            .await
            .unwrap_err();

        assert!(error.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_initialize_rejects_plain_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").await.unwrap();
        let mut provider = DiskContentProvider::new();

        let error = provider
            .initialize(&Configuration::new().with(ROOT_DIRECTORY, file.to_string_lossy()))
            .await
            .unwrap_err();

        assert!(error.to_string().contains("is not a directory"));
    }

    #[tokio::test]
    async fn test_import_repos_lists_every_directory() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), Configuration::new()).await;

        let report = provider.import_repos().await.unwrap();

        let repos: Vec<(&str, Option<&str>)> = report
            .repos
            .iter()
            .map(|repo| (repo.name.as_str(), repo.parent_name.as_deref()))
            .collect();
        assert_eq!(
            repos,
            vec![
                ("tree", None),
                ("base", Some("tree")),
                ("updates", Some("tree")),
            ]
        );
    }

    #[tokio::test]
    async fn test_new_packages_are_reported() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), rpm_only()).await;

        let report = sync(&provider, "base", &[]).await;

        let names: Vec<&str> = report
            .new_packages
            .iter()
            .map(|package| package.key.name.as_str())
            .collect();
        assert_eq!(names, vec!["a.rpm", "b.rpm"]);

        let a = &report.new_packages[0];
        assert_eq!(a.location, "tree/base/a.rpm");
        assert_eq!(a.file_size, Some(9));
        assert_eq!(a.key.package_type, "file");
        assert_eq!(a.key.version.len(), VERSION_DIGEST_LEN);
        assert!(a.sha256.as_deref().unwrap().starts_with(&a.key.version));
        assert!(report.summary.unwrap().starts_with("Synchronized ["));
    }

    #[tokio::test]
    async fn test_known_packages_are_diffed() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), rpm_only()).await;
        let first = sync(&provider, "base", &[]).await;

        let mut existing = first.new_packages.clone();
        // Known but gone from disk
        let mut ghost = existing[0].clone();
        ghost.key.name = "ghost.rpm".to_string();
        existing.push(ghost);
        // Known with an older timestamp
        existing[1].file_created = existing[1]
            .file_created
            .map(|created| created - chrono::Duration::hours(1));

        let report = sync(&provider, "base", &existing).await;

        assert!(report.new_packages.is_empty());
        assert_eq!(report.updated_packages.len(), 1);
        assert_eq!(report.updated_packages[0].key.name, "b.rpm");
        assert_eq!(report.deleted_packages.len(), 1);
        assert_eq!(report.deleted_packages[0].key.name, "ghost.rpm");
    }

    #[tokio::test]
    async fn test_changed_content_is_a_new_version() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), rpm_only()).await;
        let first = sync(&provider, "updates", &[]).await;

        let path = dir.path().join("tree").join("updates").join("c.rpm");
        fs::write(&path, b"package c, rebuilt").await.unwrap();

        let report = sync(&provider, "updates", &first.new_packages).await;

        assert_eq!(report.new_packages.len(), 1);
        assert_ne!(report.new_packages[0].key.version, first.new_packages[0].key.version);
        assert_eq!(report.deleted_packages.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_repo_deletes_everything_known() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), rpm_only()).await;
        let first = sync(&provider, "base", &[]).await;

        let report = sync(&provider, "missing", &first.new_packages).await;

        assert!(report.new_packages.is_empty());
        assert_eq!(report.deleted_packages.len(), 2);
    }

    #[tokio::test]
    async fn test_open_package_bits_streams_file() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), Configuration::new()).await;

        let mut stream = provider
            .open_package_bits("tree/updates/c.rpm")
            .await
            .unwrap()
            .unwrap();
        let mut bits = Vec::new();
        stream.read_to_end(&mut bits).await.unwrap();

        assert_eq!(bits, b"package c");
    }

    #[tokio::test]
    async fn test_open_missing_bits_is_transport_error() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), Configuration::new()).await;

        let error = provider.open_package_bits("tree/base/zzz.rpm").await.err().unwrap();

        assert!(error.is_transport());
    }

    #[tokio::test]
    async fn test_open_outside_root_is_rejected() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), Configuration::new()).await;

        let error = provider.open_package_bits("../etc/passwd").await.err().unwrap();

        assert!(matches!(error, AdapterError::Remote(_)));
    }

    #[tokio::test]
    async fn test_disabled_package_source_hides_capability() {
        let dir = content_tree().await;
        let provider = provider(
            dir.path(),
            Configuration::new().with(PACKAGE_SOURCE_ENABLED, "false"),
        )
        .await;

        assert!(provider.as_package_source().is_none());
        assert!(provider.as_repo_source().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_forgets_root() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), Configuration::new()).await;
        provider.test_connection().await.unwrap();

        provider.shutdown().await.unwrap();

        assert!(provider.test_connection().await.is_err());
        assert!(provider.import_repos().await.is_err());
    }

    #[tokio::test]
    async fn test_connection_notices_removed_root() {
        let dir = content_tree().await;
        let provider = provider(dir.path(), Configuration::new()).await;

        fs::remove_dir_all(dir.path()).await.unwrap();

        let error = provider.test_connection().await.unwrap_err();
        assert!(error.to_string().contains("does not exist"));
    }
}
