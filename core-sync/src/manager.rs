//! # Content Provider Manager
//!
//! Top-level entry point of the synchronization engine.
//!
//! ## Overview
//!
//! The `ContentProviderManager` owns the [`AdapterRegistry`] and exposes:
//! - source-level synchronization (candidate repository discovery), single-flight
//!   guarded by a process-wide lock around result creation
//! - repository synchronization through the phase pipeline
//! - retrying access to package and distribution bits
//! - adapter lifecycle operations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{ContentProviderManager, InMemoryRecordStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryRecordStore::new());
//! let manager = ContentProviderManager::builder(store)
//!     .register_factory(Arc::new(FnAdapterFactory::new("disk", || {
//!         Box::new(DiskContentProvider::new()) as Box<dyn ContentProvider>
//!     })))
//!     .build()?;
//!
//! manager.initialize().await?;
//! manager.synchronize_repo(RepoId(1)).await?;
//! ```

use std::sync::Arc;

use bridge_traits::{
    Clock, ContentSource, ContentSourceId, ContentStream, RecordStore, RepoId, SyncResult,
    SyncStatus, SyncTarget, SystemClock,
};
use core_runtime::config::EngineConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::error::format_error_chain;
use crate::pipeline::RepoPipeline;
use crate::registry::{AdapterFactory, AdapterRegistry};
use crate::retry::RetryPolicy;
use crate::streaming::{open_with_retry, BitsKind};
use crate::synchronizer::repo_source;
use crate::{Result, SyncError};

pub struct ContentProviderManager {
    registry: AdapterRegistry,
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    event_bus: EventBus,
    /// One source-level result creation at a time across the process
    source_sync_lock: Mutex<()>,
}

impl ContentProviderManager {
    pub fn builder(store: Arc<dyn RecordStore>) -> ContentProviderManagerBuilder {
        ContentProviderManagerBuilder::new(store)
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Subscribe here to follow sync and adapter events
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start adapters for every source the record store knows.
    ///
    /// Sources whose adapter fails to initialize are logged and left
    /// unmanaged. Returns how many adapters are running.
    pub async fn initialize(&self) -> Result<usize> {
        let sources = self.store.load_sources().await?;
        info!("Initializing adapters for {} content sources", sources.len());
        let running = self.registry.start_all(&sources).await;
        if running < sources.len() {
            warn!(
                "{} of {} content sources have no running adapter",
                sources.len() - running,
                sources.len()
            );
        }
        Ok(running)
    }

    pub async fn shutdown(&self) {
        info!("Shutting down all content source adapters");
        self.registry.shutdown_all().await;
    }

    pub async fn start_adapter(&self, source: &ContentSource) -> Result<()> {
        self.registry.start_adapter(source).await
    }

    pub async fn shutdown_adapter(&self, source: &ContentSource) {
        self.registry.shutdown_adapter(source).await;
    }

    /// Pick up a changed source configuration
    pub async fn restart_adapter(&self, source: &ContentSource) -> Result<()> {
        self.registry.restart_adapter(source).await
    }

    /// Sources that currently have a running adapter
    pub async fn all_content_sources(&self) -> Vec<ContentSource> {
        self.registry.sources().await
    }

    // ------------------------------------------------------------------
    // Connectivity & bits
    // ------------------------------------------------------------------

    /// Ask the source's adapter whether its remote side is reachable.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown source. Adapter failures are
    /// reported as `Ok(false)`.
    #[instrument(skip(self), fields(source_id = %source_id))]
    pub async fn test_connection(&self, source_id: ContentSourceId) -> Result<bool> {
        let adapter = self.registry.resolve(source_id).await?;
        match adapter.test_connection().await {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(
                    "Connection test failed for content source [{}]: {}",
                    source_id, e
                );
                Ok(false)
            }
        }
    }

    /// Stream the package bits at `location`, retrying transport failures
    pub async fn load_content_bits(
        &self,
        source_id: ContentSourceId,
        location: &str,
    ) -> Result<ContentStream> {
        let adapter = self.registry.resolve(source_id).await?;
        open_with_retry(&adapter, BitsKind::Package, location, &self.retry).await
    }

    /// Stream the distribution file at `location`, retrying transport failures
    pub async fn load_distribution_bits(
        &self,
        source_id: ContentSourceId,
        location: &str,
    ) -> Result<ContentStream> {
        let adapter = self.registry.resolve(source_id).await?;
        open_with_retry(&adapter, BitsKind::DistributionFile, location, &self.retry).await
    }

    // ------------------------------------------------------------------
    // Synchronization
    // ------------------------------------------------------------------

    /// Synchronize one content source.
    ///
    /// Returns `false` without doing anything when the source already has a
    /// running sync, `true` once the run is over.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown source and `SourceSyncFailed` when
    /// the run failed; the failure is persisted before it is returned.
    #[instrument(skip(self), fields(source_id = %source_id))]
    pub async fn synchronize_source(&self, source_id: ContentSourceId) -> Result<bool> {
        let source = self
            .store
            .load_source(source_id)
            .await?
            .ok_or(SyncError::NotFound {
                kind: "content source",
                id: source_id.get(),
            })?;
        let target = SyncTarget::Source(source_id);

        let created = {
            let _guard = self.source_sync_lock.lock().await;
            let fresh = SyncResult::new(target, self.clock.now());
            match self.store.create_sync_result(fresh).await? {
                Some(created) => created,
                None => {
                    info!(
                        "Content source [{}] is already currently being synchronized, this sync request will be ignored",
                        source.name
                    );
                    return Ok(false);
                }
            }
        };
        self.emit(SyncEvent::Started {
            target,
            result_id: created.id.as_str(),
        });

        let mut result = created;
        let outcome = match self.run_source_sync(&source, &mut result).await {
            Ok(()) => {
                result.status = SyncStatus::Success;
                result.percent_complete = 100;
                info!("Content source [{}] completed syncing", source.name);
                self.emit(SyncEvent::Completed {
                    target,
                    status: SyncStatus::Success,
                });
                Ok(true)
            }
            Err(cause) => {
                let failure = SyncError::SourceSyncFailed {
                    source_id,
                    cause: Box::new(cause),
                };
                let trace = format_error_chain(&failure);
                error!("{}", trace);

                // Another process may have moved the record along
                match self.store.load_sync_result(result.id).await {
                    Ok(Some(latest)) => result = latest,
                    Ok(None) => {}
                    Err(e) => warn!("Failed to reload sync result: {}", e),
                }
                result.append_results(format!(
                    "{}: SYNCHRONIZATION ERROR - STACK TRACE FOLLOWS:\n{}",
                    self.clock.now().to_rfc3339(),
                    trace
                ));
                result.status = SyncStatus::Failure;

                self.emit(SyncEvent::Failed {
                    target,
                    message: failure.to_string(),
                });
                Err(failure)
            }
        };

        result.end_time = Some(self.clock.now());
        if let Err(e) = self.store.merge_sync_result(result).await {
            error!(
                "Failed to persist final sync result of content source [{}]: {}",
                source.name, e
            );
            if outcome.is_ok() {
                return Err(e.into());
            }
        }

        outcome
    }

    async fn run_source_sync(&self, source: &ContentSource, result: &mut SyncResult) -> Result<()> {
        let adapter = self.registry.resolve(source.id).await?;
        repo_source::import_candidate_repos(
            source,
            &adapter,
            &self.store,
            self.clock.as_ref(),
            result,
        )
        .await?;
        Ok(())
    }

    /// Synchronize every phase of a repository against all its content
    /// sources.
    ///
    /// Returns `false` when the repo already has a running sync or the run
    /// was cancelled, `true` when it ran to the end, including runs where
    /// some sources failed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown repo and `RepoSyncFailed` for
    /// failures outside the per-source isolation.
    pub async fn synchronize_repo(&self, repo_id: RepoId) -> Result<bool> {
        RepoPipeline {
            registry: &self.registry,
            store: &self.store,
            clock: self.clock.as_ref(),
            retry: &self.retry,
            event_bus: Some(&self.event_bus),
        }
        .run(repo_id)
        .await
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ContentProviderManager`]
pub struct ContentProviderManagerBuilder {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    factories: Vec<Arc<dyn AdapterFactory>>,
}

impl ContentProviderManagerBuilder {
    fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            event_bus: None,
            factories: Vec::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing bus instead of creating one sized by the config
    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn register_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidArgument` if the engine configuration is invalid.
    pub fn build(self) -> Result<ContentProviderManager> {
        self.config
            .validate()
            .map_err(|e| SyncError::InvalidArgument(e.to_string()))?;

        let event_bus = self
            .event_bus
            .unwrap_or_else(|| EventBus::new(self.config.event_buffer_size));
        let mut registry = AdapterRegistry::new().with_event_bus(event_bus.clone());
        for factory in self.factories {
            registry.register_factory(factory);
        }

        Ok(ContentProviderManager {
            registry,
            store: self.store,
            clock: self.clock,
            retry: RetryPolicy::from_config(&self.config),
            event_bus,
            source_sync_lock: Mutex::new(()),
        })
    }
}
