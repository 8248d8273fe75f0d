//! # Adapter Registry
//!
//! Sole owner of adapter instances. The registry constructs adapters through
//! registered [`AdapterFactory`] implementations keyed by content source type
//! name, initializes them, shuts them down, and hands out
//! [`IsolatedAdapter`] handles to everything else.
//!
//! ## Lifecycle
//!
//! - `start_adapter` - no-op when the source already has a running adapter;
//!   an adapter whose `initialize` fails is discarded
//! - `shutdown_adapter` - best-effort, failures are logged and swallowed
//! - `restart_adapter` - shutdown then start under one lifecycle lock, used
//!   when a source's configuration changes
//!
//! ```rust,ignore
//! let mut registry = AdapterRegistry::new();
//! registry.register_factory(Arc::new(FnAdapterFactory::new("disk", || {
//!     Box::new(DiskContentProvider::new()) as Box<dyn ContentProvider>
//! })));
//! registry.start_adapter(&source).await?;
//! let adapter = registry.resolve(source.id).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::{ContentProvider, ContentSource, ContentSourceId};
use core_runtime::events::{AdapterEvent, CoreEvent, EventBus};
use core_runtime::logging::describe_configuration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::isolation::{in_adapter_context, AdapterContext, IsolatedAdapter};
use crate::{Result, SyncError};

// ============================================================================
// Adapter Factories
// ============================================================================

/// Creates uninitialized adapters for one content source type
pub trait AdapterFactory: Send + Sync {
    /// Content source type name this factory services
    fn type_name(&self) -> &str;

    fn create(&self) -> Box<dyn ContentProvider>;
}

/// [`AdapterFactory`] backed by a closure
pub struct FnAdapterFactory<F> {
    type_name: String,
    create: F,
}

impl<F> FnAdapterFactory<F>
where
    F: Fn() -> Box<dyn ContentProvider> + Send + Sync,
{
    pub fn new(type_name: impl Into<String>, create: F) -> Self {
        Self {
            type_name: type_name.into(),
            create,
        }
    }
}

impl<F> AdapterFactory for FnAdapterFactory<F>
where
    F: Fn() -> Box<dyn ContentProvider> + Send + Sync,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn create(&self) -> Box<dyn ContentProvider> {
        (self.create)()
    }
}

// ============================================================================
// Registry
// ============================================================================

struct RunningAdapter {
    source: ContentSource,
    provider: Arc<dyn ContentProvider>,
    /// Present when the adapter is not thread-safe
    gate: Option<Arc<Mutex<()>>>,
}

pub struct AdapterRegistry {
    factories: HashMap<String, Arc<dyn AdapterFactory>>,
    adapters: RwLock<HashMap<ContentSourceId, RunningAdapter>>,
    /// Serializes start/shutdown/restart so lifecycle transitions never interleave
    lifecycle: Mutex<()>,
    event_bus: Option<EventBus>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            adapters: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(()),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Register a factory, replacing any previous one for the same type name
    pub fn register_factory(&mut self, factory: Arc<dyn AdapterFactory>) {
        let type_name = factory.type_name().to_string();
        if self.factories.insert(type_name.clone(), factory).is_some() {
            warn!("Replacing adapter factory for content source type [{}]", type_name);
        }
    }

    pub fn has_factory(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Start the adapter for `source` unless one is already running.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Initialization` if no factory services the
    /// source's type or the adapter's `initialize` fails. The source is left
    /// without a running adapter in both cases.
    #[instrument(skip(self, source), fields(source_id = %source.id))]
    pub async fn start_adapter(&self, source: &ContentSource) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked(source).await
    }

    /// Stop the adapter for `source`. No-op when none is running.
    #[instrument(skip(self, source), fields(source_id = %source.id))]
    pub async fn shutdown_adapter(&self, source: &ContentSource) {
        let _lifecycle = self.lifecycle.lock().await;
        self.shutdown_locked(source.id).await;
    }

    /// Shut down and start again, picking up `source`'s current configuration
    #[instrument(skip(self, source), fields(source_id = %source.id))]
    pub async fn restart_adapter(&self, source: &ContentSource) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.shutdown_locked(source.id).await;
        self.start_locked(source).await
    }

    /// Start adapters for every source, returning how many are running.
    ///
    /// Initialization failures are logged, not propagated.
    pub async fn start_all(&self, sources: &[ContentSource]) -> usize {
        for source in sources {
            if let Err(e) = self.start_adapter(source).await {
                error!(
                    "Failed to start adapter for content source [{}]: {}",
                    source.name, e
                );
            }
        }
        self.adapters.read().await.len()
    }

    pub async fn shutdown_all(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let ids: Vec<ContentSourceId> = self.adapters.read().await.keys().copied().collect();
        for id in ids {
            self.shutdown_locked(id).await;
        }
    }

    /// Resolve a capability-checked handle for a running adapter.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotFound` if no adapter is running for `source_id`.
    pub async fn resolve(&self, source_id: ContentSourceId) -> Result<IsolatedAdapter> {
        let adapters = self.adapters.read().await;
        let running = adapters.get(&source_id).ok_or(SyncError::NotFound {
            kind: "content source",
            id: source_id.get(),
        })?;

        Ok(IsolatedAdapter::new(
            AdapterContext::for_source(&running.source),
            running.provider.clone(),
            running.gate.clone(),
        ))
    }

    pub async fn is_running(&self, source_id: ContentSourceId) -> bool {
        self.adapters.read().await.contains_key(&source_id)
    }

    /// Sources with a running adapter, ordered by id
    pub async fn sources(&self) -> Vec<ContentSource> {
        let adapters = self.adapters.read().await;
        let mut sources: Vec<ContentSource> =
            adapters.values().map(|running| running.source.clone()).collect();
        sources.sort_by_key(|source| source.id);
        sources
    }

    // ------------------------------------------------------------------
    // Lifecycle internals; callers hold `lifecycle`
    // ------------------------------------------------------------------

    async fn start_locked(&self, source: &ContentSource) -> Result<()> {
        if self.adapters.read().await.contains_key(&source.id) {
            debug!("Adapter for content source [{}] already running", source.name);
            return Ok(());
        }

        let type_name = &source.source_type.name;
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| SyncError::Initialization {
                source_id: source.id,
                message: format!("No adapter registered for content source type [{}]", type_name),
                cause: None,
            })?;

        let context = AdapterContext::for_source(source);
        let mut provider = factory.create();

        if let Err(e) = in_adapter_context(
            &context,
            "initialize",
            provider.initialize(&source.configuration),
        )
        .await
        {
            drop(provider);
            error!(
                "Failed to initialize adapter for content source [{}]: {}",
                source.name, e
            );
            self.emit(AdapterEvent::InitializationFailed {
                source_id: source.id,
                message: e.to_string(),
            });
            return Err(SyncError::Initialization {
                source_id: source.id,
                message: e.to_string(),
                cause: Some(e),
            });
        }

        let provider: Arc<dyn ContentProvider> = Arc::from(provider);
        let capabilities: Vec<&str> = provider
            .capabilities()
            .iter()
            .map(|capability| capability.as_str())
            .collect();
        info!(
            "Started adapter for content source [{}] of type [{}] with capabilities [{}] and configuration [{}]",
            source.name,
            type_name,
            capabilities.join(", "),
            describe_configuration(&source.configuration)
        );

        let gate = (!provider.is_thread_safe()).then(|| Arc::new(Mutex::new(())));
        self.adapters.write().await.insert(
            source.id,
            RunningAdapter {
                source: source.clone(),
                provider,
                gate,
            },
        );

        self.emit(AdapterEvent::Started {
            source_id: source.id,
            adapter_type: type_name.clone(),
        });
        Ok(())
    }

    async fn shutdown_locked(&self, source_id: ContentSourceId) {
        let Some(running) = self.adapters.write().await.remove(&source_id) else {
            debug!("No adapter running for content source [{}]", source_id);
            return;
        };

        let context = AdapterContext::for_source(&running.source);
        let _permit = match &running.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        match in_adapter_context(&context, "shutdown", running.provider.shutdown()).await {
            Ok(()) => info!("Shut down adapter for content source [{}]", running.source.name),
            Err(e) => warn!(
                "Failed to shutdown adapter for content source [{}]: {}",
                running.source.name, e
            ),
        }

        self.emit(AdapterEvent::Stopped { source_id });
    }

    fn emit(&self, event: AdapterEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Adapter(event)).ok();
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
