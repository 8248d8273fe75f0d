use bridge_traits::{AdapterError, BridgeError, Capability, ContentSourceId, RepoId};
use std::error::Error as StdError;
use thiserror::Error;

use crate::phase::SyncPhase;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The adapter could not be started; the source is left without an adapter.
    #[error("Failed to initialize adapter for content source [{source_id}]: {message}")]
    Initialization {
        source_id: ContentSourceId,
        message: String,
        #[source]
        cause: Option<AdapterError>,
    },

    #[error("Unknown {kind} [{id}]")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Adapter for content source [{source_id}] does not support {capability}")]
    UnsupportedCapability {
        source_id: ContentSourceId,
        capability: Capability,
    },

    /// The adapter returned neither a stream nor an error.
    #[error(
        "Adapter for content source [{source_id}] failed to give us a stream to the {content} at location [{location}]"
    )]
    ProtocolViolation {
        source_id: ContentSourceId,
        content: &'static str,
        location: String,
    },

    #[error("Transport failure talking to content source [{source_id}]")]
    Transport {
        source_id: ContentSourceId,
        #[source]
        cause: std::io::Error,
    },

    #[error("Adapter for content source [{source_id}] failed to {operation}")]
    Adapter {
        source_id: ContentSourceId,
        operation: &'static str,
        #[source]
        cause: AdapterError,
    },

    /// One (phase, source) pair failed during a repo sync.
    #[error("Error while synchronizing {phase} of repo [{repo_name}] with content source [{source_name}]")]
    Synchronization {
        repo_name: String,
        source_name: String,
        phase: SyncPhase,
        #[source]
        cause: Box<SyncError>,
    },

    #[error("Synchronization of repo [{repo_id}] was cancelled")]
    Interrupted { repo_id: RepoId },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Record store failure")]
    Store(#[from] BridgeError),

    #[error("Failed to sync content source [{source_id}]")]
    SourceSyncFailed {
        source_id: ContentSourceId,
        #[source]
        cause: Box<SyncError>,
    },

    #[error("Failed to sync repo [{repo_id}]")]
    RepoSyncFailed {
        repo_id: RepoId,
        #[source]
        cause: Box<SyncError>,
    },
}

impl SyncError {
    /// Map an adapter failure, keeping I/O failures distinguishable for retry.
    pub fn from_adapter(
        source_id: ContentSourceId,
        operation: &'static str,
        error: AdapterError,
    ) -> Self {
        match error {
            AdapterError::Transport(cause) => SyncError::Transport { source_id, cause },
            cause => SyncError::Adapter {
                source_id,
                operation,
                cause,
            },
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, SyncError::Interrupted { .. })
    }

    /// Whether a repo run may record this failure against one content source
    /// and carry on. Record store and engine failures abort the run.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            SyncError::Initialization { .. }
                | SyncError::NotFound { .. }
                | SyncError::UnsupportedCapability { .. }
                | SyncError::ProtocolViolation { .. }
                | SyncError::Transport { .. }
                | SyncError::Adapter { .. }
        )
    }
}

/// Render an error and its `source()` chain, one cause per line.
///
/// This is the trace written into a sync result's log.
pub fn format_error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_from_adapter_keeps_transport_distinct() {
        let transport = SyncError::from_adapter(
            ContentSourceId(1),
            "open package bits",
            AdapterError::Transport(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        );
        assert!(transport.is_transport());

        let remote = SyncError::from_adapter(
            ContentSourceId(1),
            "open package bits",
            AdapterError::Remote("404".to_string()),
        );
        assert!(!remote.is_transport());
        assert!(matches!(remote, SyncError::Adapter { .. }));
    }

    #[test]
    fn test_only_adapter_side_failures_belong_to_a_source() {
        let remote = SyncError::from_adapter(
            ContentSourceId(2),
            "synchronize packages",
            AdapterError::Remote("gone".to_string()),
        );
        assert!(remote.is_source_failure());
        assert!(SyncError::NotFound { kind: "content source", id: 2 }.is_source_failure());

        let store = SyncError::from(BridgeError::DatabaseError("database is locked".to_string()));
        assert!(!store.is_source_failure());
        assert!(!SyncError::IllegalState("stopped".to_string()).is_source_failure());
        assert!(!SyncError::Interrupted { repo_id: RepoId(1) }.is_source_failure());
    }

    #[test]
    fn test_format_error_chain_lists_causes() {
        let error = SyncError::SourceSyncFailed {
            source_id: ContentSourceId(4),
            cause: Box::new(SyncError::from_adapter(
                ContentSourceId(4),
                "import repositories",
                AdapterError::Remote("listing refused".to_string()),
            )),
        };

        let trace = format_error_chain(&error);
        let lines: Vec<&str> = trace.lines().collect();
        assert_eq!(lines[0], "Failed to sync content source [4]");
        assert_eq!(
            lines[1],
            "caused by: Adapter for content source [4] failed to import repositories"
        );
        assert_eq!(
            lines[2],
            "caused by: Remote repository error: listing refused"
        );
    }
}
