//! Retrying access to package and distribution bits.

use bridge_traits::ContentStream;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::isolation::IsolatedAdapter;
use crate::retry::RetryPolicy;
use crate::{Result, SyncError};

/// Kind of content being streamed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitsKind {
    Package,
    DistributionFile,
}

impl BitsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BitsKind::Package => "package",
            BitsKind::DistributionFile => "distribution file",
        }
    }
}

async fn open_once(
    adapter: &IsolatedAdapter,
    kind: BitsKind,
    location: &str,
) -> Result<ContentStream> {
    let stream = match kind {
        BitsKind::Package => adapter.open_package_bits(location).await?,
        BitsKind::DistributionFile => adapter.open_distribution_bits(location).await?,
    };

    stream.ok_or_else(|| SyncError::ProtocolViolation {
        source_id: adapter.source_id(),
        content: kind.as_str(),
        location: location.to_string(),
    })
}

/// Open a stream to the bits at `location`, retrying transport failures.
///
/// # Errors
///
/// Returns the last transport error once `policy` is exhausted, or
/// `ProtocolViolation` if the adapter hands back neither a stream nor an
/// error.
pub async fn open_with_retry(
    adapter: &IsolatedAdapter,
    kind: BitsKind,
    location: &str,
    policy: &RetryPolicy,
) -> Result<ContentStream> {
    let what = format!("open {} bits at location [{}]", kind.as_str(), location);
    policy
        .run(&what, |_| open_once(adapter, kind, location))
        .await
}

/// Open and drain the bits at `location`. A transport failure while reading
/// retries the whole download.
pub(crate) async fn fetch_with_retry(
    adapter: &IsolatedAdapter,
    kind: BitsKind,
    location: &str,
    policy: &RetryPolicy,
) -> Result<Bytes> {
    let what = format!("download {} bits at location [{}]", kind.as_str(), location);
    policy
        .run(&what, |_| async move {
            let mut stream = open_once(adapter, kind, location).await?;
            let mut buffer = Vec::new();
            stream
                .read_to_end(&mut buffer)
                .await
                .map_err(|cause| SyncError::Transport {
                    source_id: adapter.source_id(),
                    cause,
                })?;
            Ok(Bytes::from(buffer))
        })
        .await
}
