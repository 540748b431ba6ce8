//! Remote store abstraction.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;

/// Destination for finalized segments and manifests.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Disabled stores are skipped by the pipeline without counting an attempt.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Upload `file_path` as `published_name`. One attempt, no retry.
    async fn store(
        &self,
        file_path: &Path,
        published_name: &str,
        identity_token: &str,
    ) -> Result<()>;
}

/// Store used when no remote endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

#[async_trait]
impl RemoteStore for DisabledStore {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn store(
        &self,
        file_path: &Path,
        published_name: &str,
        _identity_token: &str,
    ) -> Result<()> {
        debug!(path = %file_path.display(), published_name, "Publishing disabled, skipping");
        Ok(())
    }
}
