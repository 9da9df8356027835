use std::sync::Arc;

use crate::descriptor::{Candidate, ProviderType, VersionDescriptor};

/// Errors that can occur when talking to an upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not found upstream: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// A client for one upstream source of server builds.
///
/// Each upstream has its own discovery shape, but every adapter emits
/// `VersionDescriptor`s with a fully resolved download URL. Failures are
/// returned as values so a caller can isolate a single bad version.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// Enumerate candidate versions. Versions below the adapter's configured
    /// minimum are already filtered out.
    async fn list_candidates(&self) -> Result<Vec<Candidate>, ProviderError>;

    /// Resolve one candidate into a descriptor with a download URL.
    async fn resolve_detail(&self, candidate: &Candidate)
    -> Result<VersionDescriptor, ProviderError>;
}

#[async_trait::async_trait]
impl<T: ProviderAdapter + ?Sized> ProviderAdapter for Arc<T> {
    fn provider_type(&self) -> ProviderType {
        (**self).provider_type()
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, ProviderError> {
        (**self).list_candidates().await
    }

    async fn resolve_detail(
        &self,
        candidate: &Candidate,
    ) -> Result<VersionDescriptor, ProviderError> {
        (**self).resolve_detail(candidate).await
    }
}
