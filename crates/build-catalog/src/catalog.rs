use std::sync::Arc;

use crate::descriptor::{ProviderType, VersionDescriptor};

/// Errors surfaced by the catalog read path.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read access to the local catalog.
///
/// Collaborators that serve version lists depend on this rather than on a
/// concrete store, and never see an in-progress run's partial state.
#[async_trait::async_trait]
pub trait CatalogReader: Send + Sync {
    /// Active descriptors, newest version first, optionally for one type.
    async fn active_versions(
        &self,
        provider_type: Option<ProviderType>,
    ) -> Result<Vec<VersionDescriptor>, CatalogError>;

    /// Point lookup by identity, regardless of the active flag.
    async fn version(
        &self,
        provider_type: ProviderType,
        version: &str,
    ) -> Result<Option<VersionDescriptor>, CatalogError>;
}

#[async_trait::async_trait]
impl<T: CatalogReader + ?Sized> CatalogReader for Arc<T> {
    async fn active_versions(
        &self,
        provider_type: Option<ProviderType>,
    ) -> Result<Vec<VersionDescriptor>, CatalogError> {
        (**self).active_versions(provider_type).await
    }

    async fn version(
        &self,
        provider_type: ProviderType,
        version: &str,
    ) -> Result<Option<VersionDescriptor>, CatalogError> {
        (**self).version(provider_type, version).await
    }
}
