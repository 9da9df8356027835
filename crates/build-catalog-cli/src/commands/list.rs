use anyhow::Result;
use build_catalog::ProviderType;
use build_catalog_store::CatalogStore;
use build_catalog_sync::CatalogService;

use super::format;

pub async fn run(
    service: &CatalogService,
    store: &CatalogStore,
    provider: Option<ProviderType>,
    include_inactive: bool,
) -> Result<()> {
    let descriptors = if include_inactive {
        store.list_all(provider)?
    } else {
        service.get_active_versions(provider).await?
    };

    if descriptors.is_empty() {
        eprintln!("Catalog is empty. Run `build-catalog sync` to populate it.");
        return Ok(());
    }

    format::print_descriptor_table(&descriptors, include_inactive);
    Ok(())
}
