use anyhow::Result;
use build_catalog::ProviderType;
use build_catalog_sync::CatalogService;

use super::format;

pub fn run(service: &CatalogService, limit: usize, provider: Option<ProviderType>) -> Result<()> {
    let runs = service.sync_history(limit, provider)?;

    if runs.is_empty() {
        eprintln!("No synchronization runs recorded.");
        return Ok(());
    }

    format::print_run_table(&runs);
    Ok(())
}
