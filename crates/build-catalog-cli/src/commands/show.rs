use anyhow::{Result, bail};
use build_catalog::ProviderType;
use build_catalog_sync::CatalogService;

use super::format;

pub async fn run(service: &CatalogService, provider: ProviderType, version: &str) -> Result<()> {
    let Some(descriptor) = service.get_version(provider, version).await? else {
        bail!("no {provider} version {version} in the catalog");
    };

    println!("Provider:    {}", descriptor.provider_type);
    println!("Version:     {}", descriptor.version);
    if let Some(build) = descriptor.build_number {
        println!("Build:       {build}");
    }
    println!("Stable:      {}", if descriptor.stable { "yes" } else { "no" });
    println!("Active:      {}", if descriptor.active { "yes" } else { "no" });
    println!("Released:    {}", format::timestamp(descriptor.released_at));
    println!("First seen:  {}", format::timestamp(Some(descriptor.created_at)));
    println!("Updated:     {}", format::timestamp(Some(descriptor.updated_at)));
    println!("Download:    {}", descriptor.download_url);

    Ok(())
}
