use std::time::Duration;

use anyhow::Result;
use build_catalog_store::CatalogStore;

pub fn run(store: &CatalogStore, older_than_days: u64) -> Result<()> {
    let age = Duration::from_secs(older_than_days.saturating_mul(86_400));
    let purged = store.purge_inactive_older_than(age)?;
    println!("Purged {purged} inactive entries older than {older_than_days} days.");
    Ok(())
}
