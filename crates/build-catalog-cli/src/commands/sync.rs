use anyhow::{Result, bail};
use build_catalog::{ProviderType, RunResult};
use build_catalog_sync::CatalogService;

/// Print per-item and per-provider errors to stderr.
pub fn print_errors(result: &RunResult) {
    for error in &result.errors {
        eprintln!("  {error}");
    }
}

/// Run one manual sync and report the outcome.
pub async fn run(
    service: &CatalogService,
    providers: Vec<ProviderType>,
    force: bool,
    actor: Option<String>,
) -> Result<()> {
    let scope = if providers.is_empty() {
        None
    } else {
        Some(providers)
    };

    let result = service.trigger_sync(scope, force, actor).await;

    if result.is_conflict() {
        bail!("{}; pass --force to run anyway", result.message);
    }

    println!("{}", result.message);
    if let Some(run_id) = result.run_id {
        println!("Run #{run_id} took {:.1}s", result.duration.as_secs_f64());
    }
    print_errors(&result);

    if !result.success {
        bail!("sync failed");
    }
    Ok(())
}
