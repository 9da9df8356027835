use std::time::Duration;

use build_catalog::{SyncRunRecord, VersionDescriptor};
use chrono::{DateTime, Utc};

pub fn timestamp(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        None => "-".to_owned(),
    }
}

fn seconds(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format!("{:.1}s", d.as_secs_f64()),
        None => "-".to_owned(),
    }
}

/// Descriptors grouped by provider type, in the order they arrive.
pub fn print_descriptor_table(descriptors: &[VersionDescriptor], show_active: bool) {
    let version_width = descriptors
        .iter()
        .map(|d| d.version.chars().count())
        .max()
        .unwrap_or(0)
        .max("VERSION".len());

    let mut current = None;
    for descriptor in descriptors {
        if current != Some(descriptor.provider_type) {
            if current.is_some() {
                println!();
            }
            current = Some(descriptor.provider_type);
            println!("{}", descriptor.provider_type);
        }

        let build = descriptor
            .build_number
            .map(|b| format!("#{b}"))
            .unwrap_or_default();
        let channel = if descriptor.stable { "stable" } else { "unstable" };
        let inactive = if show_active && !descriptor.active {
            "  (inactive)"
        } else {
            ""
        };

        println!(
            "  {:<version_width$}  {:>6}  {:<8}  {}{}",
            descriptor.version,
            build,
            channel,
            timestamp(descriptor.released_at),
            inactive,
            version_width = version_width
        );
    }

    println!("\n{} versions", descriptors.len());
}

pub fn print_run_table(runs: &[SyncRunRecord]) {
    println!(
        "{:>6}  {:<16}  {:<9}  {:<8}  {:<8}  {:>7}  {:>5}  {:>8}",
        "ID", "STARTED", "TRIGGER", "SCOPE", "STATUS", "+/~/-", "CALLS", "DURATION"
    );

    for run in runs {
        let scope = run
            .provider_type
            .map(|p| p.to_string())
            .unwrap_or_else(|| "all".to_owned());
        let counts = format!(
            "{}/{}/{}",
            run.counts.added, run.counts.updated, run.counts.removed
        );

        println!(
            "{:>6}  {:<16}  {:<9}  {:<8}  {:<8}  {:>7}  {:>5}  {:>8}",
            run.id,
            timestamp(Some(run.started_at)),
            run.trigger.as_str(),
            scope,
            run.status.as_str(),
            counts,
            run.external_calls,
            seconds(run.duration)
        );

        if let Some(error) = &run.error_text {
            for line in error.lines() {
                println!("        ! {line}");
            }
        }
    }
}
