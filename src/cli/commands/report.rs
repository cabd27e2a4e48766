//! Stored report command.

use console::style;

use crate::config::Settings;
use crate::services::{ResultsError, ResultsService, VersionedReport};
use crate::storage::StoreError;

use super::super::helpers::print_report;
use super::ReportFormat;

/// Print a stored report or aggregate.
pub async fn cmd_report(
    settings: &Settings,
    version: Option<u64>,
    aggregate: bool,
    format: ReportFormat,
) -> anyhow::Result<()> {
    let results = ResultsService::new(settings)?;

    let loaded = tokio::task::spawn_blocking(move || -> Result<Loaded, ResultsError> {
        let version = match version {
            Some(v) => v,
            None => results.latest_version()?,
        };
        if aggregate {
            Ok(Loaded::Aggregate(
                version,
                results.store().read_aggregate(version)?,
            ))
        } else {
            Ok(Loaded::Report(results.report(version)?))
        }
    })
    .await?;

    let loaded = match loaded {
        Ok(loaded) => loaded,
        Err(ResultsError::Store(StoreError::ArtifactNotFound(what))) => {
            println!("{} No stored results found ({})", style("!").yellow(), what);
            println!("  Run `clauseguard analyze <contract.pdf>` first");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match loaded {
        Loaded::Aggregate(version, aggregate) => match format {
            ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&aggregate)?),
            ReportFormat::Text | ReportFormat::Markdown => {
                println!(
                    "\n{} (version {})",
                    style("Clause aggregate").bold(),
                    version
                );
                for (key, extracts) in aggregate.iter() {
                    println!("\n{} ({})", style(key).cyan(), extracts.len());
                    for extract in extracts {
                        println!("  - {}", super::super::helpers::one_line(extract));
                    }
                }
            }
        },
        Loaded::Report(latest) => match format {
            ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&latest)?),
            ReportFormat::Markdown => print!("{}", latest.report.to_markdown(&title(&latest))),
            ReportFormat::Text => {
                println!("\n{}", style(title(&latest)).bold());
                print_report(&latest.report, 100);
                println!();
            }
        },
    }

    Ok(())
}

enum Loaded {
    Aggregate(u64, crate::models::AggregateResult),
    Report(VersionedReport),
}

fn title(report: &VersionedReport) -> String {
    match &report.run {
        Some(run) => format!(
            "Contract Risk Report: {} (version {})",
            run.source_file, report.version
        ),
        None => format!("Contract Risk Report (version {})", report.version),
    }
}
