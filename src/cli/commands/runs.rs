//! Run ledger command.

use console::style;

use crate::config::Settings;
use crate::models::RunStatus;
use crate::repository::RunRepository;

use super::super::helpers::truncate;

/// List recent analysis runs.
pub async fn cmd_runs(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let repo = RunRepository::new(&settings.database_path())?;
    let runs = tokio::task::spawn_blocking(move || repo.recent(limit)).await??;

    if runs.is_empty() {
        println!("{} No runs recorded yet", style("!").yellow());
        return Ok(());
    }

    println!(
        "\n{:<10} {:<10} {:>7} {:>9} {:<20} {}",
        style("RUN").bold(),
        style("STATUS").bold(),
        style("VERSION").bold(),
        style("CHUNKS").bold(),
        style("STARTED").bold(),
        style("FILE").bold()
    );
    for run in runs {
        let status = match run.status {
            RunStatus::Finalized => style(run.status.as_str()).green(),
            RunStatus::Failed => style(run.status.as_str()).red(),
            RunStatus::Collecting => style(run.status.as_str()).yellow(),
        };
        let version = run
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let chunks = format!("{}/{}", run.chunks_succeeded, run.chunk_count);
        let short_id: String = run.id.chars().take(8).collect();
        println!(
            "{:<10} {:<10} {:>7} {:>9} {:<20} {}",
            short_id,
            status,
            version,
            chunks,
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&run.source_file, 40)
        );
        if let Some(error) = run.error {
            println!("           {}", style(truncate(&error, 80)).dim());
        }
    }

    Ok(())
}
