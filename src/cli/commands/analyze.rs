//! Contract analysis commands.

use std::path::Path;
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::{Config, Settings};
use crate::extract::TextExtractor;
use crate::llm::LlmClient;
use crate::services::{AnalysisError, AnalysisEvent, AnalysisService};

use super::super::helpers::{print_report, truncate};

/// Analyze one contract and store its report.
pub async fn cmd_analyze(
    settings: &Settings,
    config: &Config,
    file: &Path,
    json: bool,
    concurrency: Option<usize>,
) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    settings.ensure_directories()?;

    let mut service = AnalysisService::from_config(settings, config)?;
    if let Some(concurrency) = concurrency {
        service = service.with_concurrency(concurrency);
    }

    if !json {
        println!(
            "{} Analyzing {} with {} ({})",
            style("→").cyan(),
            style(file.display()).bold(),
            config.llm.model,
            config.llm.provider
        );
    }

    let (event_tx, mut event_rx) = mpsc::channel::<AnalysisEvent>(100);

    let pb = Arc::new(tokio::sync::Mutex::new(None::<ProgressBar>));
    let pb_clone = pb.clone();
    let quiet = json;

    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if quiet {
                continue;
            }
            match event {
                AnalysisEvent::Started {
                    total_chunks,
                    clause_keys,
                    ..
                } => {
                    let progress = ProgressBar::new(total_chunks as u64);
                    progress.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("█▓░"),
                    );
                    progress.set_message(format!("Categorizing against {} clause keys", clause_keys));
                    *pb_clone.lock().await = Some(progress);
                }
                AnalysisEvent::ChunkCompleted {
                    index,
                    added,
                    unknown_keys,
                } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        if !unknown_keys.is_empty() {
                            progress.println(format!(
                                "{} Chunk {}: ignored unknown keys {}",
                                style("!").yellow(),
                                index,
                                truncate(&unknown_keys.join(", "), 60)
                            ));
                        }
                        progress.set_message(format!("Chunk {}: {} extracts", index, added));
                        progress.inc(1);
                    }
                }
                AnalysisEvent::ChunkFailed { index, error } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.println(format!(
                            "{} Chunk {}: {}",
                            style("✗").red(),
                            index,
                            truncate(&error, 80)
                        ));
                        progress.inc(1);
                    }
                }
                AnalysisEvent::Finalized {
                    version,
                    total_extracts,
                    ..
                } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.finish_and_clear();
                    }
                    *pb_clone.lock().await = None;
                    println!(
                        "{} Stored {} extracts as version {}",
                        style("✓").green(),
                        total_extracts,
                        version
                    );
                }
            }
        }
    });

    let result = service.analyze(file, event_tx).await;
    let _ = event_handler.await;
    if let Some(progress) = pb.lock().await.take() {
        progress.abandon();
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(AnalysisError::StorageWrite {
            source, report, ..
        }) => {
            // Keep the results visible even though they were not stored
            eprintln!("{} Could not store results: {}", style("✗").red(), source);
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Err(source.into());
        }
        Err(e) => {
            eprintln!("{} Analysis failed: {}", style("✗").red(), e);
            return Err(e.into());
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "run": outcome.run,
                "version": outcome.version,
                "report": outcome.report,
                "quadrants": outcome.quadrants,
                "merge": outcome.merged,
            }))?
        );
        return Ok(());
    }

    print_report(&outcome.report, 100);
    if let Some(ref quadrants) = outcome.quadrants {
        println!("\n{}", style("Cost / protection quadrants").bold());
        print_report(quadrants, 100);
    }

    println!();
    println!(
        "  {} chunks succeeded, {} failed",
        outcome.succeeded, outcome.failed
    );
    if outcome.merged.duplicates > 0 || outcome.merged.rejected > 0 {
        println!(
            "  {} duplicates skipped, {} extracts under unknown keys dropped",
            outcome.merged.duplicates, outcome.merged.rejected
        );
    }
    println!(
        "  Results: {}",
        style(outcome.artifact_dir.display()).dim()
    );

    Ok(())
}

/// Check external tool and LLM availability.
pub async fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("Tool Status").bold());
    println!("{}", "-".repeat(50));

    let mut all_found = true;
    for (tool, available) in TextExtractor::check_tools() {
        let status = if available {
            style("✓ found").green()
        } else {
            all_found = false;
            style("✗ not found").red()
        };
        println!("  {:<15} {}", tool, status);
    }

    let client = LlmClient::new(config.llm.clone());
    let llm_status = if !config.llm.enabled {
        style("○ disabled".to_string()).yellow()
    } else if client.is_available().await {
        style(format!("✓ {} reachable", config.llm.endpoint)).green()
    } else {
        all_found = false;
        style(format!("✗ {} unreachable", config.llm.endpoint)).red()
    };
    println!("  {:<15} {}", "LLM", llm_status);
    println!("  {:<15} {} ({})", "", config.llm.model, config.llm.provider);

    println!();
    if all_found {
        println!("{} Ready to analyze contracts", style("✓").green());
    } else {
        println!("{} Some requirements are missing:", style("!").yellow());
        println!("  - pdftotext, pdfinfo: poppler-utils package");
        println!("  - LLM: set LLM_ENDPOINT / GROQ_API_KEY or start Ollama");
    }

    Ok(())
}
