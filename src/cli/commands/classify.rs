//! Classification command.

use console::style;

use crate::classify::source_from_config;
use crate::config::{Config, Settings};
use crate::models::{Bucket, RiskTier};

/// Show the clause keys partitioned into risk tiers.
pub async fn cmd_classify(settings: &Settings, config: &Config, json: bool) -> anyhow::Result<()> {
    let source = source_from_config(&config.classifier, &settings.data_dir);
    let classification = source.load().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&classification.to_summary())?
        );
        return Ok(());
    }

    println!(
        "\n{} {} clause keys from {}",
        style("→").cyan(),
        classification.len(),
        source.name()
    );
    for tier in RiskTier::ALL {
        let keys = classification.keys_in(*tier);
        println!("\n{} ({})", style(tier.title()).bold(), keys.len());
        for key in keys {
            let quadrant = classification
                .quadrant_of(key)
                .map(|q| format!(" [{}]", q.as_str()))
                .unwrap_or_default();
            println!("  - {}{}", key, style(quadrant).dim());
        }
    }

    let untiered: Vec<_> = classification
        .keys()
        .iter()
        .filter(|k| classification.tier_of(k).is_none())
        .collect();
    if !untiered.is_empty() {
        println!(
            "\n{} {} keys have no tier and are left out of reports",
            style("!").yellow(),
            untiered.len()
        );
    }

    Ok(())
}
