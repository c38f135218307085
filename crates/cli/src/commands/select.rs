//! `factlayer select` — Show the vault selection for a query.

use anyhow::Context;
use factlayer_config::AppConfig;
use factlayer_context::VaultSectionSelector;
use std::path::Path;

pub fn run(config: &AppConfig, vault: &Path, query: &str) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(vault).with_context(|| format!("Failed to read {}", vault.display()))?;
    let selection = VaultSectionSelector::new(config.vault.clone()).select(&text, query);

    println!("📚 Vault selection");
    println!("==================");
    println!("  Sections:  {} of {}", selection.sections_selected, selection.sections_total);
    println!("  Tokens:    {} (limit {})", selection.tokens, config.vault.max_tokens);
    if let Some(strategy) = selection.strategy {
        println!("  Split:     {strategy:?}");
    }
    println!("  Reason:    {}", selection.selection_reason);
    if let Some(score) = selection.top_score {
        println!("  Top score: {score}");
    }
    println!();
    println!("{}", selection.content);
    Ok(())
}
