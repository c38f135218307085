//! `factlayer budget` — Enforce token ceilings over context files.

use factlayer_config::AppConfig;
use factlayer_context::TokenBudgetEnforcer;
use std::path::Path;

pub fn run(
    config: &AppConfig,
    memory: Option<&Path>,
    documents: Option<&Path>,
    vault: Option<&Path>,
) -> anyhow::Result<()> {
    let memory = super::read_optional(memory)?;
    let documents = super::read_optional(documents)?;
    let vault = super::read_optional(vault)?;

    let bundle = TokenBudgetEnforcer::new(config.budget.clone()).enforce(&memory, &documents, &vault);
    println!("{}", serde_json::to_string_pretty(&bundle.budget_compliance)?);
    Ok(())
}
