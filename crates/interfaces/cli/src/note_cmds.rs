use std::io;
use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Result, bail};

use scribe_config::AppConfig;
use scribe_llm::LlmRouter;
use scribe_runtime::{Pipeline, Reviewer, RunReport, ScriptedReviewer};
use scribe_vault::{FileKnowledgeStore, ObsidianVault, Vault};

use crate::interactive::{self, TerminalReviewer};

fn open_vault(config: &AppConfig) -> Arc<ObsidianVault> {
    Arc::new(ObsidianVault::new(&config.vault))
}

fn build_pipeline(config: &AppConfig, vault: Arc<ObsidianVault>) -> Result<Pipeline> {
    let backend = Arc::new(LlmRouter::from_config(&config.llm)?);
    let store = Arc::new(FileKnowledgeStore::new(&config.knowledge.path)?);
    tracing::debug!(
        provider = %config.llm.provider,
        model = %config.active_model(),
        knowledge = %store.root().display(),
        "pipeline ready"
    );
    Ok(Pipeline::new(config, backend, vault, store))
}

/// Accept a vault id (`Daily/2024-01-01.md`) or a bare daily-note name
/// (`2024-01-01` / `2024-01-01.md`).
pub(crate) fn resolve_note_id(vault: &dyn Vault, daily_dir: &str, raw: &str) -> String {
    let raw = raw.trim();
    if vault.exists(raw) {
        return raw.to_string();
    }
    let file = if raw.ends_with(".md") {
        raw.to_string()
    } else {
        format!("{raw}.md")
    };
    format!("{}/{file}", daily_dir.trim_end_matches('/'))
}

pub(crate) fn run_list(config: &AppConfig) -> Result<()> {
    let notes = open_vault(config).list_daily_notes()?;
    if notes.is_empty() {
        println!("no daily notes in {}", config.vault.daily_path().display());
        return Ok(());
    }
    for (index, note) in notes.iter().enumerate() {
        println!("{:>3}. {note}", index + 1);
    }
    Ok(())
}

pub(crate) fn run_tags(config: &AppConfig) -> Result<()> {
    let tags = open_vault(config).list_tags()?;
    if tags.is_empty() {
        println!("(no tags)");
    }
    for tag in tags {
        println!("#{tag}");
    }
    Ok(())
}

pub(crate) async fn run_extract(config: &AppConfig, note: &str) -> Result<()> {
    let vault = open_vault(config);
    let id = resolve_note_id(vault.as_ref(), &config.vault.daily_dir, note);
    let pipeline = build_pipeline(config, vault)?;

    let entries = pipeline.extract_daily_note(&id).await?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

pub(crate) async fn run_process(
    config: &AppConfig,
    notes: Vec<String>,
    select: bool,
    auto_approve: bool,
) -> Result<()> {
    let vault = open_vault(config);
    let available = vault.list_daily_notes()?;

    let ids = if select {
        if !io::stdin().is_terminal() {
            bail!("--select needs an interactive terminal");
        }
        interactive::prompt_selection(&available, &mut io::stdin().lock(), &mut io::stdout())?
    } else if notes.is_empty() {
        available.into_iter().take(1).collect()
    } else {
        notes
            .iter()
            .map(|note| resolve_note_id(vault.as_ref(), &config.vault.daily_dir, note))
            .collect()
    };
    if ids.is_empty() {
        println!("nothing to process");
        return Ok(());
    }

    if !auto_approve && !io::stdin().is_terminal() {
        bail!("reviewing needs an interactive terminal (or pass --auto-approve)");
    }

    let pipeline = build_pipeline(config, vault)?;
    let mut reviewer: Box<dyn Reviewer> = if auto_approve {
        Box::new(ScriptedReviewer::approve_all())
    } else {
        Box::new(TerminalReviewer::stdio())
    };

    let report = pipeline.run(&ids, reviewer.as_mut()).await;
    print_run_report(&report);
    Ok(())
}

fn print_run_report(report: &RunReport) {
    println!("── run summary ──────────────────────────────────────");
    for cycle in &report.cycles {
        println!(
            "  {}: {} extracted, {} dropped, {} approved, {} rejected, {} parked",
            cycle.source,
            cycle.extracted,
            cycle.dropped,
            cycle.approved,
            cycle.rejected,
            cycle.parked
        );
        for processed in &cycle.processed {
            println!("    {} [{}]", processed.note.location(), processed.note.status());
        }
        for failure in &cycle.failures {
            println!("    halted: {failure}");
        }
    }
    for failed in &report.failed {
        println!("  {}: failed: {}", failed.source, failed.error);
    }
    println!(
        "  total: {} approved, {} rejected, {} parked",
        report.approved(),
        report.rejected(),
        report.parked()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn vault_with_daily(dir: &TempDir) -> (AppConfig, ObsidianVault) {
        let mut config = AppConfig::default();
        config.vault.path = dir.path().to_string_lossy().into_owned();
        fs::create_dir_all(dir.path().join("Daily")).unwrap();
        fs::write(dir.path().join("Daily/2024-01-01.md"), "- x").unwrap();
        let vault = ObsidianVault::new(&config.vault);
        (config, vault)
    }

    #[test]
    fn resolve_accepts_ids_and_bare_dates() {
        let dir = TempDir::new().unwrap();
        let (config, vault) = vault_with_daily(&dir);
        let daily = &config.vault.daily_dir;

        assert_eq!(resolve_note_id(&vault, daily, "Daily/2024-01-01.md"), "Daily/2024-01-01.md");
        assert_eq!(resolve_note_id(&vault, daily, "2024-01-01"), "Daily/2024-01-01.md");
        assert_eq!(resolve_note_id(&vault, daily, "2024-01-01.md"), "Daily/2024-01-01.md");
        // Unknown names still resolve; the pipeline reports them missing.
        assert_eq!(resolve_note_id(&vault, daily, "1999-12-31"), "Daily/1999-12-31.md");
    }
}
