//! Pipeline self-repair.

use anyhow::Result;

use autofix::config::Config;
use autofix::recovery::RecoverySupervisor;

pub async fn cmd_recover(config: &Config) -> Result<()> {
    let collaborators = super::collaborators(config)?;
    let settings = &config.settings;
    let supervisor = RecoverySupervisor::new(
        collaborators.hosting,
        collaborators.completion,
        collaborators.workspace,
        &settings.recovery,
        &settings.completion,
        &settings.dashboard.data_dir,
        &settings.hosting.base_branch,
    );

    let report = supervisor.recover().await;
    println!();
    if report.restored.is_empty() {
        println!("No files needed restoring.");
    } else {
        println!("Restored:");
        for path in &report.restored {
            println!("  {}", path);
        }
    }
    if let Some(issue) = &report.report_issue {
        println!("Report: issue #{}", issue.number);
    }
    println!();

    if !report.is_healthy() {
        for problem in &report.remaining {
            eprintln!("  {}", problem);
        }
        anyhow::bail!("{} problem(s) remain after recovery", report.remaining.len());
    }
    Ok(())
}
