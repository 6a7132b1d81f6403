//! One-shot pipeline commands for a single issue or the whole workspace.

use anyhow::Result;

use autofix::config::Config;
use autofix::events::FixMode;
use autofix::orchestrator::{CommandState, SelfTestOutcome};

pub async fn cmd_fix(config: &Config, issue: u64, implement: bool) -> Result<()> {
    let mode = if implement { FixMode::Implement } else { FixMode::Fix };
    let orchestrator = super::orchestrator(config)?;
    let state = orchestrator.run_fix_pipeline(issue, mode).await;

    println!("Issue #{}: {}", issue, state);
    if state == CommandState::Failed {
        anyhow::bail!("Fix pipeline for issue #{} failed", issue);
    }
    Ok(())
}

pub async fn cmd_triage(config: &Config, issue: u64) -> Result<()> {
    let collaborators = super::collaborators(config)?;
    let found = collaborators.hosting.get_issue(issue).await?;
    let orchestrator =
        autofix::orchestrator::Orchestrator::new(collaborators, &config.settings, &config.dashboard_dir());

    let outcome = orchestrator.triage(&found).await?;
    println!(
        "Issue #{}: {} (complexity: {}, attention: {})",
        issue, outcome.decision.category, outcome.decision.complexity, outcome.decision.requires_attention
    );
    Ok(())
}

pub async fn cmd_self_test(config: &Config, check: &str) -> Result<()> {
    let orchestrator = super::orchestrator(config)?;
    match orchestrator.self_test(check).await? {
        SelfTestOutcome::Passed => println!("Self-test passed."),
        SelfTestOutcome::Failed { category, issue } => match issue {
            Some(issue) => println!("Self-test failed ({}); opened issue #{}", category, issue.number),
            None => println!("Self-test failed ({}); a tracking issue is already open", category),
        },
    }
    Ok(())
}

pub async fn cmd_status(config: &Config, issue: u64) -> Result<()> {
    let orchestrator = super::orchestrator(config)?;
    let state = orchestrator.status(issue).await?;
    println!("Issue #{}: {}", issue, state);
    Ok(())
}
