//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                              |
//! |------------|-----------------------------------------------|
//! | `event`    | `HandleEvent`                                 |
//! | `pipeline` | `Fix`, `Triage`, `SelfTest`, `Status`         |
//! | `recover`  | `Recover`                                     |

pub mod event;
pub mod pipeline;
pub mod recover;

pub use event::cmd_handle_event;
pub use pipeline::{cmd_fix, cmd_self_test, cmd_status, cmd_triage};
pub use recover::cmd_recover;

use std::sync::Arc;

use anyhow::{Context, Result};

use autofix::completion::ChatCompletionClient;
use autofix::config::Config;
use autofix::hosting::GitHubClient;
use autofix::orchestrator::{Collaborators, Orchestrator};
use autofix::verifier::CommandVerifier;
use autofix::workspace::GitWorkspace;

/// Wire the production collaborators from resolved configuration.
pub(crate) fn collaborators(config: &Config) -> Result<Collaborators> {
    let settings = &config.settings;
    let hosting = GitHubClient::new(&settings.hosting, config.repository.clone(), config.github_token.clone())
        .context("Failed to build hosting client")?;
    let completion = ChatCompletionClient::new(&settings.completion, config.completion_api_key.clone())
        .context("Failed to build completion client")?;
    let workspace = GitWorkspace::open(&config.workspace_root)
        .with_context(|| format!("Failed to open repository at {}", config.workspace_root.display()))?;

    Ok(Collaborators {
        hosting: Arc::new(hosting),
        completion: Arc::new(completion),
        workspace: Arc::new(workspace),
        verifier: Arc::new(CommandVerifier::new(&settings.verifier)),
    })
}

pub(crate) fn orchestrator(config: &Config) -> Result<Orchestrator> {
    Ok(Orchestrator::new(
        collaborators(config)?,
        &config.settings,
        &config.dashboard_dir(),
    ))
}
