//! Webhook event handling.

use anyhow::{Context, Result};
use std::path::Path;

use autofix::config::Config;
use autofix::events::{CommandParser, EventAction, InboundEvent, classify_event};

pub async fn cmd_handle_event(config: &Config, event_path: Option<&Path>) -> Result<()> {
    let path = event_path
        .or(config.event_path.as_deref())
        .context("No event payload: pass --event-path or set GITHUB_EVENT_PATH")?;

    let event = InboundEvent::load(path)?;
    let parser = CommandParser::new(&config.settings.commands.prefix)?;
    let action = classify_event(&event, &parser);

    if let EventAction::Ignored(reason) = &action {
        tracing::info!(%reason, path = %path.display(), "Nothing to do for this event");
        return Ok(());
    }

    let orchestrator = super::orchestrator(config)?;
    orchestrator.dispatch(action).await?;
    Ok(())
}
