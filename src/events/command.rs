use regex::Regex;

use crate::errors::ConfigError;

/// A command addressed to the bot in an issue comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fix,
    Implement,
    Analyze { target: Option<String> },
    Status,
    Help,
}

impl Command {
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Fix => "fix",
            Command::Implement => "implement",
            Command::Analyze { .. } => "analyze",
            Command::Status => "status",
            Command::Help => "help",
        }
    }
}

/// Extracts a [`Command`] from comment text: `<prefix> <keyword> [argument]`.
///
/// Matching is case-insensitive and finds the first marker anywhere in the
/// comment, as long as it starts a word. The argument runs to the end of that line. An unknown keyword
/// yields no command.
#[derive(Debug, Clone)]
pub struct CommandParser {
    pattern: Regex,
}

impl CommandParser {
    pub fn new(prefix: &str) -> Result<Self, ConfigError> {
        let source = format!(r"(?i)(?:^|\s){}\s+(\w+)(?:[ \t]+([^\r\n]+))?", regex::escape(prefix));
        let pattern = Regex::new(&source).map_err(|e| ConfigError::Parse {
            path: crate::config::SETTINGS_FILE.into(),
            message: format!("invalid command prefix '{}': {}", prefix, e),
        })?;
        Ok(Self { pattern })
    }

    pub fn parse(&self, body: &str) -> Option<Command> {
        let caps = self.pattern.captures(body)?;
        let keyword = caps.get(1)?.as_str().to_lowercase();
        let argument = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());

        let command = match keyword.as_str() {
            "fix" => Command::Fix,
            "implement" => Command::Implement,
            "analyze" => Command::Analyze { target: argument },
            "status" => Command::Status,
            "help" => Command::Help,
            other => {
                tracing::debug!(keyword = other, "Ignoring unknown command keyword");
                return None;
            }
        };
        Some(command)
    }
}
