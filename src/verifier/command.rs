use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::{Verifier, VerifierOutput};
use crate::config::{CheckCommand, VerifierSettings};
use crate::errors::{Service, TransportError};

/// Runs the configured checks in order without a shell.
///
/// Stops at the first failing check and reports only that check's output, so
/// classification is not confused by the chatter of checks that passed.
pub struct CommandVerifier {
    checks: Vec<CheckCommand>,
    timeout: Duration,
}

impl CommandVerifier {
    pub fn new(settings: &VerifierSettings) -> Self {
        Self {
            checks: settings.checks.clone(),
            timeout: settings.timeout(),
        }
    }

    async fn run_check(&self, check: &CheckCommand, target: &Path) -> Result<VerifierOutput, TransportError> {
        let (program, args) = check.command.split_first().ok_or_else(|| TransportError::Request {
            service: Service::Verifier,
            message: format!("check '{}' has an empty command", check.name),
        })?;

        let child = Command::new(program)
            .args(args)
            .current_dir(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Request {
                service: Service::Verifier,
                message: format!("failed to spawn '{}': {}", check.command.join(" "), e),
            })?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| TransportError::Request {
                service: Service::Verifier,
                message: format!("failed to wait for '{}': {}", check.name, e),
            })?,
            Err(_) => {
                return Err(TransportError::Timeout {
                    service: Service::Verifier,
                });
            }
        };

        Ok(VerifierOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn run(&self, target: &Path) -> Result<VerifierOutput, TransportError> {
        for check in &self.checks {
            tracing::info!(check = %check.name, command = %check.command.join(" "), "Running check");
            let output = self.run_check(check, target).await?;
            if output.exit_code != 0 {
                tracing::warn!(check = %check.name, exit_code = output.exit_code, "Check failed");
                return Ok(output);
            }
        }
        Ok(VerifierOutput::success())
    }
}
