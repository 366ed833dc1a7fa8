//! Packet-data link backends

use super::{LinkCredentials, LinkProvider};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

/// Runs an external attach command (a `pppd` or `mmcli` wrapper, for example)
///
/// Arguments may contain `{apn}`, `{username}` and `{password}` placeholders.
pub struct CommandLink {
    program: String,
    args: Vec<String>,
}

impl CommandLink {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = match parts.next() {
            Some(program) => program,
            None => bail!("attach command is empty"),
        };
        Ok(Self::new(program, parts.collect()))
    }

    fn expand_args(&self, credentials: &LinkCredentials) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{apn}", &credentials.apn)
                    .replace("{username}", &credentials.username)
                    .replace("{password}", &credentials.password)
            })
            .collect()
    }
}

#[async_trait]
impl LinkProvider for CommandLink {
    async fn attach(&self, credentials: &LinkCredentials) -> Result<()> {
        debug!("Running attach command: {}", self.program);
        let status = Command::new(&self.program)
            .args(self.expand_args(credentials))
            .status()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;

        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Link that is always up (development hosts with wired networking)
pub struct SimulatedLink;

#[async_trait]
impl LinkProvider for SimulatedLink {
    async fn attach(&self, credentials: &LinkCredentials) -> Result<()> {
        info!("[LINK] Simulated attach with APN {:?}", credentials.apn);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
