//! Subprocess syntax tree producer
//!
//! Runs `<command...> <file.rs> <file.json>` and decodes the JSON written next
//! to the source file.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::errors::{IrError, Result};
use crate::features::parsing::domain::SyntaxTree;
use crate::features::parsing::infrastructure::json_tree::decode_syntax_tree;
use crate::features::parsing::ports::SyntaxTreeProducer;

/// Default bound on one producer invocation
pub const DEFAULT_PRODUCER_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Producer backed by an external `rust2json`-style binary
#[derive(Debug, Clone)]
pub struct ExternalProducer {
    /// Program followed by leading arguments
    command: Vec<String>,
    timeout: Duration,
}

impl ExternalProducer {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Producer running a single binary with the default timeout
    pub fn from_bin(bin: impl Into<String>) -> Self {
        Self::new(vec![bin.into()], DEFAULT_PRODUCER_TIMEOUT)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn json_path(path: &Path) -> PathBuf {
        path.with_extension("json")
    }

    async fn run(&self, source: &Path, target: &Path) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| IrError::producer(source, "empty producer command"))?;

        let child = Command::new(program)
            .args(args)
            .arg(source)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IrError::producer(source, format!("failed to spawn {}: {}", program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                IrError::producer(
                    source,
                    format!("timed out after {} ms", self.timeout.as_millis()),
                )
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IrError::producer(source, stderr.trim()));
        }
        Ok(())
    }
}

#[async_trait]
impl SyntaxTreeProducer for ExternalProducer {
    async fn produce(&self, path: &Path) -> Result<SyntaxTree> {
        let target = Self::json_path(path);
        self.run(path, &target).await?;

        let json = tokio::fs::read_to_string(&target).await?;
        if let Err(e) = tokio::fs::remove_file(&target).await {
            tracing::debug!("Could not remove {}: {}", target.display(), e);
        }

        decode_syntax_tree(&json, path)
    }

    fn name(&self) -> &'static str {
        "external"
    }
}
