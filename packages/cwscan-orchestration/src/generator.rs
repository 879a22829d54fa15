//! Schema generation
//!
//! Renders `examples/schema.rs` for the resolved bindings, runs the schema
//! tool from `examples/` and collects the JSON files it writes to
//! `examples/schema/`.

use crate::config::GeneratorConfig;
use crate::error::{OrchestratorError, Result};
use cwscan_ir::MessageTypeBinding;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Generation script template
pub const SCHEMA_TEMPLATE: &str = include_str!("../templates/schema.rs.tmpl");

const USES_PLACEHOLDER: &str = "USES_PLACEHOLDER";
const EXPORTS_PLACEHOLDER: &str = "EXPORTS_CALLS_PLACEHOLDER";

const EXAMPLES_DIR: &str = "examples";
const SCRIPT_FILE: &str = "schema.rs";
const OUTPUT_DIR: &str = "schema";

/// One generated schema file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaArtifact {
    pub path: PathBuf,
    pub file_name: String,
}

impl SchemaArtifact {
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

/// `use` lines, one per distinct path in first-seen order
pub fn render_uses(bindings: &[MessageTypeBinding]) -> String {
    let mut seen = HashSet::new();
    bindings
        .iter()
        .filter(|b| seen.insert(b.qualified_path.as_str()))
        .map(|b| format!("use {};", b.qualified_path))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One export call per binding
pub fn render_exports(bindings: &[MessageTypeBinding]) -> String {
    bindings
        .iter()
        .map(|b| format!("    export_schema(&schema_for!({}), &out_dir);", b.type_name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_script(bindings: &[MessageTypeBinding]) -> String {
    SCHEMA_TEMPLATE
        .replace(USES_PLACEHOLDER, &render_uses(bindings))
        .replace(EXPORTS_PLACEHOLDER, &render_exports(bindings))
}

/// Runs the schema tool against a project
#[derive(Debug, Clone)]
pub struct SchemaGenerator {
    command: Vec<String>,
    timeout: Duration,
}

impl SchemaGenerator {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(
            config.command.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Write the script, clear earlier output and run the tool
    pub async fn generate(&self, project_path: &Path, bindings: &[MessageTypeBinding]) -> Result<()> {
        let examples = project_path.join(EXAMPLES_DIR);
        tokio::fs::create_dir_all(&examples).await?;
        tokio::fs::write(examples.join(SCRIPT_FILE), render_script(bindings)).await?;

        let output_dir = examples.join(OUTPUT_DIR);
        if tokio::fs::try_exists(&output_dir).await? {
            tokio::fs::remove_dir_all(&output_dir).await?;
        }

        self.run_tool(&examples).await
    }

    async fn run_tool(&self, cwd: &Path) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| OrchestratorError::generation("empty schema tool command"))?;

        debug!("Running {} in {}", self.command.join(" "), cwd.display());
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OrchestratorError::generation(format!("failed to start {}: {}", program, e))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                OrchestratorError::generation(format!(
                    "schema tool timed out after {} ms",
                    self.timeout.as_millis()
                ))
            })??;

        if !output.status.success() {
            return Err(OrchestratorError::generation(
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(())
    }

    /// `examples/schema/*.json`, sorted by file name
    pub async fn collect_artifacts(&self, project_path: &Path) -> Result<Vec<SchemaArtifact>> {
        let output_dir = project_path.join(EXAMPLES_DIR).join(OUTPUT_DIR);
        let mut artifacts = Vec::new();

        if tokio::fs::try_exists(&output_dir).await? {
            let mut entries = tokio::fs::read_dir(&output_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let is_json = path.extension().is_some_and(|ext| ext == "json");
                if !is_json || !entry.file_type().await?.is_file() {
                    continue;
                }
                artifacts.push(SchemaArtifact {
                    file_name: entry.file_name().to_string_lossy().into_owned(),
                    path,
                });
            }
        }

        if artifacts.is_empty() {
            return Err(OrchestratorError::generation(format!(
                "no schema artifacts produced in {}",
                output_dir.display()
            )));
        }

        artifacts.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        info!(
            "Collected {} schema artifacts from {}",
            artifacts.len(),
            output_dir.display()
        );
        Ok(artifacts)
    }
}
