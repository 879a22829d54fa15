//! Cargo manifest inspection and patching
//!
//! The manifest is parsed with `toml` to decide what is missing, but patched
//! textually so everything outside the inserted lines stays byte-identical.

use crate::config::GeneratorConfig;
use crate::error::{OrchestratorError, Result};
use std::path::Path;
use tracing::info;

const MANIFEST_FILE: &str = "Cargo.toml";
const DEV_DEPENDENCIES: &str = "dev-dependencies";
const DEV_DEPENDENCIES_HEADER: &str = "[dev-dependencies]";
const DEV_DEPENDENCIES_SUBTABLE: &str = "dev-dependencies.";

fn parse_manifest(content: &str, path: &Path) -> Result<toml::Table> {
    content.parse::<toml::Table>().map_err(|e| {
        OrchestratorError::parse(format!("malformed manifest {}: {}", path.display(), e))
    })
}

/// `package.name` of the manifest in `project_path`
pub async fn read_crate_name(project_path: &Path) -> Result<String> {
    let path = project_path.join(MANIFEST_FILE);
    let content = tokio::fs::read_to_string(&path).await?;
    let manifest = parse_manifest(&content, &path)?;

    manifest
        .get("package")
        .and_then(|package| package.get("name"))
        .and_then(|name| name.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            OrchestratorError::parse(format!("missing package.name in {}", path.display()))
        })
}

/// Ensures the schema crate is a dev-dependency of a project
#[derive(Debug, Clone)]
pub struct ManifestPatcher {
    dependency_name: String,
    dependency_version: String,
}

impl ManifestPatcher {
    pub fn new(dependency_name: impl Into<String>, dependency_version: impl Into<String>) -> Self {
        Self {
            dependency_name: dependency_name.into(),
            dependency_version: dependency_version.into(),
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(&config.dependency_name, &config.dependency_version)
    }

    /// Patch `<project_path>/Cargo.toml`; returns whether the file changed
    pub async fn ensure_generator_dependency(&self, project_path: &Path) -> Result<bool> {
        let path = project_path.join(MANIFEST_FILE);
        let content = tokio::fs::read_to_string(&path).await?;

        match self.patch(&content, &path)? {
            Some(patched) => {
                tokio::fs::write(&path, patched).await?;
                info!(
                    "Added {} to dev-dependencies of {}",
                    self.dependency_name,
                    path.display()
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Patched manifest text, `None` when already satisfied
    pub fn patch(&self, content: &str, path: &Path) -> Result<Option<String>> {
        let manifest = parse_manifest(content, path)?;
        let dev_dependencies = manifest.get(DEV_DEPENDENCIES).and_then(|v| v.as_table());

        if dev_dependencies.is_some_and(|deps| deps.contains_key(&self.dependency_name)) {
            return Ok(None);
        }

        let eol = line_ending(content);
        let mut patched = content.to_string();

        let header_end = match find_header_end(&patched) {
            Some(end) => end,
            // An implicit table (only `[dev-dependencies.x]` headers) may still get its own header
            None if dev_dependencies.is_some() && !has_subtable_header(&patched) => {
                return Err(OrchestratorError::parse(format!(
                    "cannot locate the [{}] header in {}",
                    DEV_DEPENDENCIES,
                    path.display()
                )));
            }
            None => {
                patched.push_str(eol);
                patched.push_str(eol);
                patched.push_str(DEV_DEPENDENCIES_HEADER);
                patched.len()
            }
        };

        let line = format!(
            "{}{} = {{ version = \"{}\" }}",
            eol, self.dependency_name, self.dependency_version
        );
        patched.insert_str(header_end, &line);
        Ok(Some(patched))
    }
}

fn line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// Key of a `[table]` header line, unquoted and without surrounding whitespace
///
/// `None` for array-of-tables headers and anything that is not a header.
fn header_key(line: &str) -> Option<String> {
    let text = line.trim_start();
    if text.starts_with("[[") {
        return None;
    }
    let (inner, rest) = text.strip_prefix('[')?.split_once(']')?;
    let rest = rest.trim_start();
    if !rest.is_empty() && !rest.starts_with('#') {
        return None;
    }
    Some(
        inner
            .split('.')
            .map(|part| part.trim().trim_matches(|c: char| c == '"' || c == '\''))
            .collect::<Vec<_>>()
            .join("."),
    )
}

/// Byte offset of the end of the `[dev-dependencies]` header line, before its EOL
fn find_header_end(content: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let text = line.trim_end_matches(['\n', '\r']);
        if header_key(text).as_deref() == Some(DEV_DEPENDENCIES) {
            return Some(offset + text.len());
        }
        offset += line.len();
    }
    None
}

fn has_subtable_header(content: &str) -> bool {
    content
        .lines()
        .filter_map(header_key)
        .any(|key| key.starts_with(DEV_DEPENDENCIES_SUBTABLE))
}
