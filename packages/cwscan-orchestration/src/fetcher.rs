//! Source bundle retrieval
//!
//! A bundle is a zip archive in the sources bucket. It is downloaded into a
//! per-job scratch directory and extracted in place; the directory goes away
//! with its [`ScratchDir`] handle.

use crate::error::{OrchestratorError, Result};
use cwscan_storage::BlobStore;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// File name of the downloaded archive inside the scratch directory
pub const ARCHIVE_NAME: &str = "source.zip";

/// Uniquely named working directory of one job
#[derive(Debug)]
pub struct ScratchDir {
    dir: tempfile::TempDir,
}

impl ScratchDir {
    /// Create `<parent>/job-XXXXXX`, creating `parent` if needed
    pub fn create(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new().prefix("job-").tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dir.path().join(ARCHIVE_NAME)
    }

    /// Remove the directory now, reporting failures
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

/// Metadata attached to a source bundle at upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Package to analyze when the bundle is a workspace
    #[serde(rename = "crateName", default, skip_serializing_if = "Option::is_none")]
    pub crate_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(rename = "codeID", default, skip_serializing_if = "Option::is_none")]
    pub code_id: Option<serde_json::Value>,

    /// Remaining fields, forwarded downstream untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SourceMetadata {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|e| OrchestratorError::parse(format!("invalid source metadata: {}", e)))
    }
}

/// Download `source_id` into `scratch` and extract it there
pub async fn fetch_source(
    blobs: &dyn BlobStore,
    source_id: &str,
    scratch: &ScratchDir,
) -> Result<SourceMetadata> {
    if source_id.trim().is_empty() {
        return Err(OrchestratorError::parse("blank source reference"));
    }

    let info = blobs
        .find(source_id)
        .await?
        .ok_or_else(|| OrchestratorError::NotFound(source_id.to_string()))?;
    let metadata = SourceMetadata::from_value(info.metadata)?;

    let data = match blobs.download(source_id).await {
        Ok(data) => data,
        Err(e) if e.is_not_found() => {
            return Err(OrchestratorError::NotFound(source_id.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    tokio::fs::write(scratch.archive_path(), &data).await?;

    let dest = scratch.path().to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || extract_archive(data, &dest))
        .await
        .map_err(|e| anyhow::anyhow!("archive extraction task failed: {}", e))??;

    info!(
        "Extracted source {} ({} entries) to {}",
        source_id,
        extracted,
        scratch.path().display()
    );
    Ok(metadata)
}

/// Extract a zip archive, returns the number of entries
pub fn extract_archive(data: Vec<u8>, dest: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let entries = archive.len();
    archive.extract(dest)?;
    Ok(entries)
}

/// Directory of `crate_name` inside a workspace checkout
///
/// Runs the package location query (`cargo pkgid <crate>` by default) from
/// `project_root` and reads the `file://` URL it prints. The located
/// directory must exist under `project_root`.
pub async fn resolve_crate_root(
    project_root: &Path,
    crate_name: &str,
    locator: &[String],
    timeout: Duration,
) -> Result<PathBuf> {
    let (program, args) = locator
        .split_first()
        .ok_or_else(|| OrchestratorError::parse("empty package location command"))?;

    let child = Command::new(program)
        .args(args)
        .arg(crate_name)
        .current_dir(project_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            OrchestratorError::parse(format!("failed to run package location query: {}", e))
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            OrchestratorError::parse(format!(
                "package location query for {} timed out after {} ms",
                crate_name,
                timeout.as_millis()
            ))
        })??;

    if !output.status.success() {
        return Err(OrchestratorError::parse(format!(
            "package location query for {} failed: {}",
            crate_name,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let location = parse_package_location(&String::from_utf8_lossy(&output.stdout))?;
    let location = contained_location(project_root, &location).await?;
    debug!("Crate {} located at {}", crate_name, location.display());
    Ok(location)
}

/// Canonical `location`, rejected unless it lies under `root`
async fn contained_location(root: &Path, location: &Path) -> Result<PathBuf> {
    let root = tokio::fs::canonicalize(root).await?;
    let canonical = tokio::fs::canonicalize(location).await.map_err(|e| {
        OrchestratorError::parse(format!(
            "package location {} is not accessible: {}",
            location.display(),
            e
        ))
    })?;

    if !canonical.starts_with(&root) {
        return Err(OrchestratorError::parse(format!(
            "package location {} is outside the extracted sources",
            location.display()
        )));
    }
    Ok(canonical)
}

/// `file:///ws/contracts/cw20#0.13.4` -> `/ws/contracts/cw20`
///
/// Also accepts the `path+file://` form and a missing fragment.
pub fn parse_package_location(output: &str) -> Result<PathBuf> {
    let line = output.trim();
    let url = line.strip_prefix("path+").unwrap_or(line);
    let path = url.strip_prefix("file://").ok_or_else(|| {
        OrchestratorError::parse(format!("unexpected package location: {}", line))
    })?;
    let path = match path.rfind('#') {
        Some(idx) => &path[..idx],
        None => path,
    };
    if path.is_empty() {
        return Err(OrchestratorError::parse(format!(
            "unexpected package location: {}",
            line
        )));
    }
    Ok(PathBuf::from(path))
}
