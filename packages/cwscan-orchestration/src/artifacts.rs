//! Artifact upload
//!
//! Every generated file must map to an entry function before anything is
//! uploaded, so a job never leaves a partial set of artifacts behind.

use crate::error::{OrchestratorError, Result};
use crate::generator::SchemaArtifact;
use chrono::Utc;
use cwscan_ir::{EntryFunction, MessageTypeBinding};
use cwscan_storage::{ArtifactRef, BlobStore};
use serde_json::json;
use tracing::info;

/// Entry function whose message type produced `file_name`
///
/// `execute_msg.json` matches `ExecuteMsg`: extension, `_` and `-` are
/// dropped and the comparison ignores case.
pub fn match_entry_function(
    file_name: &str,
    bindings: &[MessageTypeBinding],
) -> Option<EntryFunction> {
    let stem = file_name.strip_suffix(".json").unwrap_or(file_name);
    let normalized: String = stem
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_uppercase();

    bindings
        .iter()
        .find(|b| b.type_name.to_uppercase() == normalized)
        .map(|b| b.entry_function)
}

/// `<unix-timestamp>-<original-filename>`
pub fn upload_name(timestamp: i64, file_name: &str) -> String {
    format!("{}-{}", timestamp, file_name)
}

/// Upload artifacts to the schemas bucket
pub async fn store_artifacts(
    schemas: &dyn BlobStore,
    artifacts: &[SchemaArtifact],
    bindings: &[MessageTypeBinding],
    source_id: &str,
    address: Option<&str>,
) -> Result<Vec<ArtifactRef>> {
    let matched = artifacts
        .iter()
        .map(|artifact| {
            match_entry_function(&artifact.file_name, bindings)
                .map(|entry| (artifact, entry))
                .ok_or_else(|| {
                    OrchestratorError::Other(anyhow::anyhow!(
                        "could not find entry function name for schema file {}",
                        artifact.file_name
                    ))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    let timestamp = Utc::now().timestamp();
    let mut refs = Vec::with_capacity(matched.len());

    for (artifact, entry) in matched {
        let data = artifact.read().await?;
        let metadata = json!({
            "sourceID": source_id,
            "address": address,
            "funcName": entry.as_str(),
            "timestamp": timestamp,
        });

        let id = schemas
            .upload(&upload_name(timestamp, &artifact.file_name), &data, metadata)
            .await?;
        refs.push(ArtifactRef {
            id,
            func_name: entry.as_str().to_string(),
        });
    }

    info!("Stored {} schema artifacts for {}", refs.len(), source_id);
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwscan_storage::InMemoryBlobStore;
    use std::path::Path;

    fn binding(entry: EntryFunction, type_name: &str) -> MessageTypeBinding {
        MessageTypeBinding {
            entry_function: entry,
            type_name: type_name.to_string(),
            qualified_path: format!("demo::msg::{}", type_name),
        }
    }

    fn artifact(dir: &Path, name: &str) -> SchemaArtifact {
        let path = dir.join(name);
        std::fs::write(&path, format!("{{\"title\":\"{}\"}}", name)).unwrap();
        SchemaArtifact {
            path,
            file_name: name.to_string(),
        }
    }

    #[test]
    fn test_match_entry_function() {
        let bindings = vec![
            binding(EntryFunction::Execute, "ExecuteMsg"),
            binding(EntryFunction::Query, "QueryMsg"),
        ];

        assert_eq!(
            match_entry_function("execute_msg.json", &bindings),
            Some(EntryFunction::Execute)
        );
        assert_eq!(
            match_entry_function("query-msg.json", &bindings),
            Some(EntryFunction::Query)
        );
        assert_eq!(match_entry_function("state.json", &bindings), None);
    }

    #[test]
    fn test_upload_name() {
        assert_eq!(upload_name(1_700_000_000, "execute_msg.json"), "1700000000-execute_msg.json");
    }

    #[tokio::test]
    async fn test_store_artifacts_uploads_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryBlobStore::new();
        let bindings = vec![binding(EntryFunction::Execute, "ExecuteMsg")];

        let refs = store_artifacts(
            &store,
            &[artifact(dir.path(), "execute_msg.json")],
            &bindings,
            "src-1",
            Some("juno1abc"),
        )
        .await
        .unwrap();

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].func_name, "execute");

        let info = store.find(&refs[0].id).await.unwrap().unwrap();
        assert!(info.filename.ends_with("-execute_msg.json"));
        assert_eq!(info.metadata["sourceID"], "src-1");
        assert_eq!(info.metadata["address"], "juno1abc");
        assert_eq!(info.metadata["funcName"], "execute");
        assert!(info.metadata["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn test_unmatched_file_uploads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryBlobStore::new();
        let bindings = vec![binding(EntryFunction::Execute, "ExecuteMsg")];

        let err = store_artifacts(
            &store,
            &[
                artifact(dir.path(), "execute_msg.json"),
                artifact(dir.path(), "state.json"),
            ],
            &bindings,
            "src-1",
            None,
        )
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "could not find entry function name for schema file state.json"
        );
        assert!(store.list().is_empty());
    }
}
