//! End-to-end job lifecycle over in-memory and SQLite stores
//!
//! The schema tool and the package locator are simulated with `sh -c`.

use cwscan_orchestration::{InMemoryBackend, LifecycleManager, TickOutcome, WorkerConfig, WorkerContext};
use cwscan_storage::{BlobStore, JobQueue, JobRecord, ResultStore};
use serde_json::{json, Value};
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = "[package]\nname = \"cw-counter\"\nversion = \"0.1.0\"\n";

const LIB_RS: &str = "pub mod contract;\npub mod msg;\n";

const CONTRACT_RS: &str = r#"
use cosmwasm_std::{entry_point, Binary, Deps, DepsMut, Env, MessageInfo, Response, StdResult};
use crate::msg::{ExecuteMsg, QueryMsg};

#[entry_point]
pub fn execute(deps: DepsMut, env: Env, info: MessageInfo, msg: ExecuteMsg) -> StdResult<Response> {
    unimplemented!()
}

#[entry_point]
pub fn query(deps: Deps, env: Env, msg: QueryMsg) -> StdResult<Binary> {
    unimplemented!()
}
"#;

const MSG_RS: &str = r#"
pub enum ExecuteMsg { Increment {} }
pub enum QueryMsg { GetCount {} }
"#;

/// Requires the patched manifest, then writes both schemas
const TOOL_OK: &str = "grep -q 'cosmwasm-schema = { version = \"1.0.0\" }' ../Cargo.toml \
    && test -f schema.rs && mkdir -p schema \
    && echo '{\"title\":\"ExecuteMsg\"}' > schema/execute_msg.json \
    && echo '{\"title\":\"QueryMsg\"}' > schema/query_msg.json";

const TOOL_FAIL: &str = "echo 'schema export failed' >&2; exit 1";

fn zip_bundle(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn contract_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Cargo.toml", MANIFEST),
        ("src/lib.rs", LIB_RS),
        ("src/contract.rs", CONTRACT_RS),
        ("src/msg.rs", MSG_RS),
    ]
}

fn config(scratch: &Path, tool: &str) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.sources_save_path = scratch.to_path_buf();
    config.queue.poll_interval_ms = 20;
    config.generator.command = vec!["sh".to_string(), "-c".to_string(), tool.to_string()];
    config.generator.timeout_ms = 10_000;
    config
}

fn scratch_entries(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

struct Harness {
    scratch: TempDir,
    backend: InMemoryBackend,
    manager: LifecycleManager,
}

impl Harness {
    fn new(tool: &str) -> Self {
        Self::with_config(|config| {
            config.generator.command[2] = tool.to_string();
        })
    }

    fn with_config(adjust: impl FnOnce(&mut WorkerConfig)) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = config(scratch.path(), TOOL_OK);
        adjust(&mut config);

        let backend = InMemoryBackend::new(&config);
        let ctx = backend.context(&config);
        Self {
            scratch,
            backend,
            manager: LifecycleManager::with_context(config, ctx),
        }
    }

    async fn submit(&self, files: &[(&str, &str)], metadata: Value) -> String {
        let id = self
            .backend
            .sources
            .upload("source.zip", &zip_bundle(files), metadata)
            .await
            .unwrap();
        self.backend.queue.add(&id).await.unwrap();
        id
    }

    async fn record(&self, source_id: &str) -> JobRecord {
        self.backend
            .results
            .get_job_record(source_id)
            .await
            .unwrap()
            .expect("job record")
    }

    async fn assert_drained(&self) {
        assert_eq!(self.backend.queue.size().await.unwrap(), 0);
        assert_eq!(self.backend.queue.in_flight(), 0);
        assert_eq!(scratch_entries(self.scratch.path()), 0);
    }
}

#[tokio::test]
async fn test_successful_job_records_uploads_and_publishes() {
    let harness = Harness::new(TOOL_OK);
    let source_id = harness
        .submit(&contract_files(), json!({"address": "juno1counter", "codeID": 12}))
        .await;

    assert_eq!(
        harness.manager.tick().await,
        TickOutcome::Completed(source_id.clone())
    );

    let record = harness.record(&source_id).await;
    assert_eq!(record.parsed, Some(true));
    assert_eq!(record.error, None);
    let schemas = record.schemas.unwrap();
    let funcs: Vec<_> = schemas.iter().map(|s| s.func_name.as_str()).collect();
    assert_eq!(funcs, vec!["execute", "query"]);

    let uploaded = harness.backend.schemas.list();
    assert_eq!(uploaded.len(), 2);
    for info in &uploaded {
        assert_eq!(info.metadata["sourceID"], source_id.as_str());
        assert_eq!(info.metadata["address"], "juno1counter");
        let prefix = format!("{}-", info.metadata["timestamp"]);
        assert!(info.filename.starts_with(&prefix), "{}", info.filename);
    }

    let events = harness.backend.events.published();
    assert_eq!(events.len(), 1);
    let message: Value = serde_json::from_slice(&events[0].data).unwrap();
    assert_eq!(message["sourceID"], source_id.as_str());
    assert_eq!(message["codeID"], 12);
    assert_eq!(message["schemas"].as_array().unwrap().len(), 2);
    assert_eq!(harness.backend.publish_queue.in_flight(), 0);

    harness.assert_drained().await;
    assert_eq!(harness.manager.tick().await, TickOutcome::Idle);
}

#[tokio::test]
async fn test_tool_failure_is_recorded() {
    let harness = Harness::new(TOOL_FAIL);
    let source_id = harness.submit(&contract_files(), Value::Null).await;

    assert_eq!(
        harness.manager.tick().await,
        TickOutcome::Failed(source_id.clone())
    );

    let record = harness.record(&source_id).await;
    assert!(record.error.unwrap().contains("schema export failed"));
    assert_eq!(record.parsed, None);
    assert!(harness.backend.schemas.list().is_empty());
    assert!(harness.backend.events.published().is_empty());
    harness.assert_drained().await;
}

#[tokio::test]
async fn test_zero_bindings_fails_without_artifacts() {
    let harness = Harness::new(TOOL_OK);
    let source_id = harness
        .submit(
            &[
                ("Cargo.toml", MANIFEST),
                ("src/lib.rs", "pub fn helper() -> u32 { 1 }\n"),
            ],
            Value::Null,
        )
        .await;

    assert_eq!(
        harness.manager.tick().await,
        TickOutcome::Failed(source_id.clone())
    );

    let record = harness.record(&source_id).await;
    assert_eq!(
        record.error.as_deref(),
        Some("no entry point message types resolved in cw-counter")
    );
    assert!(harness.backend.schemas.list().is_empty());
    harness.assert_drained().await;
}

#[tokio::test]
async fn test_missing_source_is_recorded() {
    let harness = Harness::new(TOOL_OK);
    harness.backend.queue.add("64a0f1").await.unwrap();

    assert_eq!(
        harness.manager.tick().await,
        TickOutcome::Failed("64a0f1".to_string())
    );
    let record = harness.record("64a0f1").await;
    assert_eq!(record.error.as_deref(), Some("source 64a0f1 not found"));
    harness.assert_drained().await;
}

#[tokio::test]
async fn test_nested_crate_is_located() {
    let harness = Harness::with_config(|config| {
        config.generator.package_locator = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo \"file://$PWD/contracts/$1#0.1.0\"".to_string(),
            "locator".to_string(),
        ];
    });

    let source_id = harness
        .submit(
            &[
                ("Cargo.toml", "[workspace]\nmembers = [\"contracts/*\"]\n"),
                ("contracts/cw-counter/Cargo.toml", MANIFEST),
                ("contracts/cw-counter/src/lib.rs", LIB_RS),
                ("contracts/cw-counter/src/contract.rs", CONTRACT_RS),
                ("contracts/cw-counter/src/msg.rs", MSG_RS),
            ],
            json!({"crateName": "cw-counter"}),
        )
        .await;

    assert_eq!(
        harness.manager.tick().await,
        TickOutcome::Completed(source_id.clone())
    );
    let message: Value =
        serde_json::from_slice(&harness.backend.events.published()[0].data).unwrap();
    assert_eq!(message["crateName"], "cw-counter");
    harness.assert_drained().await;
}

#[tokio::test]
async fn test_nested_crate_outside_sources_is_rejected() {
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("Cargo.toml"), MANIFEST).unwrap();
    let location = format!("file://{}#0.1.0", outside.path().display());

    let harness = Harness::with_config(|config| {
        config.generator.package_locator = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("echo \"{}\"", location),
            "locator".to_string(),
        ];
    });
    let source_id = harness
        .submit(&contract_files(), json!({"crateName": "cw-counter"}))
        .await;

    assert_eq!(
        harness.manager.tick().await,
        TickOutcome::Failed(source_id.clone())
    );
    let error = harness.record(&source_id).await.error.unwrap();
    assert!(error.contains("outside the extracted sources"), "{}", error);
    assert_eq!(
        std::fs::read_to_string(outside.path().join("Cargo.toml")).unwrap(),
        MANIFEST
    );
    assert!(!outside.path().join("examples").exists());
    harness.assert_drained().await;
}

#[tokio::test]
async fn test_publish_failure_keeps_job_completed() {
    let harness = Harness::new(TOOL_OK);
    harness.backend.events.set_failing(true);
    let source_id = harness.submit(&contract_files(), Value::Null).await;

    assert_eq!(
        harness.manager.tick().await,
        TickOutcome::Completed(source_id.clone())
    );
    assert_eq!(harness.record(&source_id).await.parsed, Some(true));
    assert_eq!(harness.backend.publish_queue.in_flight(), 1);
    harness.assert_drained().await;
}

#[tokio::test]
async fn test_jobs_processed_one_per_tick() {
    let harness = Harness::new(TOOL_OK);
    let first = harness.submit(&contract_files(), Value::Null).await;
    let second = harness.submit(&contract_files(), Value::Null).await;

    assert_eq!(harness.manager.tick().await, TickOutcome::Completed(first));
    assert_eq!(harness.backend.queue.size().await.unwrap(), 1);
    assert_eq!(harness.manager.tick().await, TickOutcome::Completed(second));
    assert_eq!(harness.manager.tick().await, TickOutcome::Idle);
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let mut harness = Harness::new(TOOL_OK);
    let source_id = harness.submit(&contract_files(), Value::Null).await;

    let results = harness.backend.results.clone();
    harness
        .manager
        .run(async {
            while results
                .get_job_record(&source_id)
                .await
                .unwrap()
                .and_then(|r| r.parsed)
                .is_none()
            {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;

    assert!(!harness.manager.is_connected());
    assert_eq!(harness.manager.tick().await, TickOutcome::Unavailable);
}

#[tokio::test]
async fn test_sqlite_backed_job() {
    let scratch = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    let mut config = config(scratch.path(), TOOL_OK);
    config.database_path = db.path().join("worker.db");

    let ctx = WorkerContext::connect(&config).unwrap();
    let source_id = ctx
        .sources
        .upload("source.zip", &zip_bundle(&contract_files()), Value::Null)
        .await
        .unwrap();
    ctx.queue.add(&source_id).await.unwrap();

    let mut manager = LifecycleManager::new(config.clone());
    manager.init().unwrap();
    assert_eq!(manager.tick().await, TickOutcome::Completed(source_id.clone()));

    let record = ctx.results.get_job_record(&source_id).await.unwrap().unwrap();
    assert_eq!(record.parsed, Some(true));
    assert_eq!(record.schemas.map(|s| s.len()), Some(2));
    assert_eq!(ctx.queue.size().await.unwrap(), 0);
    assert_eq!(scratch_entries(scratch.path()), 0);
}
