//! Architecture Boundary Tests
//!
//! The IR crate analyzes syntax trees only. Queue, blob and database access
//! belong to cwscan-storage.

use std::path::Path;

fn manifest() -> String {
    let cargo_toml = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
    std::fs::read_to_string(cargo_toml).unwrap()
}

#[test]
fn test_ir_layer_no_storage_dependencies() {
    let content = manifest();

    assert!(
        !content.contains("rusqlite"),
        "IR layer must not depend on the database driver"
    );
    assert!(
        !content.contains("cwscan-storage"),
        "IR layer must not depend on the storage crate"
    );
}

#[test]
fn test_ir_layer_no_orchestration_dependency() {
    assert!(
        !manifest().contains("cwscan-orchestration"),
        "dependency direction is orchestration -> ir, never the reverse"
    );
}
