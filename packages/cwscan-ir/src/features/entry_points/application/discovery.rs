//! Project source discovery

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::errors::Result;

/// Script written by the schema generator, never analyzed
const GENERATED_SCRIPT: &str = "schema.rs";

/// List the `.rs` files of a project.
///
/// Within each directory files come before subdirectories, both sorted by
/// name. Hidden directories and `target/` are skipped.
pub fn discover_source_files(root: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_source_file(&entry) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "target"
}

fn is_source_file(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.ends_with(".rs") && name != GENERATED_SCRIPT
}
