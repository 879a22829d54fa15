//! Analyze project use case

use std::path::Path;

use crate::errors::Result;
use crate::features::entry_points::application::{discover_source_files, resolve_bindings};
use crate::features::entry_points::domain::MessageTypeBinding;
use crate::features::parsing::ports::SyntaxTreeProducer;

/// Discover, parse and resolve the entry point bindings of a project
pub async fn analyze_project(
    root: &Path,
    crate_name: &str,
    producer: &dyn SyntaxTreeProducer,
) -> Result<Vec<MessageTypeBinding>> {
    let files = discover_source_files(root)?;
    tracing::debug!(
        "Analyzing {} source files under {} with {} producer",
        files.len(),
        root.display(),
        producer.name()
    );

    let mut trees = Vec::with_capacity(files.len());
    for file in &files {
        trees.push(producer.produce(file).await?);
    }

    let bindings = resolve_bindings(&trees, crate_name)?;
    tracing::info!(
        "Resolved {} entry point bindings for {}",
        bindings.len(),
        crate_name
    );
    Ok(bindings)
}
