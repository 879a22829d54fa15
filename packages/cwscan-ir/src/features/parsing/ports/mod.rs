//! Parsing ports (interfaces)
//!
//! Defines the contract for turning a source file into a [`SyntaxTree`].

use async_trait::async_trait;
use std::path::Path;

use crate::errors::Result;
use crate::features::parsing::domain::SyntaxTree;

/// Syntax tree producer - abstraction over the parser backend
#[async_trait]
pub trait SyntaxTreeProducer: Send + Sync {
    /// Produce the syntax tree of the `.rs` file at `path`
    async fn produce(&self, path: &Path) -> Result<SyntaxTree>;

    /// Backend name (for logs)
    fn name(&self) -> &'static str;
}
