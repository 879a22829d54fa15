/*
 * cwscan IR - entry point analysis for contract source trees
 *
 * Feature-First Hexagonal Architecture:
 * - features/parsing      : SyntaxTree model, producer port, syn / external adapters
 * - features/entry_points : message type resolution, project discovery
 */

#![allow(clippy::should_implement_trait)] // from_str naming intentional

pub mod errors;
pub mod features;

pub use errors::{IrError, Result};
pub use features::entry_points::{
    analyze_project, discover_source_files, normalize_crate_name, qualify_crate_path,
    resolve_bindings, resolve_file_bindings, resolve_use_path, EntryFunction, MessageTypeBinding,
};
pub use features::parsing::{
    decode_syntax_tree, ExternalProducer, SynProducer, SyntaxTree, SyntaxTreeProducer,
    UseDeclaration,
};
