//! Parsing Feature
//!
//! Turns Rust source files into the small [`SyntaxTree`] model the entry point
//! analysis consumes.
//!
//! ## Structure
//! - `domain/` - SyntaxTree, UseDeclaration, FunctionDeclaration
//! - `ports/` - SyntaxTreeProducer trait
//! - `infrastructure/` - in-process `syn` producer, external JSON producer

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{
    FunctionDeclaration, Item, Param, SyntaxTree, TypeRef, UseDeclaration, Visibility,
};
pub use infrastructure::{decode_syntax_tree, ExternalProducer, SynProducer};
pub use ports::SyntaxTreeProducer;
