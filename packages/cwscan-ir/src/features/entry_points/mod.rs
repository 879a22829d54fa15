//! Entry Points Feature
//!
//! Resolves, per contract entry function, the message type it accepts and the
//! fully-qualified path that type is imported from.
//!
//! ## Structure
//! - `domain/` - EntryFunction, MessageTypeBinding
//! - `application/` - resolver, project discovery, analyze_project

pub mod application;
pub mod domain;

pub use application::{
    analyze_project, discover_source_files, entry_message_type, normalize_crate_name,
    qualify_crate_path, resolve_bindings, resolve_file_bindings, resolve_use_path,
};
pub use domain::{EntryFunction, MessageTypeBinding, CRATE_SENTINEL, ENTRY_POINT_MARKER};
