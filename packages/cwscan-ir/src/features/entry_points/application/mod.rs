//! Entry point use cases

mod analyze_project;
mod discovery;
mod resolver;

pub use analyze_project::analyze_project;
pub use discovery::discover_source_files;
pub use resolver::{
    entry_message_type, normalize_crate_name, qualify_crate_path, resolve_bindings,
    resolve_file_bindings, resolve_use_path,
};
