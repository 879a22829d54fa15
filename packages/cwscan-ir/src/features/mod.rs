//! Feature slices

pub mod entry_points;
pub mod parsing;
