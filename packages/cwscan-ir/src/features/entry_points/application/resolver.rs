//! Entry point message type resolution
//!
//! Pure functions over [`SyntaxTree`]s: no I/O, equal inputs give equal outputs.

use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{IrError, Result};
use crate::features::entry_points::domain::{
    EntryFunction, MessageTypeBinding, CRATE_SENTINEL, ENTRY_POINT_MARKER,
};
use crate::features::parsing::domain::{Param, SyntaxTree, TypeRef, UseDeclaration};

/// Resolve the import path of `type_name` through one use declaration.
///
/// Returns `Ok(None)` when the declaration does not import `type_name`.
/// Groups are leaves, so the walk is bounded by the depth of the tree.
pub fn resolve_use_path(
    file: &Path,
    decl: &UseDeclaration,
    type_name: &str,
) -> Result<Option<String>> {
    resolve_with_prefix(file, decl, type_name, String::new())
}

fn resolve_with_prefix(
    file: &Path,
    decl: &UseDeclaration,
    type_name: &str,
    prefix: String,
) -> Result<Option<String>> {
    match decl {
        UseDeclaration::Tree(inner) => resolve_with_prefix(file, inner, type_name, prefix),
        UseDeclaration::Path { ident, tree } => {
            if ident.is_empty() {
                return Err(IrError::parse(file, "use path with empty segment"));
            }
            resolve_with_prefix(file, tree, type_name, format!("{}{}::", prefix, ident))
        }
        UseDeclaration::Group(members) => {
            if members.iter().any(String::is_empty) {
                return Err(IrError::parse(file, "use group with empty member"));
            }
            Ok(members
                .iter()
                .any(|member| member == type_name)
                .then(|| format!("{}{}", prefix, type_name)))
        }
        UseDeclaration::Leaf => Ok(None),
    }
}

/// Message type accepted by `entry` in this file.
///
/// A candidate is a `pub` function named after the entry whose first attribute
/// is `entry_point`. Its last parameter must be a single-segment named type,
/// otherwise the candidate is ignored. The last usable candidate wins.
pub fn entry_message_type(tree: &SyntaxTree, entry: EntryFunction) -> Result<Option<String>> {
    let mut msg_type = None;

    for func in tree.functions() {
        if func.ident.is_empty() {
            return Err(IrError::parse(&tree.file_path, "function with empty identifier"));
        }
        if !func.is_public()
            || func.ident != entry.as_str()
            || func.first_attribute() != Some(ENTRY_POINT_MARKER)
        {
            continue;
        }

        let Some(Param::Typed { ty }) = func.params.last() else {
            continue;
        };
        if let TypeRef::Path { segments } = ty {
            if segments.iter().any(String::is_empty) {
                return Err(IrError::parse(
                    &tree.file_path,
                    format!("`{}` parameter type with empty segment", func.ident),
                ));
            }
        }
        if let Some(name) = ty.simple_name() {
            msg_type = Some(name.to_string());
        }
    }

    Ok(msg_type)
}

/// Crate name as it appears in paths (`cw20-base` -> `cw20_base`)
pub fn normalize_crate_name(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}

/// Substitute a leading `crate` segment with the normalized crate name
pub fn qualify_crate_path(path: &str, crate_name: &str) -> String {
    match path.split_once("::") {
        Some((first, rest)) if first == CRATE_SENTINEL => {
            format!("{}::{}", normalize_crate_name(crate_name), rest)
        }
        _ => path.to_string(),
    }
}

/// Bindings resolved in a single file, ordered `execute` then `query`
pub fn resolve_file_bindings(
    tree: &SyntaxTree,
    crate_name: &str,
) -> Result<Vec<MessageTypeBinding>> {
    let mut bindings = Vec::new();

    for entry in EntryFunction::ALL {
        let Some(type_name) = entry_message_type(tree, entry)? else {
            continue;
        };

        let mut use_path = None;
        for decl in tree.uses() {
            if let Some(path) = resolve_use_path(&tree.file_path, decl, &type_name)? {
                use_path = Some(path);
                break;
            }
        }

        let Some(use_path) = use_path else {
            tracing::debug!(
                "{}: `{}` type {} is not imported through a use group, skipping",
                tree.file_path.display(),
                entry,
                type_name
            );
            continue;
        };

        bindings.push(MessageTypeBinding {
            entry_function: entry,
            qualified_path: qualify_crate_path(&use_path, crate_name),
            type_name,
        });
    }

    Ok(bindings)
}

/// Resolve bindings across a project.
///
/// Files are processed in the given order, a later file overwrites an earlier
/// binding for the same entry function. At most one binding per entry.
pub fn resolve_bindings(
    project_files: &[SyntaxTree],
    crate_name: &str,
) -> Result<Vec<MessageTypeBinding>> {
    let mut resolved: BTreeMap<EntryFunction, MessageTypeBinding> = BTreeMap::new();

    for tree in project_files {
        for binding in resolve_file_bindings(tree, crate_name)? {
            if let Some(previous) = resolved.insert(binding.entry_function, binding) {
                tracing::debug!(
                    "{} binding {} replaced by {}",
                    previous.entry_function,
                    previous.qualified_path,
                    tree.file_path.display()
                );
            }
        }
    }

    Ok(resolved.into_values().collect())
}
