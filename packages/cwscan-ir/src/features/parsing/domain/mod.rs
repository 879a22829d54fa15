//! Syntax tree representation
//!
//! A small view of a Rust source file. Only the items the entry
//! point analysis looks at (function signatures and `use` declarations) keep
//! their structure, everything else is collapsed into [`Item::Other`].

use std::path::PathBuf;

/// Parsed source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    /// File the tree was produced from (for error messages)
    pub file_path: PathBuf,

    /// Top-level items in declaration order
    pub items: Vec<Item>,
}

impl SyntaxTree {
    pub fn new(file_path: impl Into<PathBuf>, items: Vec<Item>) -> Self {
        Self {
            file_path: file_path.into(),
            items,
        }
    }

    /// Function declarations in declaration order
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDeclaration> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(func) => Some(func),
            _ => None,
        })
    }

    /// Use declarations in declaration order
    pub fn uses(&self) -> impl Iterator<Item = &UseDeclaration> {
        self.items.iter().filter_map(|item| match item {
            Item::Use(decl) => Some(decl),
            _ => None,
        })
    }
}

/// Top-level item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Use(UseDeclaration),
    Function(FunctionDeclaration),
    Other,
}

/// Item visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Plain `pub`
    Public,
    /// `pub(crate)`, `pub(super)`, `pub(in path)`
    Restricted,
    Inherited,
}

/// Free function signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDeclaration {
    pub visibility: Visibility,
    pub ident: String,

    /// First path segment of each outer attribute, in order.
    /// `None` when the attribute path has no segments.
    pub attributes: Vec<Option<String>>,

    pub params: Vec<Param>,
}

impl FunctionDeclaration {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Identifier of the first attribute, if any
    pub fn first_attribute(&self) -> Option<&str> {
        self.attributes.first().and_then(|attr| attr.as_deref())
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// `self`, `&self`, `&mut self`
    Receiver,
    Typed { ty: TypeRef },
}

/// Declared parameter type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// Named path type without qualified self (`ExecuteMsg`, `msg::ExecuteMsg`).
    /// Segments hold identifiers only, generic arguments are dropped.
    Path { segments: Vec<String> },
    /// References, tuples, slices, qualified paths, ...
    Other,
}

impl TypeRef {
    /// Identifier of a single-segment path type
    pub fn simple_name(&self) -> Option<&str> {
        match self {
            TypeRef::Path { segments } if segments.len() == 1 => Some(segments[0].as_str()),
            _ => None,
        }
    }
}

/// Import statement tree
///
/// `use crate::msg::{ExecuteMsg, QueryMsg};` becomes
/// `Tree(Path("crate", Path("msg", Group(["ExecuteMsg", "QueryMsg"]))))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UseDeclaration {
    /// Wrapper around the root of a `use` item
    Tree(Box<UseDeclaration>),
    /// `ident::<tree>`
    Path {
        ident: String,
        tree: Box<UseDeclaration>,
    },
    /// `{A, B, C}`. Plain names only, nested paths and renames inside the
    /// braces are not kept
    Group(Vec<String>),
    /// Single name, rename or glob
    Leaf,
}

impl UseDeclaration {
    pub fn tree(inner: UseDeclaration) -> Self {
        UseDeclaration::Tree(Box::new(inner))
    }

    pub fn path(ident: impl Into<String>, tree: UseDeclaration) -> Self {
        UseDeclaration::Path {
            ident: ident.into(),
            tree: Box::new(tree),
        }
    }

    pub fn group<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        UseDeclaration::Group(names.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name_requires_single_segment() {
        let single = TypeRef::Path {
            segments: vec!["ExecuteMsg".to_string()],
        };
        let nested = TypeRef::Path {
            segments: vec!["msg".to_string(), "ExecuteMsg".to_string()],
        };

        assert_eq!(single.simple_name(), Some("ExecuteMsg"));
        assert_eq!(nested.simple_name(), None);
        assert_eq!(TypeRef::Other.simple_name(), None);
    }

    #[test]
    fn test_tree_item_iterators_preserve_order() {
        let tree = SyntaxTree::new(
            "lib.rs",
            vec![
                Item::Use(UseDeclaration::tree(UseDeclaration::Leaf)),
                Item::Function(FunctionDeclaration {
                    visibility: Visibility::Public,
                    ident: "first".to_string(),
                    attributes: vec![],
                    params: vec![],
                }),
                Item::Other,
                Item::Function(FunctionDeclaration {
                    visibility: Visibility::Inherited,
                    ident: "second".to_string(),
                    attributes: vec![],
                    params: vec![],
                }),
            ],
        );

        let names: Vec<_> = tree.functions().map(|f| f.ident.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(tree.uses().count(), 1);
    }
}
