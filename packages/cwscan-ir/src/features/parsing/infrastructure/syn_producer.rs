//! In-process syntax tree producer backed by `syn`

use async_trait::async_trait;
use std::path::Path;

use crate::errors::{IrError, Result};
use crate::features::parsing::domain::{
    FunctionDeclaration, Item, Param, SyntaxTree, TypeRef, UseDeclaration, Visibility,
};
use crate::features::parsing::ports::SyntaxTreeProducer;

/// Parses source files with `syn::parse_file`
#[derive(Debug, Default, Clone, Copy)]
pub struct SynProducer;

impl SynProducer {
    pub fn new() -> Self {
        Self
    }

    /// Parse source text that is already in memory
    pub fn parse_source(&self, source: &str, file_path: &Path) -> Result<SyntaxTree> {
        let file = syn::parse_file(source).map_err(|e| IrError::parse(file_path, e.to_string()))?;
        Ok(lower_file(&file, file_path))
    }
}

#[async_trait]
impl SyntaxTreeProducer for SynProducer {
    async fn produce(&self, path: &Path) -> Result<SyntaxTree> {
        let source = tokio::fs::read_to_string(path).await?;
        self.parse_source(&source, path)
    }

    fn name(&self) -> &'static str {
        "syn"
    }
}

/// Lower a parsed `syn::File` into the analysis model
pub fn lower_file(file: &syn::File, file_path: &Path) -> SyntaxTree {
    let items = file.items.iter().map(lower_item).collect();
    SyntaxTree::new(file_path, items)
}

fn lower_item(item: &syn::Item) -> Item {
    match item {
        syn::Item::Fn(func) => Item::Function(lower_fn(func)),
        syn::Item::Use(decl) => Item::Use(UseDeclaration::tree(lower_use_tree(&decl.tree))),
        _ => Item::Other,
    }
}

fn lower_fn(func: &syn::ItemFn) -> FunctionDeclaration {
    let visibility = match &func.vis {
        syn::Visibility::Public(_) => Visibility::Public,
        syn::Visibility::Restricted(_) => Visibility::Restricted,
        syn::Visibility::Inherited => Visibility::Inherited,
    };

    let attributes = func
        .attrs
        .iter()
        .filter(|attr| matches!(attr.style, syn::AttrStyle::Outer))
        .map(|attr| {
            attr.path()
                .segments
                .first()
                .map(|segment| segment.ident.to_string())
        })
        .collect();

    let params = func
        .sig
        .inputs
        .iter()
        .map(|arg| match arg {
            syn::FnArg::Receiver(_) => Param::Receiver,
            syn::FnArg::Typed(pat) => Param::Typed {
                ty: lower_type(&pat.ty),
            },
        })
        .collect();

    FunctionDeclaration {
        visibility,
        ident: func.sig.ident.to_string(),
        attributes,
        params,
    }
}

fn lower_type(ty: &syn::Type) -> TypeRef {
    match ty {
        syn::Type::Path(type_path) if type_path.qself.is_none() => TypeRef::Path {
            segments: type_path
                .path
                .segments
                .iter()
                .map(|segment| segment.ident.to_string())
                .collect(),
        },
        _ => TypeRef::Other,
    }
}

fn lower_use_tree(tree: &syn::UseTree) -> UseDeclaration {
    match tree {
        syn::UseTree::Path(path) => {
            UseDeclaration::path(path.ident.to_string(), lower_use_tree(&path.tree))
        }
        syn::UseTree::Group(group) => UseDeclaration::group(group.items.iter().filter_map(
            |member| match member {
                syn::UseTree::Name(name) => Some(name.ident.to_string()),
                _ => None,
            },
        )),
        syn::UseTree::Name(_) | syn::UseTree::Rename(_) | syn::UseTree::Glob(_) => {
            UseDeclaration::Leaf
        }
    }
}
