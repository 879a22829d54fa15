//! Decoder for the `syn-serde` JSON representation of a source file
//!
//! External producers emit a file as `{"items": [...]}` where every item is a
//! single-key object (`{"fn": {...}}`, `{"use": {...}}`, `{"struct": ...}`).
//! Only `fn` and `use` items are decoded, the rest become [`Item::Other`].

use serde_json::{Map, Value};
use std::path::Path;

use crate::errors::{IrError, Result};
use crate::features::parsing::domain::{
    FunctionDeclaration, Item, Param, SyntaxTree, TypeRef, UseDeclaration, Visibility,
};

/// Decode a JSON document into a [`SyntaxTree`] for `file_path`
pub fn decode_syntax_tree(json: &str, file_path: &Path) -> Result<SyntaxTree> {
    let root: Value = serde_json::from_str(json)?;
    Decoder { file: file_path }.file(&root)
}

struct Decoder<'a> {
    file: &'a Path,
}

impl Decoder<'_> {
    fn error(&self, reason: impl Into<String>) -> IrError {
        IrError::parse(self.file, reason)
    }

    fn file(&self, root: &Value) -> Result<SyntaxTree> {
        let items = root
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| self.error("missing `items` array"))?;

        let items = items
            .iter()
            .map(|item| self.item(item))
            .collect::<Result<Vec<_>>>()?;

        Ok(SyntaxTree::new(self.file, items))
    }

    fn item(&self, item: &Value) -> Result<Item> {
        if let Some(func) = item.get("fn") {
            return self.function(func).map(Item::Function);
        }
        if let Some(decl) = item.get("use") {
            let tree = decl
                .get("tree")
                .ok_or_else(|| self.error("`use` item without `tree`"))?;
            return Ok(Item::Use(UseDeclaration::tree(self.use_tree(tree)?)));
        }
        Ok(Item::Other)
    }

    fn function(&self, func: &Value) -> Result<FunctionDeclaration> {
        let ident = func
            .get("ident")
            .and_then(Value::as_str)
            .ok_or_else(|| self.error("`fn` item without `ident`"))?;

        let visibility = match func.get("vis") {
            Some(Value::String(vis)) if vis == "pub" => Visibility::Public,
            Some(Value::Object(vis)) if vis.contains_key("restricted") => Visibility::Restricted,
            _ => Visibility::Inherited,
        };

        let attributes = match func.get("attrs").and_then(Value::as_array) {
            Some(attrs) => attrs
                .iter()
                .filter(|attr| attr.get("style").and_then(Value::as_str) != Some("inner"))
                .map(|attr| self.attribute(attr))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let params = match func.get("inputs").and_then(Value::as_array) {
            Some(inputs) => inputs
                .iter()
                .map(|input| self.param(input))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(FunctionDeclaration {
            visibility,
            ident: ident.to_string(),
            attributes,
            params,
        })
    }

    /// First path segment of an attribute.
    /// Newer producers nest the path under `meta`.
    fn attribute(&self, attr: &Value) -> Result<Option<String>> {
        let path = attr
            .get("path")
            .or_else(|| {
                let meta = attr.get("meta")?;
                meta.get("path")
                    .or_else(|| meta.get("list").and_then(|list| list.get("path")))
                    .or_else(|| meta.get("name_value").and_then(|nv| nv.get("path")))
            })
            .ok_or_else(|| self.error("attribute without `path`"))?;

        let segments = self.path_segments(path)?;
        Ok(segments.into_iter().next())
    }

    fn param(&self, input: &Value) -> Result<Param> {
        if input.get("receiver").is_some() {
            return Ok(Param::Receiver);
        }
        let typed = input
            .get("typed")
            .ok_or_else(|| self.error("function input is neither `receiver` nor `typed`"))?;
        let ty = typed
            .get("ty")
            .ok_or_else(|| self.error("typed function input without `ty`"))?;

        Ok(Param::Typed { ty: self.type_ref(ty)? })
    }

    fn type_ref(&self, ty: &Value) -> Result<TypeRef> {
        let Some(path) = ty.get("path") else {
            return Ok(TypeRef::Other);
        };
        if ty.get("qself").is_some() || path.get("qself").is_some() {
            return Ok(TypeRef::Other);
        }
        Ok(TypeRef::Path {
            segments: self.path_segments(path)?,
        })
    }

    fn path_segments(&self, path: &Value) -> Result<Vec<String>> {
        let segments = path
            .get("segments")
            .and_then(Value::as_array)
            .ok_or_else(|| self.error("path without `segments`"))?;

        segments
            .iter()
            .map(|segment| {
                segment
                    .get("ident")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| self.error("path segment without `ident`"))
            })
            .collect()
    }

    fn use_tree(&self, tree: &Value) -> Result<UseDeclaration> {
        match tree {
            Value::String(glob) if glob == "*" => Ok(UseDeclaration::Leaf),
            Value::Object(node) => self.use_node(node),
            other => Err(self.error(format!("unrecognized use tree: {}", other))),
        }
    }

    fn use_node(&self, node: &Map<String, Value>) -> Result<UseDeclaration> {
        if let Some(path) = node.get("path") {
            let ident = path
                .get("ident")
                .and_then(Value::as_str)
                .ok_or_else(|| self.error("use path without `ident`"))?;
            let tree = path
                .get("tree")
                .ok_or_else(|| self.error("use path without `tree`"))?;
            return Ok(UseDeclaration::path(ident, self.use_tree(tree)?));
        }

        if let Some(group) = node.get("group") {
            let members = group
                .as_array()
                .ok_or_else(|| self.error("use group is not an array"))?;
            return Ok(UseDeclaration::group(members.iter().filter_map(|member| {
                member.get("ident").and_then(Value::as_str)
            })));
        }

        if node.contains_key("ident") || node.contains_key("rename") || node.contains_key("glob")
        {
            return Ok(UseDeclaration::Leaf);
        }

        Err(self.error("unrecognized use tree node"))
    }
}
