//! Entry point domain models

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute marking a contract entry point
pub const ENTRY_POINT_MARKER: &str = "entry_point";

/// Path segment naming the current crate in a `use` declaration
pub const CRATE_SENTINEL: &str = "crate";

/// Entry functions whose message types are extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryFunction {
    Execute,
    Query,
}

impl EntryFunction {
    /// All targets, in output order
    pub const ALL: [EntryFunction; 2] = [EntryFunction::Execute, EntryFunction::Query];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryFunction::Execute => "execute",
            EntryFunction::Query => "query",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "execute" => Some(EntryFunction::Execute),
            "query" => Some(EntryFunction::Query),
            _ => None,
        }
    }
}

impl fmt::Display for EntryFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message type accepted by one entry function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTypeBinding {
    #[serde(rename = "entryFunctionName")]
    pub entry_function: EntryFunction,

    /// Bare type identifier (`ExecuteMsg`)
    pub type_name: String,

    /// Import path with the crate sentinel substituted (`my_contract::msg::ExecuteMsg`)
    pub qualified_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_function_roundtrip() {
        for entry in EntryFunction::ALL {
            assert_eq!(EntryFunction::from_str(entry.as_str()), Some(entry));
        }
        assert_eq!(EntryFunction::from_str("instantiate"), None);
        assert!(EntryFunction::Execute < EntryFunction::Query);
    }

    #[test]
    fn test_binding_serializes_camel_case() {
        let binding = MessageTypeBinding {
            entry_function: EntryFunction::Query,
            type_name: "QueryMsg".to_string(),
            qualified_path: "cw20_base::msg::QueryMsg".to_string(),
        };

        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "entryFunctionName": "query",
                "typeName": "QueryMsg",
                "qualifiedPath": "cw20_base::msg::QueryMsg"
            })
        );
    }
}
