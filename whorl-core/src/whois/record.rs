//! The structured outcome of one resolution chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::merge::{merge, merge_registry_info};
use crate::target::TargetType;

/// Nested field storage. Keys are ordered so that output is deterministic.
pub type FieldMap = BTreeMap<String, Field>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Text(String),
    List(Vec<String>),
    Map(FieldMap),
}

impl Field {
    pub fn text(value: impl Into<String>) -> Self {
        Field::Text(value.into())
    }

    /// True when the field carries no usable data.
    pub fn is_empty(&self) -> bool {
        match self {
            Field::Text(s) => s.trim().is_empty(),
            Field::List(items) => items.iter().all(|s| s.trim().is_empty()),
            Field::Map(map) => map.values().all(Field::is_empty),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Field::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut FieldMap> {
        match self {
            Field::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Every value as a list, whether stored as one text or many.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Field::Text(s) => vec![s.as_str()],
            Field::List(items) => items.iter().map(String::as_str).collect(),
            Field::Map(_) => Vec::new(),
        }
    }

    /// Append a value, promoting a single text into a list.
    pub fn push(&mut self, value: String) {
        match self {
            Field::List(items) => items.push(value),
            Field::Text(existing) => {
                let first = std::mem::take(existing);
                *self = Field::List(vec![first, value]);
            }
            Field::Map(_) => *self = Field::List(vec![value]),
        }
    }
}

/// Walk a nested map along `path`.
pub fn lookup<'a>(map: &'a FieldMap, path: &[&str]) -> Option<&'a Field> {
    let (first, rest) = path.split_first()?;
    let field = map.get(*first)?;
    if rest.is_empty() {
        Some(field)
    } else {
        lookup(field.as_map()?, rest)
    }
}

/// Text value at `path`, if any and non-empty.
pub fn lookup_text<'a>(map: &'a FieldMap, path: &[&str]) -> Option<&'a str> {
    lookup(map, path)
        .and_then(Field::as_text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// One query/response exchange, as recorded for provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHop {
    pub server: String,
    pub args: String,
    pub port: u16,
}

/// How the answer was obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInfo {
    pub servers: Vec<ServerHop>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TargetType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(rename = "regyinfo")]
    pub registry_info: RegistryInfo,
    #[serde(rename = "regrinfo")]
    pub registrant_info: FieldMap,
    pub raw_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no hop contributed any data.
    pub fn is_empty(&self) -> bool {
        self.raw_lines.is_empty() && self.registrant_info.is_empty()
    }

    pub fn push_hop(&mut self, hop: ServerHop) {
        self.registry_info.servers.push(hop);
    }

    /// Append one hop's raw lines, separated from earlier hops by a blank line.
    pub fn append_raw(&mut self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        if !self.raw_lines.is_empty() {
            self.raw_lines.push(String::new());
        }
        self.raw_lines.extend(lines.iter().cloned());
    }

    pub fn merge_registrant(&mut self, incoming: FieldMap) {
        let base = std::mem::take(&mut self.registrant_info);
        self.registrant_info = merge(base, incoming);
    }

    pub fn merge_registry(&mut self, incoming: RegistryInfo) {
        merge_registry_info(&mut self.registry_info, incoming);
    }

    pub fn field(&self, path: &[&str]) -> Option<&Field> {
        lookup(&self.registrant_info, path)
    }

    pub fn text(&self, path: &[&str]) -> Option<&str> {
        lookup_text(&self.registrant_info, path)
    }
}
