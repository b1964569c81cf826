//! RPSL attribute-block extraction.
//!
//! Regional registries answer with blank-line separated objects
//! (`inetnum`, `aut-num`, `person`, `role`, `organisation`, `route`).
//! Blocks are indexed by handle so that contact references such as
//! `admin-c: EX1-AP` can be inlined under their role.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::dates::{normalize_date, DateFormat};
use super::path::{child_map, Role};
use crate::error::Result;
use crate::whois::record::{Field, FieldMap};

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9][A-Za-z0-9_\-]*):\s*(.*)$").expect("Invalid attribute regex")
});

const MAIN_KEY: &str = "main";

/// Attribute renames shared by every RIR.
const DEFAULT_TRANSLATE: &[(&str, &str)] = &[
    ("fax-no", "fax"),
    ("e-mail", "email"),
    ("nic-hdl", "handle"),
    ("person", "name"),
    ("role", "name"),
    ("netname", "name"),
    ("org-name", "organization"),
    ("descr", "desc"),
    ("last-modified", "changed"),
    ("country", "country"),
];

/// Contact attributes and the role their referenced block is stored under.
const DEFAULT_CONTACTS: &[(&str, Role)] = &[
    ("admin-c", Role::Admin),
    ("tech-c", Role::Tech),
    ("zone-c", Role::Zone),
    ("abuse-c", Role::Abuse),
];

/// Leaves normalized as dates after translation.
const DATE_ATTRIBUTES: &[&str] = &["created", "changed", "expires"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Network,
    AutNum,
    Contact,
    Organisation,
    Route,
    Other,
}

impl BlockKind {
    fn from_class(class: &str) -> Self {
        match class.to_ascii_lowercase().as_str() {
            "inetnum" | "inet6num" | "network" | "netrange" => BlockKind::Network,
            "aut-num" => BlockKind::AutNum,
            "person" | "role" => BlockKind::Contact,
            "organisation" | "organization" => BlockKind::Organisation,
            "route" | "route6" => BlockKind::Route,
            _ => BlockKind::Other,
        }
    }
}

/// One attribute block, attributes already translated.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    /// Value of the block's first attribute.
    pub value: String,
    pub attributes: FieldMap,
    handle: Option<String>,
}

impl Block {
    fn key(&self) -> String {
        match self.kind {
            BlockKind::AutNum => self.value.to_ascii_uppercase(),
            BlockKind::Contact => self.handle.clone().unwrap_or_else(|| self.value.clone()),
            _ => self.value.clone(),
        }
    }
}

/// Translate table, contact roles and date format of one RIR dialect.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    translate: BTreeMap<String, String>,
    contacts: Vec<(String, Role)>,
    date_format: DateFormat,
}

impl Default for BlockTemplate {
    fn default() -> Self {
        Self {
            translate: DEFAULT_TRANSLATE
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            contacts: DEFAULT_CONTACTS
                .iter()
                .map(|(attr, role)| (attr.to_string(), *role))
                .collect(),
            date_format: DateFormat::ymd(),
        }
    }
}

impl BlockTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or override attribute renames.
    pub fn with_translations(mut self, pairs: &[(&str, &str)]) -> Self {
        for (from, to) in pairs {
            self.translate.insert(from.to_string(), to.to_string());
        }
        self
    }

    pub fn with_contact(mut self, attribute: &str, role: Role) -> Self {
        self.contacts.push((attribute.to_string(), role));
        self
    }

    pub fn with_date_format(mut self, tokens: &str) -> Result<Self> {
        self.date_format = DateFormat::parse(tokens)?;
        Ok(self)
    }

    fn translate<'a>(&'a self, name: &'a str) -> &'a str {
        self.translate.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Split raw lines into blocks. Comment lines are returned separately.
    pub fn split(&self, lines: &[String]) -> (Vec<Block>, Vec<String>) {
        let mut blocks = Vec::new();
        let mut disclaimer = Vec::new();
        let mut current: Option<Block> = None;
        let mut last_attr: Option<String> = None;

        for line in lines {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                blocks.extend(current.take());
                last_attr = None;
                continue;
            }

            if trimmed.starts_with('%') || trimmed.starts_with('#') {
                let text = trimmed.trim_start_matches(['%', '#']).trim();
                if !text.is_empty() {
                    disclaimer.push(text.to_string());
                }
                continue;
            }

            let continuation = line.starts_with(|c: char| c.is_whitespace() || c == '+');
            if continuation {
                if let (Some(block), Some(attr)) = (current.as_mut(), last_attr.as_deref()) {
                    let extra = trimmed.trim_start_matches('+').trim();
                    if !extra.is_empty() {
                        extend_last(&mut block.attributes, attr, extra);
                    }
                }
                continue;
            }

            let Some(caps) = ATTRIBUTE.captures(trimmed) else {
                continue;
            };
            let raw_name = caps[1].to_ascii_lowercase();
            let value = caps[2].trim().to_string();
            let name = self.translate(&raw_name).to_string();

            let block = current.get_or_insert_with(|| Block {
                kind: BlockKind::from_class(&raw_name),
                value: value.clone(),
                attributes: FieldMap::new(),
                handle: None,
            });
            if raw_name == "nic-hdl" && block.handle.is_none() {
                block.handle = Some(value.clone());
            }

            if !value.is_empty() {
                match block.attributes.get_mut(&name) {
                    Some(existing) => existing.push(value),
                    None => {
                        block.attributes.insert(name.clone(), Field::Text(value));
                    }
                }
            }
            last_attr = Some(name);
        }
        blocks.extend(current);

        (blocks, disclaimer)
    }

    /// Parse a response into role-keyed fields. `query_key` selects the
    /// block describing the queried object when several are present.
    pub fn parse(&self, lines: &[String], query_key: Option<&str>) -> FieldMap {
        let (blocks, disclaimer) = self.split(lines);
        let mut result = FieldMap::new();

        if !disclaimer.is_empty() {
            result.insert("disclaimer".to_string(), Field::List(disclaimer));
        }

        let index = index_blocks(blocks);
        let primary = query_key
            .and_then(|key| index.get(&key.to_ascii_uppercase()).or_else(|| index.get(key)))
            .or_else(|| index.get(MAIN_KEY))
            .or_else(|| index.values().find(|b| b.kind == BlockKind::AutNum));

        let Some(primary) = primary else {
            if !lines.is_empty() {
                result.insert("registered".to_string(), Field::text("no"));
            }
            return result;
        };

        let role = if primary.kind == BlockKind::AutNum {
            Role::As
        } else {
            Role::Network
        };

        let mut fields = primary.attributes.clone();
        for (attribute, contact_role) in &self.contacts {
            let Some(reference) = fields.remove(attribute) else {
                continue;
            };
            let Some(handle) = reference.values().first().map(|h| h.to_string()) else {
                continue;
            };
            let contact = match index.get(&handle) {
                Some(block) if block.kind == BlockKind::Contact => self.dated(&block.attributes),
                _ => FieldMap::from([("handle".to_string(), Field::Text(handle))]),
            };
            result.insert(contact_role.as_str().to_string(), Field::Map(contact));
        }

        if let Some(org) = fields.remove("org") {
            if let Some(handle) = org.values().first() {
                if let Some(block) = index.get(*handle) {
                    result.insert(
                        Role::Owner.as_str().to_string(),
                        Field::Map(self.dated(&block.attributes)),
                    );
                }
            }
        }

        if let Some(desc) = fields.remove("desc") {
            let mut desc_lines = desc.values().into_iter().map(str::to_string);
            let owner = child_map(&mut result, Role::Owner.as_str());
            if let Some(first) = desc_lines.next() {
                owner
                    .entry("organization".to_string())
                    .or_insert(Field::Text(first));
            }
            let address: Vec<String> = desc_lines.collect();
            if !address.is_empty() {
                owner.insert("address".to_string(), Field::List(address));
            }
        }

        result.insert(role.as_str().to_string(), Field::Map(self.dated(&fields)));
        result.insert("registered".to_string(), Field::text("yes"));
        result
    }

    fn dated(&self, attributes: &FieldMap) -> FieldMap {
        attributes
            .iter()
            .map(|(key, value)| {
                let value = if DATE_ATTRIBUTES.contains(&key.as_str()) {
                    match value {
                        Field::Text(v) => Field::Text(normalize_date(v, &self.date_format)),
                        Field::List(vs) => Field::List(
                            vs.iter()
                                .map(|v| normalize_date(v, &self.date_format))
                                .collect(),
                        ),
                        other => other.clone(),
                    }
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Key blocks for cross-reference. The first network block is `main`; for
/// any key the first block wins.
fn index_blocks(blocks: Vec<Block>) -> BTreeMap<String, Block> {
    let mut index = BTreeMap::new();
    for block in blocks {
        let key = if block.kind == BlockKind::Network && !index.contains_key(MAIN_KEY) {
            MAIN_KEY.to_string()
        } else {
            block.key()
        };
        index.entry(key).or_insert(block);
    }
    index
}

fn extend_last(attributes: &mut FieldMap, name: &str, extra: &str) {
    match attributes.get_mut(name) {
        Some(Field::Text(value)) => {
            value.push(' ');
            value.push_str(extra);
        }
        Some(Field::List(values)) => {
            if let Some(last) = values.last_mut() {
                last.push(' ');
                last.push_str(extra);
            }
        }
        _ => {
            attributes.insert(name.to_string(), Field::text(extra));
        }
    }
}
