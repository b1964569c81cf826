//! Typed field paths used by the extraction templates.
//!
//! A path is written `role.leaf[.leaf…]` in handler tables. A trailing `.`
//! marks a repeated field and a bare role opens a contact section. Paths
//! are checked once, when a table is built, so a typo in a table surfaces
//! as [`WhorlError::InvalidFieldPath`] instead of silently misplaced data.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WhorlError};
use crate::whois::record::{Field, FieldMap};

const SEPARATOR: char = '.';

/// Leaf keys that carry dates and get normalized.
const DATE_LEAVES: &[&str] = &["created", "expires", "changed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Owner,
    Admin,
    Tech,
    Billing,
    Zone,
    Abuse,
    Domain,
    Network,
    As,
    Registrar,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Tech => "tech",
            Role::Billing => "billing",
            Role::Zone => "zone",
            Role::Abuse => "abuse",
            Role::Domain => "domain",
            Role::Network => "network",
            Role::As => "AS",
            Role::Registrar => "registrar",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WhorlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "tech" => Ok(Role::Tech),
            "billing" => Ok(Role::Billing),
            "zone" => Ok(Role::Zone),
            "abuse" => Ok(Role::Abuse),
            "domain" => Ok(Role::Domain),
            "network" => Ok(Role::Network),
            "as" => Ok(Role::As),
            "registrar" => Ok(Role::Registrar),
            _ => Err(WhorlError::InvalidFieldPath(format!("unknown role `{}`", s))),
        }
    }
}

/// The part of a path below the role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPath {
    segments: Vec<String>,
    repeated: bool,
}

impl LeafPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let repeated = raw.ends_with(SEPARATOR);
        let body = raw.strip_suffix(SEPARATOR).unwrap_or(raw);
        if body.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
                repeated,
            });
        }

        let segments = body
            .split(SEPARATOR)
            .map(|segment| {
                let valid = !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
                if valid {
                    Ok(segment.to_string())
                } else {
                    Err(WhorlError::InvalidFieldPath(raw.to_string()))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { segments, repeated })
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    pub fn is_date(&self) -> bool {
        self.segments
            .last()
            .is_some_and(|leaf| DATE_LEAVES.contains(&leaf.as_str()))
    }

    /// Store `value` at this path inside `map`. Repeated paths accumulate;
    /// plain paths keep the latest non-empty value.
    pub fn assign(&self, map: &mut FieldMap, value: String) {
        let Some((last, parents)) = self.segments.split_last() else {
            return;
        };
        if value.is_empty() {
            return;
        }

        let mut current = map;
        for segment in parents {
            current = child_map(current, segment);
        }

        if self.repeated {
            let accumulating = current
                .get(last)
                .is_some_and(|field| !matches!(field, Field::Map(_)));
            if accumulating {
                if let Some(existing) = current.get_mut(last) {
                    existing.push(value);
                }
            } else {
                current.insert(last.clone(), Field::List(vec![value]));
            }
        } else {
            current.insert(last.clone(), Field::Text(value));
        }
    }
}

/// A complete path: role plus leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub role: Role,
    pub leaf: LeafPath,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let (role, rest) = match raw.split_once(SEPARATOR) {
            Some((role, rest)) => (role, rest),
            None => (raw, ""),
        };
        let role = role.parse::<Role>()?;
        let leaf = LeafPath::parse(rest)?;
        Ok(Self { role, leaf })
    }

    /// A bare role introduces a multi-line contact section.
    pub fn is_section(&self) -> bool {
        self.leaf.is_empty()
    }

    pub fn is_repeated(&self) -> bool {
        self.leaf.is_repeated()
    }

    pub fn is_date(&self) -> bool {
        self.leaf.is_date()
    }

    pub fn assign(&self, map: &mut FieldMap, value: String) {
        let role_map = child_map(map, self.role.as_str());
        self.leaf.assign(role_map, value);
    }
}

/// The nested map under `key`, replacing any non-map value.
pub fn child_map<'a>(map: &'a mut FieldMap, key: &str) -> &'a mut FieldMap {
    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Field::Map(FieldMap::new()));
    if !matches!(entry, Field::Map(_)) {
        *entry = Field::Map(FieldMap::new());
    }
    match entry {
        Field::Map(inner) => inner,
        _ => unreachable!("entry was just replaced by a map"),
    }
}
