//! Flat "marker → field path" extraction.
//!
//! Each raw line is matched against an ordered marker table; the first
//! marker contained in the line wins and the text after it lands at the
//! entry's field path. Repeated paths with nothing after the marker (a
//! `Name Server:` heading followed by one host per line) and bare-role
//! paths (contact sections) consume the lines that follow.

use once_cell::sync::Lazy;
use regex::Regex;

use super::dates::{normalize_date, DateFormat};
use super::path::{FieldPath, LeafPath};
use crate::error::Result;
use crate::whois::record::{Field, FieldMap};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("Invalid email regex")
});

static HANDLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([A-Za-z0-9_\-]+)\)\s*$").expect("Invalid handle regex"));

static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ().\-]{5,}[0-9]$").expect("Invalid phone regex"));

#[derive(Debug, Clone)]
struct TemplateEntry {
    marker: String,
    path: FieldPath,
}

/// A validated marker table.
#[derive(Debug, Clone)]
pub struct Template {
    entries: Vec<TemplateEntry>,
    date_format: DateFormat,
    contact_extras: Vec<(String, LeafPath)>,
}

impl Template {
    /// Build a template from `(marker, path)` pairs and a date token string.
    /// Fails with [`crate::WhorlError::InvalidFieldPath`] on a bad path.
    pub fn new(entries: &[(&str, &str)], date_format: &str) -> Result<Self> {
        let entries = entries
            .iter()
            .map(|(marker, path)| {
                Ok(TemplateEntry {
                    marker: (*marker).to_string(),
                    path: FieldPath::parse(path)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            entries,
            date_format: DateFormat::parse(date_format)?,
            contact_extras: Vec::new(),
        })
    }

    /// Markers recognised inside contact sections, e.g. `("tel:", "phone")`.
    pub fn with_contact_extras(mut self, extras: &[(&str, &str)]) -> Result<Self> {
        for (marker, leaf) in extras {
            self.contact_extras
                .push(((*marker).to_string(), LeafPath::parse(leaf)?));
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn match_line<'a>(&self, line: &'a str) -> Option<(&TemplateEntry, &'a str)> {
        self.entries.iter().find_map(|entry| {
            line.find(&entry.marker)
                .map(|pos| (entry, line[pos + entry.marker.len()..].trim()))
        })
    }

    pub fn parse(&self, lines: &[String]) -> FieldMap {
        let mut result = FieldMap::new();
        let mut i = 0;

        while i < lines.len() {
            let line = &lines[i];
            i += 1;

            let Some((entry, value)) = self.match_line(line) else {
                continue;
            };

            if entry.path.is_section() {
                let mut section: Vec<&str> = Vec::new();
                if !value.is_empty() {
                    section.push(value);
                }
                while i < lines.len() {
                    let next = lines[i].trim();
                    if next.is_empty() || self.match_line(&lines[i]).is_some() {
                        break;
                    }
                    section.push(next);
                    i += 1;
                }
                let contact = self.parse_contact(&section);
                if !contact.is_empty() {
                    let role = entry.path.role.as_str().to_string();
                    let merged = match result.remove(&role) {
                        Some(Field::Map(existing)) => crate::whois::merge::merge(existing, contact),
                        _ => contact,
                    };
                    result.insert(role, Field::Map(merged));
                }
                continue;
            }

            if entry.path.is_repeated() && value.is_empty() {
                while i < lines.len() {
                    let next = lines[i].trim();
                    if next.is_empty() || next.contains(": ") || self.match_line(&lines[i]).is_some()
                    {
                        break;
                    }
                    entry.path.assign(&mut result, next.to_string());
                    i += 1;
                }
                continue;
            }

            let value = if entry.path.is_date() {
                normalize_date(value, &self.date_format)
            } else {
                value.to_string()
            };
            entry.path.assign(&mut result, value);
        }

        result
    }

    fn parse_contact(&self, lines: &[&str]) -> FieldMap {
        let mut contact = FieldMap::new();
        let mut rest: Vec<String> = Vec::new();

        'lines: for line in lines {
            for (marker, leaf) in &self.contact_extras {
                if let Some(pos) = line.find(marker.as_str()) {
                    leaf.assign(&mut contact, line[pos + marker.len()..].trim().to_string());
                    continue 'lines;
                }
            }

            if let Some(m) = EMAIL.find(line) {
                contact.insert("email".to_string(), Field::text(m.as_str()));
                let remainder = format!("{}{}", &line[..m.start()], &line[m.end()..]);
                push_non_empty(&mut rest, &remainder);
                continue;
            }

            if let Some(caps) = HANDLE.captures(line) {
                contact.insert("handle".to_string(), Field::text(&caps[1]));
                if let Some(m) = caps.get(0) {
                    push_non_empty(&mut rest, &line[..m.start()]);
                }
                continue;
            }

            if PHONE.is_match(line) && !contact.contains_key("phone") {
                contact.insert("phone".to_string(), Field::text(*line));
                continue;
            }

            push_non_empty(&mut rest, line);
        }

        let mut rest = rest.into_iter();
        if let Some(name) = rest.next() {
            contact
                .entry("name".to_string())
                .or_insert_with(|| Field::Text(name));
        }
        let address: Vec<String> = rest.collect();
        if !address.is_empty() {
            contact.insert("address".to_string(), Field::List(address));
        }

        contact
    }
}

fn push_non_empty(rest: &mut Vec<String>, text: &str) {
    let text = text.trim().trim_end_matches(',').trim();
    if !text.is_empty() {
        rest.push(text.to_string());
    }
}
