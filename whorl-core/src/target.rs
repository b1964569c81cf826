//! Classification and normalization of lookup targets.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WhorlError};

/// What kind of object a resolution chain is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    #[serde(rename = "domain")]
    Domain,
    #[serde(rename = "ip")]
    Ip,
    #[serde(rename = "AS")]
    As,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Domain => "domain",
            TargetType::Ip => "ip",
            TargetType::As => "AS",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated lookup target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: TargetType,
    /// The text sent to the first authority.
    pub query: String,
    pub ip: Option<IpAddr>,
}

impl Target {
    /// Classify free-form input as an AS number, an IP address or a domain.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(WhorlError::InvalidQuery("empty query".to_string()));
        }

        if let Some(asn) = parse_asn(trimmed) {
            return Ok(Self {
                kind: TargetType::As,
                query: format!("AS{}", asn),
                ip: None,
            });
        }

        if let Ok(ip) = trimmed.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Ok(Self {
                kind: TargetType::Ip,
                query: ip.to_string(),
                ip: Some(ip),
            });
        }

        Ok(Self {
            kind: TargetType::Domain,
            query: normalize_domain(trimmed)?,
            ip: None,
        })
    }

    /// The key used against the server table: the TLD pseudo-names `ip` and
    /// `as` for numeric targets, the domain itself otherwise.
    pub fn table_key(&self) -> &str {
        match self.kind {
            TargetType::Ip => "ip",
            TargetType::As => "as",
            TargetType::Domain => &self.query,
        }
    }
}

fn parse_asn(input: &str) -> Option<u32> {
    let upper = input.to_ascii_uppercase();
    let digits = upper
        .strip_prefix("ASN")
        .or_else(|| upper.strip_prefix("AS"))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Normalize and validate a domain name
///
/// This function:
/// - Removes http:// and https:// prefixes
/// - Removes www. prefix
/// - Removes trailing slashes and paths
/// - Converts to lowercase
/// - Validates format (must contain dots, only alphanumeric/hyphens/dots)
pub fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().to_lowercase();

    let domain = domain
        .strip_prefix("http://")
        .or_else(|| domain.strip_prefix("https://"))
        .unwrap_or(&domain);

    let domain = domain.split('/').next().unwrap_or(domain);

    let domain = domain.strip_prefix("www.").unwrap_or(domain);

    if domain.is_empty() || !domain.contains('.') {
        return Err(WhorlError::InvalidQuery(domain.to_string()));
    }

    let valid = domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(WhorlError::InvalidQuery(domain.to_string()));
    }

    if domain.contains("..") || domain.starts_with('.') || domain.ends_with('.') {
        return Err(WhorlError::InvalidQuery(domain.to_string()));
    }

    for label in domain.split('.') {
        if label.starts_with('-') || label.ends_with('-') {
            return Err(WhorlError::InvalidQuery(domain.to_string()));
        }
    }

    Ok(domain.to_string())
}

/// Suffixes of a domain from the longest to the bare TLD, used for server
/// table lookups (`example.co.uk` → `co.uk`, `uk`).
pub fn domain_suffixes(domain: &str) -> Vec<&str> {
    domain
        .match_indices('.')
        .map(|(i, _)| &domain[i + 1..])
        .collect()
}
