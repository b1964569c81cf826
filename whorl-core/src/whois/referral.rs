//! ARIN network listings.
//!
//! When an address falls inside several allocations, ARIN answers with one
//! summary line per block instead of a record:
//!
//! ```text
//! Example Org (NET-10-0-0-0-1) 10.0.0.0 - 10.255.255.255
//! ```
//!
//! Each block containing the queried address is fetched separately with
//! `n <handle>`.

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;

static LISTING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)\s*\(((?:NETBLK|NET6?)-[A-Za-z0-9\-]+)\)\s*([0-9A-Fa-f:.]+)\s*-\s*([0-9A-Fa-f:.]+)")
        .expect("Invalid listing regex")
});

/// Banner line that looks like a listing but is not one.
const ARIN_BANNER: &str = "American Registry for Internet Numbers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub owner: String,
    pub handle: String,
    pub low: IpAddr,
    pub high: IpAddr,
}

impl ListingEntry {
    /// True when `ip` lies in `low..=high` of the same address family.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (numeric(&self.low), numeric(&self.high), numeric(ip)) {
            (Some((family_low, low)), Some((family_high, high)), Some((family, value))) => {
                family_low == family && family_high == family && low <= value && value <= high
            }
            _ => false,
        }
    }
}

fn numeric(ip: &IpAddr) -> Option<(u8, u128)> {
    match ip {
        IpAddr::V4(v4) => Some((4, u32::from(*v4) as u128)),
        IpAddr::V6(v6) => Some((6, u128::from(*v6))),
    }
}

/// Every listing line in a response, in order.
pub fn parse_listing(lines: &[String]) -> Vec<ListingEntry> {
    lines
        .iter()
        .filter(|line| !line.starts_with(ARIN_BANNER))
        .filter_map(|line| {
            let caps = LISTING_LINE.captures(line.trim())?;
            Some(ListingEntry {
                owner: caps[1].trim().to_string(),
                handle: caps[2].to_string(),
                low: caps[3].parse().ok()?,
                high: caps[4].parse().ok()?,
            })
        })
        .collect()
}
