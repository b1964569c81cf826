//! Date normalization for extracted fields.
//!
//! Registries print dates in every order imaginable. Each handler declares
//! the component order of its dates as a token string: `y`, `m`, `d` consume
//! one component each and `-` skips one (`"-md--y"` reads
//! `Wed Mar 27 00:01:00 GMT 2002`). Unambiguous ISO-style values are
//! accepted whatever the declared order.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, WhorlError};

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})(?:[T ].*)?$").expect("Invalid ISO date regex")
});

static COMPACT_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("Invalid compact date regex"));

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Year,
    Month,
    Day,
    Skip,
}

/// A declared component order, e.g. `ymd`, `dmy`, `-md--y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    components: Vec<Component>,
}

impl DateFormat {
    pub fn parse(tokens: &str) -> Result<Self> {
        let components = tokens
            .chars()
            .map(|c| match c.to_ascii_lowercase() {
                'y' => Ok(Component::Year),
                'm' => Ok(Component::Month),
                'd' => Ok(Component::Day),
                '-' => Ok(Component::Skip),
                other => Err(WhorlError::InvalidFieldPath(format!(
                    "date format `{}` has unknown token `{}`",
                    tokens, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        for required in [Component::Year, Component::Month, Component::Day] {
            if components.iter().filter(|c| **c == required).count() != 1 {
                return Err(WhorlError::InvalidFieldPath(format!(
                    "date format `{}` must name year, month and day exactly once",
                    tokens
                )));
            }
        }

        Ok(Self { components })
    }

    pub fn ymd() -> Self {
        Self {
            components: vec![Component::Year, Component::Month, Component::Day],
        }
    }

    fn apply(&self, value: &str) -> Option<NaiveDate> {
        let parts: Vec<&str> = value
            .split(|c: char| c.is_whitespace() || matches!(c, '-' | '/' | '.' | ','))
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < self.components.len() {
            return None;
        }

        let (mut year, mut month, mut day) = (None, None, None);
        for (component, part) in self.components.iter().zip(&parts) {
            match component {
                Component::Year => year = parse_year(part),
                Component::Month => month = parse_month(part),
                Component::Day => day = parse_day(part),
                Component::Skip => {}
            }
        }

        NaiveDate::from_ymd_opt(year?, month?, day?)
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        Self::ymd()
    }
}

/// Normalize a date value to `YYYY-MM-DD`, or return the trimmed original
/// when it cannot be read.
pub fn normalize_date(value: &str, format: &DateFormat) -> String {
    let trimmed = value.trim();
    parse_date(trimmed, format)
        .or_else(|| {
            // RPSL `changed:` lines carry an e-mail before the date
            let last = trimmed.split_whitespace().last()?;
            (last != trimmed).then(|| parse_date(last, format)).flatten()
        })
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn parse_date(value: &str, format: &DateFormat) -> Option<NaiveDate> {
    if let Some(caps) = ISO_DATE.captures(value).or_else(|| COMPACT_DATE.captures(value)) {
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    for fmt in ["%d-%b-%Y", "%d-%B-%Y", "%b %d %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }

    format.apply(value)
}

fn parse_year(part: &str) -> Option<i32> {
    let digits: String = part.chars().filter(|c| c.is_ascii_digit()).collect();
    let year: i32 = digits.parse().ok()?;
    match digits.len() {
        4 => Some(year),
        2 if year < 70 => Some(2000 + year),
        2 => Some(1900 + year),
        _ => None,
    }
}

fn parse_month(part: &str) -> Option<u32> {
    if let Ok(month) = part.parse::<u32>() {
        return (1..=12).contains(&month).then_some(month);
    }
    let lower = part.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

fn parse_day(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    let day: u32 = digits.parse().ok()?;
    (1..=31).contains(&day).then_some(day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(value: &str, format: &str) -> String {
        normalize_date(value, &DateFormat::parse(format).unwrap())
    }

    #[test]
    fn test_iso_values_ignore_declared_order() {
        assert_eq!(norm("2020-01-15T00:00:00Z", "dmy"), "2020-01-15");
        assert_eq!(norm("2020-01-15", "mdy"), "2020-01-15");
        assert_eq!(norm("20100125", "ymd"), "2010-01-25");
    }

    #[test]
    fn test_declared_orders() {
        assert_eq!(norm("15-Jan-2020", "dmy"), "2020-01-15");
        assert_eq!(norm("01/15/2020", "mdy"), "2020-01-15");
        assert_eq!(norm("15.01.20", "dmy"), "2020-01-15");
        assert_eq!(norm("Wed Mar 27 00:01:00 GMT 2002", "-md--y"), "2002-03-27");
    }

    #[test]
    fn test_rpsl_changed_line() {
        assert_eq!(norm("hostmaster@apnic.net 20100125", "ymd"), "2010-01-25");
    }

    #[test]
    fn test_unparseable_dates_keep_original_text() {
        assert_eq!(norm("  before 1995  ", "ymd"), "before 1995");
        assert_eq!(norm("2020-13-45", "ymd"), "2020-13-45");
    }

    #[test]
    fn test_invalid_format_tokens() {
        assert!(DateFormat::parse("ymx").is_err());
        assert!(DateFormat::parse("yy").is_err());
    }
}
