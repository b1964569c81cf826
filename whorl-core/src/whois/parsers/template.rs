//! Marker-table parser for registries that print `Label: value` lines.

use once_cell::sync::Lazy;
use regex::Regex;

use super::tables::organization_registry;
use super::{ParsedHop, Referral, RegistryParser};
use crate::whois::descriptor::host_of;
use crate::whois::extract::Template;
use crate::whois::record::{lookup_text, Field, RegistryInfo};

/// Referral markers every template understands.
const DEFAULT_REFERRAL_MARKERS: &[&str] = &["Registrar WHOIS Server:", "Whois Server:", "ReferralServer:"];

static DEFAULT_REFERRAL_PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| DEFAULT_REFERRAL_MARKERS.iter().map(|m| referral_pattern(m)).collect());

fn referral_pattern(marker: &str) -> Regex {
    Regex::new(&format!(r"(?i)^\s*{}\s*(\S+)", regex::escape(marker)))
        .expect("Escaped referral marker is a valid regex")
}

/// Parser built from a [`Template`] plus registry metadata.
#[derive(Debug, Clone)]
pub struct TemplateParser {
    name: String,
    template: Template,
    referral_patterns: Vec<Regex>,
    unavailable_markers: Vec<String>,
    registrar: Option<String>,
    referrer: Option<String>,
    organization_dispatch: bool,
}

impl TemplateParser {
    pub fn new(name: impl Into<String>, template: Template) -> Self {
        Self {
            name: name.into(),
            template,
            referral_patterns: DEFAULT_REFERRAL_PATTERNS.clone(),
            unavailable_markers: Vec::new(),
            registrar: None,
            referrer: None,
            organization_dispatch: false,
        }
    }

    pub fn with_registrar(mut self, registrar: &str) -> Self {
        self.registrar = Some(registrar.to_string());
        self
    }

    pub fn with_referrer(mut self, referrer: &str) -> Self {
        self.referrer = Some(referrer.to_string());
        self
    }

    /// Lines containing any of these markers mean the object does not exist.
    pub fn with_unavailable_markers(mut self, markers: &[&str]) -> Self {
        self.unavailable_markers = markers.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Follow the owner organization to the regional registry that holds
    /// the real record.
    pub fn with_organization_dispatch(mut self) -> Self {
        self.organization_dispatch = true;
        self
    }

    fn referrals(&self, raw: &[String]) -> Vec<Referral> {
        let mut referrals: Vec<Referral> = Vec::new();
        for line in raw {
            for pattern in &self.referral_patterns {
                let Some(caps) = pattern.captures(line) else {
                    continue;
                };
                let server = caps[1].trim().to_string();
                if !host_of(&server).contains('.') {
                    continue;
                }
                if !referrals.iter().any(|r| r.server.eq_ignore_ascii_case(&server)) {
                    referrals.push(Referral::new(server));
                }
                break;
            }
        }
        referrals
    }
}

impl RegistryParser for TemplateParser {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, raw: &[String], _query: &str) -> ParsedHop {
        let mut registrant = self.template.parse(raw);

        let unavailable = raw.iter().any(|line| {
            self.unavailable_markers
                .iter()
                .any(|marker| line.contains(marker.as_str()))
        });
        if unavailable {
            registrant.insert("registered".to_string(), Field::text("no"));
        } else if !registrant.is_empty() {
            registrant.insert("registered".to_string(), Field::text("yes"));
        }

        let mut referrals = self.referrals(raw);
        if self.organization_dispatch {
            if let Some(server) = lookup_text(&registrant, &["owner", "organization"])
                .and_then(organization_registry)
            {
                referrals.push(Referral::new(server));
            }
        }

        let registrar = self
            .registrar
            .clone()
            .or_else(|| lookup_text(&registrant, &["registrar", "name"]).map(str::to_string));

        ParsedHop {
            registry: RegistryInfo {
                registrar,
                referrer: self.referrer.clone(),
                ..Default::default()
            },
            registrant,
            referrals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    fn parser() -> TemplateParser {
        let template = Template::new(
            &[
                ("Domain Name:", "domain.name"),
                ("Registrar:", "registrar.name"),
                ("OrgName:", "owner.organization"),
            ],
            "ymd",
        )
        .unwrap();
        TemplateParser::new("test", template).with_unavailable_markers(&["No match for"])
    }

    #[test]
    fn test_registrar_referral() {
        let hop = parser().parse(
            &lines("Domain Name: EXAMPLE.COM\n   Registrar WHOIS Server: whois.registrar.test\nRegistrar: Example Registrar"),
            "example.com",
        );
        assert_eq!(hop.referrals, vec![Referral::new("whois.registrar.test")]);
        assert_eq!(hop.registry.registrar.as_deref(), Some("Example Registrar"));
        assert_eq!(lookup_text(&hop.registrant, &["registered"]), Some("yes"));
    }

    #[test]
    fn test_arin_referral_server() {
        let hop = parser().parse(
            &lines("ReferralServer:  rwhois://rwhois.example.net:4321\nReferralServer: whois://whois.ripe.net"),
            "192.0.2.1",
        );
        assert_eq!(
            hop.referrals,
            vec![
                Referral::new("rwhois://rwhois.example.net:4321"),
                Referral::new("whois://whois.ripe.net"),
            ]
        );
    }

    #[test]
    fn test_empty_referral_is_ignored() {
        let hop = parser().parse(&lines("Registrar WHOIS Server:\nWhois Server: none"), "x.com");
        assert!(hop.referrals.is_empty());
    }

    #[test]
    fn test_organization_dispatch() {
        let hop = parser()
            .with_organization_dispatch()
            .parse(&lines("OrgName: African Network Information Center"), "196.0.0.1");
        assert_eq!(hop.referrals, vec![Referral::new("whois.afrinic.net")]);
    }

    #[test]
    fn test_unavailable() {
        let hop = parser().parse(&lines("No match for \"NOPE.COM\"."), "nope.com");
        assert_eq!(lookup_text(&hop.registrant, &["registered"]), Some("no"));
        assert!(hop.referrals.is_empty());
    }
}
