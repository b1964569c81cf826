//! Parser for RPSL-speaking regional registries (RIPE, APNIC, AFRINIC,
//! LACNIC and friends).

use super::tables::organization_registry;
use super::{ParsedHop, Referral, RegistryParser};
use crate::whois::extract::BlockTemplate;
use crate::whois::record::{lookup_text, RegistryInfo};

#[derive(Debug, Clone)]
pub struct RpslParser {
    name: String,
    blocks: BlockTemplate,
    registrar: Option<String>,
    referrer: Option<String>,
}

impl RpslParser {
    pub fn new(name: impl Into<String>, blocks: BlockTemplate) -> Self {
        Self {
            name: name.into(),
            blocks,
            registrar: None,
            referrer: None,
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
}

impl RegistryParser for RpslParser {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, raw: &[String], query: &str) -> ParsedHop {
        let registrant = self.blocks.parse(raw, Some(query));

        // blocks delegated to another registry name it as the owner
        let referrals = lookup_text(&registrant, &["owner", "organization"])
            .and_then(organization_registry)
            .map(Referral::new)
            .into_iter()
            .collect();

        ParsedHop {
            registry: RegistryInfo {
                registrar: self.registrar.clone(),
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

    #[test]
    fn test_delegated_block_refers_onwards() {
        let parser = RpslParser::new("apnic", BlockTemplate::new());
        let hop = parser.parse(
            &lines("inetnum: 211.32.0.0 - 211.63.255.255\nnetname: KRNIC-KR\ndescr: KRNIC\ndescr: Seoul"),
            "211.32.1.1",
        );
        assert_eq!(hop.referrals, vec![Referral::new("whois.krnic.net")]);
        assert_eq!(lookup_text(&hop.registrant, &["network", "name"]), Some("KRNIC-KR"));
    }

    #[test]
    fn test_plain_block_has_no_referrals() {
        let parser = RpslParser::new("ripe", BlockTemplate::new()).with_registrar("RIPE NCC");
        let hop = parser.parse(&lines("inetnum: 193.0.0.0 - 193.0.7.255\nnetname: RIPE-NCC"), "193.0.0.1");
        assert!(hop.referrals.is_empty());
        assert_eq!(hop.registry.registrar.as_deref(), Some("RIPE NCC"));
    }
}
