//! Built-in handler tables and referral dispatch maps.

use std::sync::Arc;

use super::{RegistryParser, RpslParser, TemplateParser};
use crate::error::Result;
use crate::whois::extract::{BlockTemplate, Role, Template};

/// Handler used when nothing more specific is known.
pub const DEFAULT_HANDLER: &str = "standard";

/// Answering host → handler name.
pub const HOST_HANDLERS: &[(&str, &str)] = &[
    ("whois.arin.net", "arin"),
    ("whois.ripe.net", "ripe"),
    ("whois.apnic.net", "apnic"),
    ("whois.lacnic.net", "lacnic"),
    ("whois.afrinic.net", "afrinic"),
    ("whois.krnic.net", "krnic"),
    ("whois.kisa.or.kr", "krnic"),
    ("whois.nic.at", "ripe"),
    ("whois.denic.de", "denic"),
    ("whois.nic.uk", "nominet"),
    ("whois.jprs.jp", "jp"),
    ("whois.afilias.net", "info"),
    ("whois.biz", "biz"),
    ("whois.networksolutions.com", "networksolutions"),
    ("whois.corporatedomains.com", "corporatedomains"),
    ("whois.onlinenic.com", "onlinenic"),
];

/// Owner names in ARIN listings that hand the block to another registry.
const LISTING_OWNERS: &[(&str, &str)] = &[
    ("European Regional Internet Registry/RIPE NCC", "whois.ripe.net"),
    ("RIPE Network Coordination Centre", "whois.ripe.net"),
    ("Asia Pacific Network Information Center", "whois.apnic.net"),
    ("Asia Pacific Network Information Centre", "whois.apnic.net"),
    ("Latin American and Caribbean IP address Regional Registry", "whois.lacnic.net"),
    ("African Network Information Center", "whois.afrinic.net"),
];

/// Owner organizations of parsed records that delegate to another registry.
const ORGANIZATION_DISPATCH: &[(&str, &str)] = &[
    ("KRNIC", "whois.krnic.net"),
    ("African Network Information Center", "whois.afrinic.net"),
];

fn normalize_owner(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Registry server for an ARIN listing owner. Only a present, non-empty
/// mapping counts.
pub fn owner_registry(owner: &str) -> Option<&'static str> {
    let owner = normalize_owner(owner);
    LISTING_OWNERS
        .iter()
        .find(|(name, _)| owner.eq_ignore_ascii_case(name))
        .map(|(_, server)| *server)
        .filter(|server| !server.trim().is_empty())
}

/// Registry server for a record whose owner organization is itself a
/// registry.
pub fn organization_registry(organization: &str) -> Option<&'static str> {
    let organization = normalize_owner(organization);
    ORGANIZATION_DISPATCH
        .iter()
        .find(|(name, _)| organization.eq_ignore_ascii_case(name))
        .map(|(_, server)| *server)
}

fn contact_fields(prefix: &str, role: &str) -> Vec<(String, String)> {
    [
        ("Name:", "name"),
        ("Organization:", "organization"),
        ("Street:", "address.street."),
        ("City:", "address.city"),
        ("State/Province:", "address.state"),
        ("Postal Code:", "address.pcode"),
        ("Country:", "address.country"),
        ("Phone:", "phone"),
        ("Fax:", "fax"),
        ("Email:", "email"),
    ]
    .iter()
    .map(|(label, leaf)| (format!("{} {}", prefix, label), format!("{}.{}", role, leaf)))
    .collect()
}

fn standard_template() -> Result<Template> {
    let mut entries: Vec<(String, String)> = [
        ("Domain Name:", "domain.name"),
        ("Registry Domain ID:", "domain.handle"),
        ("Registrar WHOIS Server:", "domain.whois"),
        ("Registrar URL:", "registrar.url"),
        ("Updated Date:", "domain.changed"),
        ("Creation Date:", "domain.created"),
        ("Registry Expiry Date:", "domain.expires"),
        ("Registrar Registration Expiration Date:", "domain.expires"),
        ("Registrar IANA ID:", "registrar.iana_id"),
        ("Registrar Abuse Contact Email:", "abuse.email"),
        ("Registrar Abuse Contact Phone:", "abuse.phone"),
        ("Registrar:", "registrar.name"),
        ("Sponsoring Registrar:", "registrar.name"),
        ("Domain Status:", "domain.status."),
        ("Name Server:", "domain.nserver."),
        ("DNSSEC:", "domain.dnssec"),
    ]
    .iter()
    .map(|(m, p)| (m.to_string(), p.to_string()))
    .collect();
    entries.extend(contact_fields("Registrant", "owner"));
    entries.extend(contact_fields("Admin", "admin"));
    entries.extend(contact_fields("Tech", "tech"));
    entries.extend(contact_fields("Billing", "billing"));

    let borrowed: Vec<(&str, &str)> = entries
        .iter()
        .map(|(m, p)| (m.as_str(), p.as_str()))
        .collect();
    Template::new(&borrowed, "ymd")
}

fn standard(name: &str) -> Result<TemplateParser> {
    Ok(TemplateParser::new(name, standard_template()?).with_unavailable_markers(&[
        "No match for",
        "NOT FOUND",
        "No Data Found",
        "Domain not found",
    ]))
}

fn arin() -> Result<TemplateParser> {
    let template = Template::new(
        &[
            ("NetRange:", "network.inetnum"),
            ("CIDR:", "network.cidr"),
            ("NetName:", "network.name"),
            ("NetHandle:", "network.handle"),
            ("NetType:", "network.status"),
            ("OriginAS:", "network.origin"),
            ("ASNumber:", "network.inetnum"),
            ("ASName:", "network.name"),
            ("ASHandle:", "network.handle"),
            ("RegDate:", "network.created"),
            ("Updated:", "network.changed"),
            ("OrgName:", "owner.organization"),
            ("Organization:", "owner.organization"),
            ("OrgId:", "owner.handle"),
            ("Address:", "owner.address.street."),
            ("City:", "owner.address.city"),
            ("StateProv:", "owner.address.state"),
            ("PostalCode:", "owner.address.pcode"),
            ("Country:", "owner.address.country"),
            ("OrgAbuseHandle:", "abuse.handle"),
            ("OrgAbuseName:", "abuse.name"),
            ("OrgAbusePhone:", "abuse.phone"),
            ("OrgAbuseEmail:", "abuse.email"),
            ("OrgTechHandle:", "tech.handle"),
            ("OrgTechName:", "tech.name"),
            ("OrgTechPhone:", "tech.phone"),
            ("OrgTechEmail:", "tech.email"),
        ],
        "ymd",
    )?;
    Ok(TemplateParser::new("arin", template)
        .with_registrar("American Registry for Internet Numbers (ARIN)")
        .with_referrer("https://www.arin.net")
        .with_unavailable_markers(&["No match found for"])
        .with_organization_dispatch())
}

/// Registrar dialect with free-form contact sections.
fn sectioned(
    name: &str,
    entries: &[(&str, &str)],
    date_format: &str,
    extras: &[(&str, &str)],
) -> Result<TemplateParser> {
    let template = Template::new(entries, date_format)?.with_contact_extras(extras)?;
    Ok(TemplateParser::new(name, template))
}

fn rpsl(name: &str, registrar: &str, referrer: &str, blocks: BlockTemplate) -> RpslParser {
    RpslParser::new(name, blocks)
        .with_registrar(registrar)
        .with_referrer(referrer)
}

pub(super) fn builtin_parsers() -> Result<Vec<Arc<dyn RegistryParser>>> {
    let parsers: Vec<Arc<dyn RegistryParser>> = vec![
        Arc::new(standard(DEFAULT_HANDLER)?),
        Arc::new(arin()?),
        Arc::new(
            standard("info")?
                .with_registrar("Afilias Global Registry Services")
                .with_referrer("http://whois.afilias.info"),
        ),
        Arc::new(TemplateParser::new(
            "biz",
            Template::new(
                &[
                    ("Domain Name:", "domain.name"),
                    ("Sponsoring Registrar:", "registrar.name"),
                    ("Registrar:", "registrar.name"),
                    ("Name Server:", "domain.nserver."),
                    ("Domain Status:", "domain.status."),
                    ("Domain Registration Date:", "domain.created"),
                    ("Domain Expiration Date:", "domain.expires"),
                    ("Domain Last Updated Date:", "domain.changed"),
                    ("Creation Date:", "domain.created"),
                    ("Registry Expiry Date:", "domain.expires"),
                    ("Updated Date:", "domain.changed"),
                    ("Registrant Name:", "owner.name"),
                    ("Registrant Organization:", "owner.organization"),
                    ("Registrant Email:", "owner.email"),
                ],
                "-md--y",
            )?,
        )
        .with_registrar("NEULEVEL")
        .with_referrer("http://www.neulevel.biz")),
        Arc::new(
            TemplateParser::new(
                "jp",
                Template::new(
                    &[
                        ("[Domain Name]", "domain.name"),
                        ("[State]", "domain.status"),
                        ("[Status]", "domain.status"),
                        ("[Registered Date]", "domain.created"),
                        ("[Created on]", "domain.created"),
                        ("[Expires on]", "domain.expires"),
                        ("[Last Updated]", "domain.changed"),
                        ("[Last Update]", "domain.changed"),
                        ("[Organization]", "owner.organization"),
                        ("[Registrant]", "owner.name"),
                        ("[Name]", "owner.name"),
                        ("[Email]", "owner.email"),
                        ("[Postal code]", "owner.address.pcode"),
                        ("[Postal Address]", "owner.address.street."),
                        ("[Phone]", "owner.phone"),
                        ("[Fax]", "owner.fax"),
                        ("[Administrative Contact]", "admin.handle"),
                        ("[Technical Contact]", "tech.handle"),
                        ("[Name Server]", "domain.nserver."),
                    ],
                    "ymd",
                )?,
            )
            .with_registrar("Japan Registry Services")
            .with_referrer("http://www.jprs.jp"),
        ),
        Arc::new(
            TemplateParser::new(
                "denic",
                Template::new(
                    &[
                        ("Domain:", "domain.name"),
                        ("Nserver:", "domain.nserver."),
                        ("Status:", "domain.status"),
                        ("Changed:", "domain.changed"),
                        ("Dnskey:", "domain.dnskey."),
                    ],
                    "ymd",
                )?,
            )
            .with_registrar("DENIC eG")
            .with_referrer("https://www.denic.de")
            .with_unavailable_markers(&["Status: free"]),
        ),
        Arc::new(
            sectioned(
                "nominet",
                &[
                    ("Domain name:", "domain.name"),
                    ("Registrant:", "owner"),
                    ("Registrar:", "registrar"),
                    ("Registered on:", "domain.created"),
                    ("Expiry date:", "domain.expires"),
                    ("Last updated:", "domain.changed"),
                    ("Name servers:", "domain.nserver."),
                ],
                "dmy",
                &[("URL:", "url")],
            )?
            .with_registrar("Nominet UK")
            .with_referrer("https://www.nominet.uk")
            .with_unavailable_markers(&["No match for"]),
        ),
        Arc::new(sectioned(
            "assorted",
            &[
                ("Registrant:", "owner"),
                ("Administrative Contact:", "admin"),
                ("Technical Contact:", "tech"),
                ("Domain Name:", "domain.name"),
                ("Domain servers in listed order:", "domain.nserver."),
                ("Record created on", "domain.created"),
                ("Record expires on", "domain.expires"),
                ("Record last updated", "domain.changed"),
            ],
            "ymd",
            &[],
        )?),
        Arc::new(sectioned(
            "networksolutions",
            &[
                ("Registrant:", "owner"),
                ("Administrative Contact", "admin"),
                ("Technical Contact", "tech"),
                ("Domain Name:", "domain.name"),
                ("Domain servers in listed order:", "domain.nserver."),
                ("Record created on", "domain.created"),
                ("Record expires on", "domain.expires"),
            ],
            "dmy",
            &[],
        )?),
        Arc::new(sectioned(
            "corporatedomains",
            &[
                ("Registrant:", "owner"),
                ("Administrative Contact", "admin"),
                ("Technical Contact", "tech"),
                ("Zone Contact", "zone"),
                ("Domain Name:", "domain.name"),
                ("Last updated on", "domain.changed"),
                ("Domain created on", "domain.created"),
                ("Domain expires on", "domain.expires"),
                ("Registrar Name....:", "domain.sponsor"),
                ("DNS Servers:", "domain.nserver."),
            ],
            "dmy",
            &[],
        )?),
        Arc::new(sectioned(
            "onlinenic",
            &[
                ("Registrant:", "owner"),
                ("Administrator:", "admin"),
                ("Technical Contactor:", "tech"),
                ("Billing Contactor:", "billing"),
                ("Domain name:", "domain.name"),
                ("Domain Name:", "domain.name"),
                ("Domain servers in listed order:", "domain.nserver."),
                ("Record created on ", "domain.created"),
                ("Record expired on ", "domain.expires"),
                ("Record last updated at ", "domain.changed"),
            ],
            "mdy",
            &[
                ("tel--", "phone"),
                ("tel:", "phone"),
                ("email:", "email"),
                ("org:", "organization"),
                ("zipcode:", "address.pcode"),
                ("postcode:", "address.pcode"),
                ("address:", "address.street"),
                ("city:", "address.city"),
                (",country:", "address.country"),
            ],
        )?),
        Arc::new(rpsl(
            "ripe",
            "RIPE Network Coordination Centre",
            "https://www.ripe.net",
            BlockTemplate::new(),
        )),
        Arc::new(rpsl(
            "apnic",
            "Asia Pacific Network Information Centre",
            "https://www.apnic.net",
            BlockTemplate::new().with_contact("mnt-irt", Role::Abuse),
        )),
        Arc::new(rpsl(
            "afrinic",
            "African Network Information Center",
            "https://www.afrinic.net",
            BlockTemplate::new(),
        )),
        Arc::new(rpsl(
            "lacnic",
            "Latin American and Caribbean IP address Regional Registry",
            "https://www.lacnic.net",
            BlockTemplate::new()
                .with_translations(&[("owner", "desc"), ("ownerid", "handle")])
                .with_contact("owner-c", Role::Owner),
        )),
        Arc::new(rpsl(
            "krnic",
            "Korea Internet & Security Agency",
            "https://www.kisa.or.kr",
            BlockTemplate::new(),
        )),
    ];
    Ok(parsers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whois::record::lookup_text;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_owner_registry() {
        assert_eq!(owner_registry("RIPE Network Coordination Centre"), Some("whois.ripe.net"));
        assert_eq!(
            owner_registry("Asia Pacific Network Information\tCenter"),
            Some("whois.apnic.net")
        );
        assert_eq!(owner_registry("Example Org"), None);
    }

    #[test]
    fn test_standard_gtld_record() {
        let parser = standard(DEFAULT_HANDLER).unwrap();
        let hop = parser.parse(
            &lines(
                "Domain Name: EXAMPLE.COM\n\
                 Registrar: Example Registrar, Inc.\n\
                 Creation Date: 1995-08-14T04:00:00Z\n\
                 Registrant Name: Jane Example\n\
                 Registrant Street: 1 Main St\n\
                 Registrant Street: Suite 2\n\
                 Admin Email: admin@example.com\n\
                 Name Server: NS1.EXAMPLE.COM",
            ),
            "example.com",
        );
        let info = &hop.registrant;
        assert_eq!(lookup_text(info, &["registrar", "name"]), Some("Example Registrar, Inc."));
        assert_eq!(lookup_text(info, &["owner", "name"]), Some("Jane Example"));
        assert_eq!(lookup_text(info, &["admin", "email"]), Some("admin@example.com"));
        assert_eq!(lookup_text(info, &["domain", "created"]), Some("1995-08-14"));
        assert_eq!(hop.registry.registrar.as_deref(), Some("Example Registrar, Inc."));
    }

    #[test]
    fn test_biz_dates() {
        let parsers = builtin_parsers().unwrap();
        let biz = parsers.iter().find(|p| p.name() == "biz").unwrap();
        let hop = biz.parse(
            &lines("Domain Registration Date: Wed Mar 27 00:01:00 GMT 2002"),
            "example.biz",
        );
        assert_eq!(lookup_text(&hop.registrant, &["domain", "created"]), Some("2002-03-27"));
    }
}
