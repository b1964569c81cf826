//! Default TLD → authority table.
//!
//! Entries use the same `host[:port][?args]` syntax as referrals. The
//! pseudo-keys `ip` and `as` route address and AS-number queries.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::target::{domain_suffixes, Target, TargetType};

/// One row of a server table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub server: String,
    pub handler: Option<String>,
}

impl ServerEntry {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }
}

/// Lookup from TLD (or `ip` / `as`) to the first authority to ask.
pub trait ServerTable: Send + Sync {
    fn lookup(&self, key: &str) -> Option<ServerEntry>;

    /// Hosts whose responses are Latin-1 encoded.
    fn non_utf8_hosts(&self) -> Vec<String>;

    fn is_non_utf8(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.non_utf8_hosts().iter().any(|h| *h == host)
    }

    /// Entry for a classified target; domains try the longest suffix first.
    fn find(&self, target: &Target) -> Option<ServerEntry> {
        match target.kind {
            TargetType::Domain => domain_suffixes(&target.query)
                .into_iter()
                .find_map(|suffix| self.lookup(suffix)),
            _ => self.lookup(target.table_key()),
        }
    }
}

static DEFAULT_SERVERS: Lazy<Vec<(&'static str, &'static str, Option<&'static str>)>> =
    Lazy::new(|| {
        vec![
            // Numbers
            ("ip", "whois.arin.net?n + {query}", Some("arin")),
            ("as", "whois.arin.net?a + {query}", Some("arin")),
            // Thin registries answer with a registrar referral
            ("com", "whois.verisign-grs.com", Some("standard")),
            ("net", "whois.verisign-grs.com", Some("standard")),
            ("cc", "ccwhois.verisign-grs.com", Some("standard")),
            ("tv", "tvwhois.verisign-grs.com", Some("standard")),
            // Thick registries
            ("org", "whois.publicinterestregistry.org", None),
            ("info", "whois.afilias.net", Some("info")),
            ("biz", "whois.biz", Some("biz")),
            ("mobi", "whois.afilias.net", Some("info")),
            ("name", "whois.nic.name", None),
            ("pro", "whois.registrypro.pro", None),
            ("aero", "whois.aero", None),
            ("asia", "whois.nic.asia", None),
            ("coop", "whois.nic.coop", None),
            ("edu", "whois.educause.edu", None),
            ("int", "whois.iana.org", None),
            ("museum", "whois.museum", None),
            ("travel", "whois.nic.travel", None),
            ("app", "whois.nic.google", None),
            ("dev", "whois.nic.google", None),
            ("io", "whois.nic.io", None),
            ("co", "whois.nic.co", None),
            ("me", "whois.nic.me", None),
            ("xyz", "whois.nic.xyz", None),
            // Country codes
            ("ac", "whois.nic.ac", None),
            ("at", "whois.nic.at", Some("ripe")),
            ("au", "whois.auda.org.au", None),
            ("be", "whois.dns.be", None),
            ("br", "whois.registro.br", None),
            ("ca", "whois.cira.ca", None),
            ("ch", "whois.nic.ch", None),
            ("cl", "whois.nic.cl", None),
            ("cn", "whois.cnnic.cn", None),
            ("de", "whois.denic.de", None),
            ("dk", "whois.dk-hostmaster.dk", None),
            ("es", "https://www.nic.es/sgnd/dominio/publicBuscarDominios.action?tDominio.nombreDominio={query}", None),
            ("eu", "whois.eu", None),
            ("fi", "whois.fi", None),
            ("fr", "whois.nic.fr", None),
            ("hu", "whois.nic.hu", None),
            ("ie", "whois.weare.ie", None),
            ("in", "whois.registry.in", None),
            ("is", "whois.isnic.is", None),
            ("it", "whois.nic.it", None),
            ("jp", "whois.jprs.jp", Some("jp")),
            ("kr", "whois.kr", None),
            ("nl", "whois.domain-registry.nl", None),
            ("no", "whois.norid.no", None),
            ("nz", "whois.irs.net.nz", None),
            ("pl", "whois.dns.pl", None),
            ("pt", "whois.dns.pt", None),
            ("ru", "whois.tcinet.ru", None),
            ("se", "whois.iis.se", None),
            ("uk", "whois.nic.uk", None),
            ("us", "whois.nic.us", None),
        ]
    });

/// Hosts known to answer in Latin-1.
const DEFAULT_NON_UTF8: &[&str] = &[
    "br.whois-servers.net",
    "ca.whois-servers.net",
    "cl.whois-servers.net",
    "hu.whois-servers.net",
    "is.whois-servers.net",
    "pt.whois-servers.net",
    "whois.interdomain.net",
    "whois.lacnic.net",
    "whois.nicline.com",
    "whois.ripe.net",
];

/// In-memory server table, built-in entries overlaid by configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticServerTable {
    entries: HashMap<String, ServerEntry>,
    non_utf8: HashSet<String>,
}

impl StaticServerTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (key, server, handler) in DEFAULT_SERVERS.iter() {
            let entry = ServerEntry::new(*server);
            let entry = match handler {
                Some(handler) => entry.with_handler(*handler),
                None => entry,
            };
            table.entries.insert((*key).to_string(), entry);
        }
        table.non_utf8 = DEFAULT_NON_UTF8.iter().map(|h| h.to_string()).collect();
        table
    }

    pub fn with_entry(mut self, key: &str, entry: ServerEntry) -> Self {
        self.entries.insert(key.to_ascii_lowercase(), entry);
        self
    }

    /// Overlay `key = "server"` pairs, e.g. from the `[servers]` config table.
    /// An overlaid entry drops the built-in handler.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (key, server) in overrides {
            self.entries
                .insert(key.trim_start_matches('.').to_ascii_lowercase(), ServerEntry::new(server));
        }
        self
    }

    pub fn with_non_utf8_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.non_utf8
            .extend(hosts.into_iter().map(|h| h.as_ref().to_ascii_lowercase()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ServerTable for StaticServerTable {
    fn lookup(&self, key: &str) -> Option<ServerEntry> {
        self.entries.get(&key.to_ascii_lowercase()).cloned()
    }

    fn non_utf8_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.non_utf8.iter().cloned().collect();
        hosts.sort();
        hosts
    }

    fn is_non_utf8(&self, host: &str) -> bool {
        self.non_utf8.contains(&host.to_ascii_lowercase())
    }
}
