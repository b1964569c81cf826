//! DNS side lookups: the client's own reverse name for `{hname}` and
//! addresses for discovered name servers.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::whois::merge::NAMESERVER_KEY;
use crate::whois::record::{Field, FieldMap};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Address shown for name servers that do not resolve.
pub const UNRESOLVED: &str = "(DOES NOT EXIST)";

static HOSTNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w\-]+(\.[\w\-]+)+$").expect("Invalid hostname regex"));

#[async_trait]
pub trait HostLookup: Send + Sync {
    async fn reverse(&self, ip: IpAddr) -> Option<String>;
    async fn address(&self, host: &str) -> Option<IpAddr>;
}

#[derive(Debug, Clone)]
pub struct DnsResolver {
    timeout: Duration,
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsResolver {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn create_resolver(&self) -> TokioAsyncResolver {
        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 2;
        TokioAsyncResolver::tokio(ResolverConfig::google(), opts)
    }
}

#[async_trait]
impl HostLookup for DnsResolver {
    async fn reverse(&self, ip: IpAddr) -> Option<String> {
        let resolver = self.create_resolver();
        match resolver.reverse_lookup(ip).await {
            Ok(names) => names
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string()),
            Err(e) => {
                debug!(ip = %ip, error = %e, "Reverse lookup failed");
                None
            }
        }
    }

    async fn address(&self, host: &str) -> Option<IpAddr> {
        let resolver = self.create_resolver();
        match resolver.lookup_ip(host).await {
            Ok(addresses) => addresses.iter().next(),
            Err(e) => {
                debug!(host = %host, error = %e, "Name server lookup failed");
                None
            }
        }
    }
}

/// Split a raw name-server value (`ns1.example.net. [192.0.2.1]`) into a
/// hostname and an inline address.
pub fn split_nameserver(value: &str) -> Option<(String, Option<IpAddr>)> {
    let cleaned = value
        .trim()
        .replace(['[', ']', '(', ')'], "")
        .replace('\t', " ");

    let mut host = None;
    let mut address = None;
    for part in cleaned.split_whitespace() {
        let part = part.trim_end_matches('.');
        if let Ok(ip) = part.parse::<IpAddr>() {
            address = Some(ip);
        } else if host.is_none() && HOSTNAME.is_match(part) {
            host = Some(part.to_ascii_lowercase());
        }
    }
    host.map(|h| (h, address))
}

/// Replace `domain.nserver` / `network.nserver` lists with host → address
/// maps, resolving hosts that carry no inline address. Lookups still pending
/// at `deadline` count as unresolved.
pub async fn annotate_nameservers(
    registrant: &mut FieldMap,
    lookup: &dyn HostLookup,
    deadline: Instant,
) {
    for role in ["domain", "network"] {
        let Some(values) = registrant
            .get(role)
            .and_then(Field::as_map)
            .and_then(|map| map.get(NAMESERVER_KEY))
            .filter(|field| !matches!(field, Field::Map(_)))
            .map(|field| field.values().iter().map(|v| v.to_string()).collect::<Vec<_>>())
        else {
            continue;
        };

        let mut annotated = FieldMap::new();
        for value in values {
            let Some((host, inline)) = split_nameserver(&value) else {
                continue;
            };
            let address = match inline {
                Some(ip) => ip.to_string(),
                None => match timeout_at(deadline, lookup.address(&host)).await {
                    Ok(Some(ip)) => ip.to_string(),
                    Ok(None) => UNRESOLVED.to_string(),
                    Err(_) => {
                        debug!(host = %host, "No time left to resolve name server");
                        UNRESOLVED.to_string()
                    }
                },
            };
            annotated.insert(host, Field::Text(address));
        }

        if let Some(map) = registrant.get_mut(role).and_then(Field::as_map_mut) {
            if annotated.is_empty() {
                map.remove(NAMESERVER_KEY);
            } else {
                map.insert(NAMESERVER_KEY.to_string(), Field::Map(annotated));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLookup;

    /// Never answers within any reasonable budget.
    struct StalledLookup;

    #[async_trait]
    impl HostLookup for StalledLookup {
        async fn reverse(&self, _ip: IpAddr) -> Option<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            None
        }

        async fn address(&self, _host: &str) -> Option<IpAddr> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            None
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[async_trait]
    impl HostLookup for FixedLookup {
        async fn reverse(&self, _ip: IpAddr) -> Option<String> {
            Some("client.example.net".to_string())
        }

        async fn address(&self, host: &str) -> Option<IpAddr> {
            (host == "ns1.example.net").then(|| IpAddr::from([192, 0, 2, 53]))
        }
    }

    #[test]
    fn test_split_nameserver() {
        assert_eq!(
            split_nameserver("NS1.EXAMPLE.NET. [192.0.2.1]"),
            Some(("ns1.example.net".to_string(), Some("192.0.2.1".parse().unwrap())))
        );
        assert_eq!(
            split_nameserver("ns2.example.net"),
            Some(("ns2.example.net".to_string(), None))
        );
        assert_eq!(split_nameserver("   "), None);
    }

    #[tokio::test]
    async fn test_annotate_nameservers() {
        let mut domain = FieldMap::new();
        domain.insert(
            "nserver".to_string(),
            Field::List(vec![
                "ns1.example.net".to_string(),
                "ns2.example.net (198.51.100.2)".to_string(),
                "gone.example.net".to_string(),
            ]),
        );
        let mut registrant = FieldMap::new();
        registrant.insert("domain".to_string(), Field::Map(domain));

        annotate_nameservers(&mut registrant, &FixedLookup, deadline()).await;

        let ns = registrant["domain"].as_map().unwrap()["nserver"].as_map().unwrap();
        assert_eq!(ns["ns1.example.net"], Field::text("192.0.2.53"));
        assert_eq!(ns["ns2.example.net"], Field::text("198.51.100.2"));
        assert_eq!(ns["gone.example.net"], Field::text(UNRESOLVED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_annotation_stops_at_deadline() {
        let hosts: Vec<String> = (1..=10).map(|i| format!("ns{}.example.net", i)).collect();
        let mut domain = FieldMap::new();
        domain.insert("nserver".to_string(), Field::List(hosts));
        domain.insert("name".to_string(), Field::text("example.net"));
        let mut registrant = FieldMap::new();
        registrant.insert("domain".to_string(), Field::Map(domain));

        let start = Instant::now();
        annotate_nameservers(&mut registrant, &StalledLookup, start + Duration::from_secs(1)).await;

        assert!(start.elapsed() < Duration::from_secs(2));
        let ns = registrant["domain"].as_map().unwrap()["nserver"].as_map().unwrap();
        assert_eq!(ns.len(), 10);
        assert!(ns.values().all(|address| *address == Field::text(UNRESOLVED)));
    }
}
