//! Per-chain query state and server-string parsing.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

use crate::error::{Result, WhorlError};
use crate::target::TargetType;
use crate::whois::record::ServerHop;

pub const DEFAULT_WHOIS_PORT: u16 = 43;

const CLIENT_VERSION: &str = concat!("whorl", env!("CARGO_PKG_VERSION"));

/// A parsed server string: `host`, `host:port`, `host?args`,
/// `whois://host`, `rwhois://host:4321/path`, `[2001:db8::1]:43` or an
/// `http(s)://` gateway URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Hostname, bracketed IPv6 literal, or the gateway URL without its query.
    pub host: String,
    pub port: Option<u16>,
    pub args_template: Option<String>,
}

impl ServerSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = || WhorlError::MalformedServerSpec(raw.to_string());

        let spec = raw.trim().trim_end_matches('/');
        if spec.is_empty() {
            return Err(malformed());
        }

        let (location, args) = match spec.split_once('?') {
            Some((location, args)) => (location, Some(args.to_string()).filter(|a| !a.is_empty())),
            None => (spec, None),
        };

        if is_http_url(location) {
            let host_part = location.split_once("://").map(|(_, h)| h).unwrap_or_default();
            if host_part.trim_matches('/').is_empty() {
                return Err(malformed());
            }
            return Ok(Self {
                host: location.trim_end_matches('/').to_string(),
                port: None,
                args_template: args,
            });
        }

        let location = match location.split_once("://") {
            Some((_, rest)) => rest,
            None => location,
        };

        if let Some(bracketed) = location.strip_prefix('[') {
            let (addr, after) = bracketed.split_once(']').ok_or_else(malformed)?;
            if addr.is_empty() {
                return Err(malformed());
            }
            let after = after.split('/').next().unwrap_or_default();
            let port = match after.strip_prefix(':') {
                Some(port) => Some(port.parse::<u16>().map_err(|_| malformed())?),
                None if after.is_empty() => None,
                None => return Err(malformed()),
            };
            return Ok(Self {
                host: format!("[{}]", addr.to_ascii_lowercase()),
                port,
                args_template: args,
            });
        }

        if let Ok(v6) = location.parse::<Ipv6Addr>() {
            return Ok(Self {
                host: format!("[{}]", v6),
                port: None,
                args_template: args,
            });
        }

        let location = location.split('/').next().unwrap_or_default();
        let (host, port) = match location.rsplit_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| malformed())?)),
            None => (location, None),
        };
        if host.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            host: host.to_ascii_lowercase(),
            port,
            args_template: args,
        })
    }

    pub fn is_http(&self) -> bool {
        is_http_url(&self.host)
    }

    /// Hostname without brackets or URL scheme, as used for visited-set
    /// bookkeeping and handler dispatch.
    pub fn hostname(&self) -> String {
        host_of(&self.host)
    }

    pub fn port_or(&self, default: u16) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.host.to_ascii_lowercase().starts_with("https://") => 443,
            None if self.is_http() => 80,
            None => default,
        }
    }
}

impl fmt::Display for ServerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(args) = &self.args_template {
            write!(f, "?{}", args)?;
        }
        Ok(())
    }
}

fn is_http_url(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Bare hostname of a server string, lowercased.
pub fn host_of(server: &str) -> String {
    let without_scheme = server.split_once("://").map(|(_, h)| h).unwrap_or(server);
    let host = without_scheme.split(['/', '?']).next().unwrap_or_default();
    let host = match host.strip_prefix('[') {
        Some(inner) => inner.split(']').next().unwrap_or_default(),
        None => host.split(':').next().unwrap_or_default(),
    };
    host.to_ascii_lowercase()
}

/// Values available to argument templates.
#[derive(Debug, Clone)]
pub struct ArgsContext {
    pub client_ip: IpAddr,
    /// Reverse name of `client_ip`; falls back to the address text.
    pub client_hostname: Option<String>,
}

impl ArgsContext {
    pub fn new(client_ip: IpAddr) -> Self {
        Self {
            client_ip,
            client_hostname: None,
        }
    }

    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.client_hostname = hostname;
        self
    }

    pub fn substitute(&self, template: &str, query: &str) -> String {
        let ip = self.client_ip.to_string();
        let hname = self.client_hostname.clone().unwrap_or_else(|| ip.clone());
        template
            .replace("{query}", query)
            .replace("{version}", CLIENT_VERSION)
            .replace("{ip}", &ip)
            .replace("{hname}", &hname)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Ready,
    Ok,
    Error,
}

/// The single live descriptor of a resolution chain. Server, port and
/// handler are overwritten on every hop; `errors` accumulates.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    pub target_type: TargetType,
    pub raw_query: String,
    pub server: String,
    pub port: u16,
    pub args_template: Option<String>,
    pub args: String,
    pub assigned_handler: Option<String>,
    pub status: QueryStatus,
    pub errors: Vec<String>,
}

impl QueryDescriptor {
    pub fn new(target_type: TargetType, raw_query: impl Into<String>) -> Self {
        let raw_query = raw_query.into();
        Self {
            target_type,
            args: raw_query.clone(),
            raw_query,
            server: String::new(),
            port: DEFAULT_WHOIS_PORT,
            args_template: None,
            assigned_handler: None,
            status: QueryStatus::Ready,
            errors: Vec::new(),
        }
    }

    /// Point the descriptor at the next authority.
    pub fn retarget(&mut self, spec: &ServerSpec, default_port: u16, handler: Option<String>) {
        self.server = spec.host.clone();
        self.port = spec.port_or(default_port);
        self.args_template = spec.args_template.clone();
        self.assigned_handler = handler;
        self.status = QueryStatus::Ready;
    }

    /// Compute the argument string for the current hop. A template wins;
    /// otherwise explicit per-hop args, otherwise the raw query.
    pub fn apply_args(&mut self, explicit: Option<&str>, context: &ArgsContext) {
        self.args = match (&self.args_template, explicit) {
            (Some(template), _) => context.substitute(template, &self.raw_query),
            (None, Some(explicit)) => explicit.to_string(),
            (None, None) => self.raw_query.clone(),
        };
    }

    pub fn record_error(&mut self, error: impl fmt::Display) {
        self.errors.push(error.to_string());
        self.status = QueryStatus::Error;
    }

    pub fn mark_ok(&mut self) {
        self.status = QueryStatus::Ok;
    }

    pub fn is_http(&self) -> bool {
        is_http_url(&self.server)
    }

    pub fn hostname(&self) -> String {
        host_of(&self.server)
    }

    /// Socket address string (`host:port`, IPv6 stays bracketed).
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    pub fn hop(&self) -> ServerHop {
        ServerHop {
            server: self.server.clone(),
            args: self.args.clone(),
            port: self.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ServerSpec {
        ServerSpec::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_forms() {
        let spec = parse("whois.nic.test");
        assert_eq!(spec.host, "whois.nic.test");
        assert_eq!(spec.port_or(43), 43);

        let spec = parse("rwhois://rwhois.example.net:4321/");
        assert_eq!(spec.host, "rwhois.example.net");
        assert_eq!(spec.port, Some(4321));

        let spec = parse("whois://whois.ripe.net");
        assert_eq!(spec.host, "whois.ripe.net");

        let spec = parse("whois.arin.net?n + {query}");
        assert_eq!(spec.host, "whois.arin.net");
        assert_eq!(spec.args_template.as_deref(), Some("n + {query}"));

        let spec = parse("rwhois://rwhois.example.net/some/path");
        assert_eq!(spec.host, "rwhois.example.net");
    }

    #[test]
    fn test_parse_ipv6() {
        let spec = parse("2001:db8::43");
        assert_eq!(spec.host, "[2001:db8::43]");
        assert_eq!(spec.port, None);

        let spec = parse("[2001:db8::43]:4343");
        assert_eq!(spec.host, "[2001:db8::43]");
        assert_eq!(spec.port, Some(4343));
        assert_eq!(spec.hostname(), "2001:db8::43");
    }

    #[test]
    fn test_parse_http() {
        let spec = parse("https://whois.example.org/lookup?domain={query}");
        assert!(spec.is_http());
        assert_eq!(spec.host, "https://whois.example.org/lookup");
        assert_eq!(spec.port_or(43), 443);
        assert_eq!(spec.hostname(), "whois.example.org");
    }

    #[test]
    fn test_malformed() {
        for raw in ["", "   ", "host:abc", ":43", "[::1", "[::1]x", "whois://", "http://"] {
            assert!(
                matches!(ServerSpec::parse(raw), Err(WhorlError::MalformedServerSpec(_))),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_is_idempotent() {
        for raw in [
            "whois.nic.test",
            "WHOIS.NIC.TEST:4343",
            "whois://whois.ripe.net/",
            "rwhois://rwhois.example.net:4321/path",
            "whois.arin.net?n + {query}",
            "2001:db8::43",
            "[2001:db8::43]:4343",
            "https://whois.example.org/lookup?domain={query}",
        ] {
            let once = parse(raw);
            let twice = parse(&once.to_string());
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn test_args_substitution() {
        let context = ArgsContext::new(IpAddr::from([192, 0, 2, 7]));
        let mut descriptor = QueryDescriptor::new(TargetType::Ip, "10.1.2.3");

        descriptor.retarget(&parse("whois.arin.net?n + {query}"), 43, None);
        descriptor.apply_args(None, &context);
        assert_eq!(descriptor.args, "n + 10.1.2.3");

        descriptor.retarget(&parse("rwhois.example.net?-rwhois V-1.5:003fff:00 {version} ({hname}) {ip}"), 4321, None);
        descriptor.apply_args(None, &context);
        assert!(descriptor.args.contains("whorl"));
        assert!(descriptor.args.ends_with("(192.0.2.7) 192.0.2.7"));

        descriptor.retarget(&parse("whois.arin.net"), 43, None);
        descriptor.apply_args(Some("n NET-10-0-0-0-1"), &context);
        assert_eq!(descriptor.args, "n NET-10-0-0-0-1");

        descriptor.apply_args(None, &context);
        assert_eq!(descriptor.args, "10.1.2.3");
    }

    #[test]
    fn test_errors_accumulate_across_hops() {
        let mut descriptor = QueryDescriptor::new(TargetType::Domain, "example.com");
        descriptor.record_error("first");
        assert_eq!(descriptor.status, QueryStatus::Error);
        descriptor.retarget(&parse("whois.example.net"), 43, Some("standard".to_string()));
        assert_eq!(descriptor.status, QueryStatus::Ready);
        descriptor.record_error("second");
        assert_eq!(descriptor.errors, vec!["first", "second"]);
    }
}
