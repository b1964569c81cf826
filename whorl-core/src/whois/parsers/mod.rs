//! Registry-specific WHOIS response parsers.
//!
//! Every authority speaks its own dialect. Parsers are registered under a
//! stable handler name and selected per hop: an explicit handler from the
//! server table or referral wins, then the handler mapped to the answering
//! host, then the generic gTLD parser.

mod rpsl;
mod tables;
mod template;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use super::record::{FieldMap, RegistryInfo};
use crate::error::{Result, WhorlError};
pub use rpsl::RpslParser;
pub use tables::{organization_registry, owner_registry, DEFAULT_HANDLER};
pub use template::TemplateParser;

/// A server the resolver should ask next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referral {
    pub server: String,
    pub handler: Option<String>,
}

impl Referral {
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

/// What one response contributed to the record.
#[derive(Debug, Clone, Default)]
pub struct ParsedHop {
    pub registrant: FieldMap,
    pub registry: RegistryInfo,
    pub referrals: Vec<Referral>,
}

/// Trait for registry-specific WHOIS parsers.
///
/// Parsing is pure: implementors never perform I/O and return follow-up
/// servers as [`Referral`]s for the resolver to chase.
pub trait RegistryParser: Send + Sync {
    /// Stable handler name used for registration and dispatch.
    fn name(&self) -> &str;

    fn parse(&self, raw: &[String], query: &str) -> ParsedHop;
}

/// Registry of all available parsers.
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn RegistryParser>>,
    host_handlers: HashMap<String, String>,
    fallback: String,
}

impl ParserRegistry {
    /// An empty registry falling back to `fallback` for unknown hosts.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            parsers: HashMap::new(),
            host_handlers: HashMap::new(),
            fallback: fallback.into(),
        }
    }

    /// Creates a registry with all built-in parsers and dispatch tables.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new(DEFAULT_HANDLER);
        for parser in tables::builtin_parsers()? {
            registry.register(parser);
        }
        for (host, handler) in tables::HOST_HANDLERS {
            registry.map_host(host, handler);
        }
        Ok(registry)
    }

    pub fn register(&mut self, parser: Arc<dyn RegistryParser>) {
        self.parsers.insert(parser.name().to_string(), parser);
    }

    pub fn with_parser(mut self, parser: Arc<dyn RegistryParser>) -> Self {
        self.register(parser);
        self
    }

    pub fn map_host(&mut self, host: &str, handler: &str) {
        self.host_handlers
            .insert(host.to_ascii_lowercase(), handler.to_string());
    }

    pub fn with_host(mut self, host: &str, handler: &str) -> Self {
        self.map_host(host, handler);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn RegistryParser>> {
        self.parsers
            .get(name)
            .cloned()
            .ok_or_else(|| WhorlError::UnknownHandler(name.to_string()))
    }

    /// Handler registered for an answering host, if any.
    pub fn handler_for_host(&self, host: &str) -> Option<&str> {
        self.host_handlers
            .get(&host.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Pick the parser for one hop.
    ///
    /// A named handler must exist; host-based and fallback dispatch never
    /// fail as long as the fallback is registered.
    pub fn select(&self, handler: Option<&str>, host: &str) -> Result<Arc<dyn RegistryParser>> {
        if let Some(name) = handler {
            return self.get(name);
        }
        if let Some(name) = self.handler_for_host(host) {
            return self.get(name);
        }
        // registrar servers are usually whois.<registrar>.<tld>
        let guessed = host.split('.').nth(1).filter(|_| host.starts_with("whois."));
        if let Some(parser) = guessed.and_then(|name| self.parsers.get(name)) {
            debug!(host = %host, handler = %parser.name(), "Handler chosen from host name");
            return Ok(parser.clone());
        }
        self.get(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

/// Global parser registry instance.
pub static PARSER_REGISTRY: Lazy<Arc<ParserRegistry>> = Lazy::new(|| {
    Arc::new(ParserRegistry::builtin().expect("Built-in handler tables must be valid"))
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_are_valid() {
        let registry = ParserRegistry::builtin().unwrap();
        for name in ["standard", "arin", "ripe", "apnic", "lacnic", "afrinic", "krnic", "info", "biz", "jp"] {
            assert!(registry.get(name).is_ok(), "{name} missing");
        }
    }

    #[test]
    fn test_select_by_name_host_and_fallback() {
        let registry = ParserRegistry::builtin().unwrap();

        assert_eq!(registry.select(Some("arin"), "anything").unwrap().name(), "arin");
        assert_eq!(registry.select(None, "WHOIS.RIPE.NET").unwrap().name(), "ripe");
        assert_eq!(
            registry.select(None, "whois.networksolutions.com").unwrap().name(),
            "networksolutions"
        );
        assert_eq!(registry.select(None, "whois.unknown.test").unwrap().name(), DEFAULT_HANDLER);
    }

    #[test]
    fn test_unknown_handler() {
        let registry = ParserRegistry::builtin().unwrap();
        let err = registry.select(Some("nosuch"), "whois.ripe.net").err().unwrap();
        assert!(matches!(err, WhorlError::UnknownHandler(name) if name == "nosuch"));
    }
}
