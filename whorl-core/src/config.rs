//! Runtime configuration for the resolver.
//!
//! Every field has a default, so an empty TOML document (or no file at all)
//! yields a working configuration. A `[servers]` table overlays the built-in
//! TLD → server table, using the same `host[:port][?args]` syntax.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WhorlError};
use crate::retry::RetryPolicy;

const DEFAULT_CONFIG_FILE: &str = "whorl.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhoisConfig {
    /// Port used when a server string does not name one.
    pub port: u16,
    /// Connection retries after the first attempt.
    pub retries: usize,
    /// Fixed pause between connection attempts.
    pub retry_interval_ms: u64,
    /// Growth factor applied to the pause; 1.0 keeps it fixed.
    pub retry_multiplier: f64,
    pub retry_jitter: bool,
    /// Ceiling on a single hop, measured from the moment the connection opens.
    pub stream_timeout_secs: u64,
    /// Bounded wait for each individual read.
    pub read_wait_ms: u64,
    /// Budget for a whole resolution chain.
    pub request_timeout_secs: u64,
    pub max_response_bytes: usize,
    /// Follow referrals unless the caller says otherwise.
    pub deep: bool,
    /// Address substituted for `{ip}` in argument templates.
    pub client_ip: IpAddr,
    /// Turn name-server lists into host → address maps after resolution.
    pub annotate_nameservers: bool,
    /// Extra hosts whose responses are Latin-1 encoded.
    pub non_utf8: Vec<String>,
    /// TLD (or `ip` / `as`) → server string overrides.
    pub servers: BTreeMap<String, String>,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            port: 43,
            retries: 0,
            retry_interval_ms: 2_000,
            retry_multiplier: 1.0,
            retry_jitter: false,
            stream_timeout_secs: 10,
            read_wait_ms: 500,
            request_timeout_secs: 30,
            max_response_bytes: 1024 * 1024,
            deep: true,
            client_ip: IpAddr::from([127, 0, 0, 1]),
            annotate_nameservers: false,
            non_utf8: Vec::new(),
            servers: BTreeMap::new(),
        }
    }
}

impl WhoisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from an explicit path, then `whorl.toml` in the
    /// current directory, then defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WhorlError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| WhorlError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(WhorlError::Config("port must be non-zero".to_string()));
        }
        if self.stream_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(WhorlError::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_read_wait(mut self, wait: Duration) -> Self {
        self.read_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn with_annotated_nameservers(mut self, annotate: bool) -> Self {
        self.annotate_nameservers = annotate;
        self
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn read_wait(&self) -> Duration {
        Duration::from_millis(self.read_wait_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.retries + 1)
            .with_initial_delay(Duration::from_millis(self.retry_interval_ms))
            .with_max_delay(Duration::from_millis(self.retry_interval_ms.max(1)) * 8)
            .with_multiplier(self.retry_multiplier)
            .with_jitter(self.retry_jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WhoisConfig::default();
        assert_eq!(config.port, 43);
        assert_eq!(config.retries, 0);
        assert_eq!(config.stream_timeout(), Duration::from_secs(10));
        assert!(config.deep);
        assert!(!config.annotate_nameservers);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = WhoisConfig::from_toml_str("").unwrap();
        assert_eq!(config.retry_interval_ms, 2_000);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_toml_overrides() {
        let config = WhoisConfig::from_toml_str(
            r#"
retries = 2
retry_interval_ms = 50
deep = false
non_utf8 = ["whois.example.net"]

[servers]
test = "whois.nic.test:4343"
"#,
        )
        .unwrap();

        assert_eq!(config.retries, 2);
        assert!(!config.deep);
        assert_eq!(config.non_utf8, vec!["whois.example.net".to_string()]);
        assert_eq!(config.servers.get("test").unwrap(), "whois.nic.test:4343");
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = WhoisConfig::from_toml_str("retries = \"many\"").unwrap_err();
        assert!(matches!(err, WhorlError::Config(_)));
    }

    #[test]
    fn test_zero_port_rejected() {
        assert!(WhoisConfig::from_toml_str("port = 0").is_err());
    }
}
