pub mod bulk;
pub mod config;
pub mod dns;
pub mod error;
pub mod output;
pub mod retry;
pub mod target;
pub mod whois;

pub use error::{Result, WhorlError};
pub use target::{normalize_domain, Target, TargetType};

pub use bulk::{BulkResolver, BulkResult};
pub use config::WhoisConfig;
pub use dns::{DnsResolver, HostLookup};
pub use output::{OutputFormat, OutputFormatter};
pub use retry::{RetryExecutor, RetryPolicy};
pub use whois::{Record, ServerSpec, WhoisClient};
