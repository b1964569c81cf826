use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::whois::{Record, WhoisClient};

pub type ProgressCallback = Box<dyn Fn(usize, usize, &str) + Send + Sync>;

const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResult {
    pub target: String,
    pub success: bool,
    pub record: Record,
    pub duration_ms: u64,
}

/// Runs independent resolutions side by side. Each target gets its own
/// chain; only the client's read-only tables are shared.
#[derive(Clone)]
pub struct BulkResolver {
    concurrency: usize,
    deep: bool,
    client: WhoisClient,
}

impl Default for BulkResolver {
    fn default() -> Self {
        Self::new(WhoisClient::new())
    }
}

impl BulkResolver {
    pub fn new(client: WhoisClient) -> Self {
        let deep = client.config().deep;
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            deep,
            client,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// Resolve every target. Results arrive in completion order.
    #[instrument(skip(self, targets, progress), fields(total = targets.len()))]
    pub async fn resolve_all(
        &self,
        targets: Vec<String>,
        progress: Option<ProgressCallback>,
    ) -> Vec<BulkResult> {
        let total = targets.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        debug!(
            total = total,
            concurrency = self.concurrency,
            "Starting bulk resolution"
        );

        stream::iter(targets)
            .map(|target| {
                let semaphore = semaphore.clone();
                let completed = completed.clone();
                let progress = progress.as_ref();
                let client = &self.client;
                let deep = self.deep;

                async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return BulkResult {
                                record: Record {
                                    errors: vec!["Resolution cancelled".to_string()],
                                    ..Record::default()
                                },
                                target,
                                success: false,
                                duration_ms: 0,
                            };
                        }
                    };

                    let start = std::time::Instant::now();
                    let record = client.resolve(&target, deep).await;
                    let duration_ms = start.elapsed().as_millis() as u64;

                    let count = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(progress) = progress {
                        progress(count, total, &target);
                    }

                    let success = !record.registry_info.servers.is_empty();
                    if !success {
                        warn!(target = %target, errors = ?record.errors, "Bulk resolution failed");
                    }
                    BulkResult {
                        target,
                        success,
                        record,
                        duration_ms,
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

/// Targets from a list file: one per line, `#` comments, first CSV column.
pub fn parse_targets_from_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split(',').next().unwrap_or(line).trim().to_string())
        .filter(|target| !target.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, WhorlError};
    use crate::whois::{QueryDescriptor, RawResponse, ServerEntry, StaticServerTable, Transport};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(
            &self,
            descriptor: &mut QueryDescriptor,
            _deadline: Instant,
        ) -> Result<RawResponse> {
            if descriptor.args.starts_with("down") {
                descriptor.record_error("connection refused");
                return Err(WhorlError::Connect {
                    server: descriptor.address(),
                    attempts: 1,
                    last_error: "connection refused".to_string(),
                });
            }
            descriptor.mark_ok();
            Ok(RawResponse::from_text(&format!("Domain Name: {}", descriptor.args)))
        }
    }

    fn resolver() -> BulkResolver {
        let client = WhoisClient::new()
            .with_servers(Arc::new(
                StaticServerTable::new().with_entry("test", ServerEntry::new("whois.nic.test")),
            ))
            .with_transport(Arc::new(EchoTransport));
        BulkResolver::new(client).with_concurrency(2)
    }

    #[test]
    fn test_parse_targets_from_file() {
        let content = r#"
# This is a comment
example.com
  192.0.2.1
AS64500
csv,format,example.org
"#;

        let targets = parse_targets_from_file(content);
        assert_eq!(targets, vec!["example.com", "192.0.2.1", "AS64500", "csv"]);
    }

    #[tokio::test]
    async fn test_resolve_all_reports_each_target() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressCallback = Box::new(move |done, total, target| {
            sink.lock().unwrap().push((done, total, target.to_string()));
        });

        let mut results = resolver()
            .resolve_all(
                vec!["a.test".to_string(), "down.test".to_string(), "b.test".to_string()],
                Some(progress),
            )
            .await;
        results.sort_by(|a, b| a.target.cmp(&b.target));

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert_eq!(results[0].record.text(&["domain", "name"]), Some("a.test"));
        assert!(results[1].success);
        assert!(!results[2].success);
        assert_eq!(results[2].target, "down.test");
        assert_eq!(results[2].record.errors, vec!["connection refused"]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(_, total, _)| *total == 3));
    }
}
