//! Line-oriented WHOIS transport over TCP.

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, instrument, warn};

use super::descriptor::QueryDescriptor;
use crate::config::WhoisConfig;
use crate::error::{Result, WhorlError};
use crate::retry::{ConnectRetryClassifier, RetryExecutor};

const READ_CHUNK: usize = 4096;

/// Lines of one response, trailing empty line removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub lines: Vec<String>,
}

impl RawResponse {
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: split_lines(text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Sends one query to the authority named by the descriptor.
///
/// Implementations record connection diagnostics on the descriptor and set
/// its status; they never interpret the response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, descriptor: &mut QueryDescriptor, deadline: Instant)
        -> Result<RawResponse>;
}

#[derive(Debug, Clone)]
pub struct TcpTransport {
    retry: RetryExecutor<ConnectRetryClassifier>,
    stream_timeout: Duration,
    read_wait: Duration,
    max_response_bytes: usize,
    non_utf8: HashSet<String>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(&WhoisConfig::default())
    }
}

impl TcpTransport {
    pub fn new(config: &WhoisConfig) -> Self {
        Self {
            retry: RetryExecutor::new(config.retry_policy()),
            stream_timeout: config.stream_timeout(),
            read_wait: config.read_wait(),
            max_response_bytes: config.max_response_bytes,
            non_utf8: config.non_utf8.iter().map(|h| h.to_ascii_lowercase()).collect(),
        }
    }

    pub fn with_stream_timeout(mut self, stream_timeout: Duration) -> Self {
        self.stream_timeout = stream_timeout;
        self
    }

    pub fn with_read_wait(mut self, read_wait: Duration) -> Self {
        self.read_wait = read_wait;
        self
    }

    /// Hosts whose responses are Latin-1 and must be transcoded.
    pub fn with_non_utf8_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.non_utf8
            .extend(hosts.into_iter().map(|h| h.as_ref().to_ascii_lowercase()));
        self
    }

    async fn connect(&self, descriptor: &mut QueryDescriptor, deadline: Instant) -> Result<TcpStream> {
        let address = descriptor.address();
        let server = descriptor.server.clone();
        let attempt_timeout = self.stream_timeout;

        let result = self
            .retry
            .execute_until(
                Some(deadline),
                || {
                    let address = address.clone();
                    async move {
                        let limit = deadline.min(Instant::now() + attempt_timeout);
                        match timeout_at(limit, TcpStream::connect(&address)).await {
                            Ok(stream) => stream.map_err(WhorlError::from),
                            Err(_) => Err(WhorlError::Io(io::Error::new(
                                io::ErrorKind::TimedOut,
                                "connect timed out",
                            ))),
                        }
                    }
                },
                |attempt, error| {
                    descriptor.record_error(format!(
                        "Connection to {} failed (attempt {}): {}",
                        server, attempt, error
                    ));
                },
            )
            .await;

        match result {
            Ok(stream) => {
                descriptor.mark_ok();
                Ok(stream)
            }
            Err(failure) if failure.deadline_reached => {
                warn!(server = %server, attempts = failure.attempts, "Request deadline reached while connecting");
                Err(WhorlError::ReadTimeout(address))
            }
            Err(failure) => {
                warn!(server = %server, attempts = failure.attempts, "Giving up on WHOIS server");
                Err(WhorlError::Connect {
                    server: address,
                    attempts: failure.attempts,
                    last_error: failure.last_error.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    #[instrument(skip(self, descriptor, deadline), fields(server = %descriptor.server, port = descriptor.port))]
    async fn send(
        &self,
        descriptor: &mut QueryDescriptor,
        deadline: Instant,
    ) -> Result<RawResponse> {
        let mut stream = self.connect(descriptor, deadline).await?;
        let server = descriptor.server.clone();
        let ceiling = deadline.min(Instant::now() + self.stream_timeout);

        let query = format!("{}\r\n", descriptor.args.trim());
        debug!(query = %query.trim_end(), "Sending WHOIS query");
        timeout_at(ceiling, stream.write_all(query.as_bytes()))
            .await
            .map_err(|_| WhorlError::ReadTimeout(server.clone()))??;

        let mut response = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let now = Instant::now();
            if now >= ceiling {
                warn!(server = %server, received = response.len(), "WHOIS read timed out");
                return Err(WhorlError::ReadTimeout(server));
            }
            let wait = self.read_wait.min(ceiling - now);

            match timeout(wait, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    response.extend_from_slice(&buf[..n]);
                    if response.len() > self.max_response_bytes {
                        return Err(WhorlError::ResponseTooLarge(server));
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
                // bounded wait elapsed; the ceiling check decides
                Err(_) => continue,
            }
        }

        let latin1 = self.non_utf8.contains(&descriptor.hostname());
        let text = decode(response, latin1);
        debug!(bytes = text.len(), "WHOIS response received");
        Ok(RawResponse::from_text(&text))
    }
}

/// Decode response bytes. Latin-1 hosts are transcoded; anything else is
/// read as UTF-8 with a Latin-1 fallback.
pub fn decode(bytes: Vec<u8>, latin1: bool) -> String {
    if latin1 {
        return bytes.iter().map(|&b| b as char).collect();
    }
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| b as char).collect())
}

/// Split on `\n`, strip `\r`, drop the trailing empty line.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetType;
    use crate::whois::descriptor::{QueryStatus, ServerSpec};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn descriptor_for(port: u16, query: &str) -> QueryDescriptor {
        let mut descriptor = QueryDescriptor::new(TargetType::Domain, query);
        let spec = ServerSpec::parse(&format!("127.0.0.1:{}", port)).unwrap();
        descriptor.retarget(&spec, 43, None);
        descriptor
    }

    fn fast_config() -> WhoisConfig {
        WhoisConfig::default()
            .with_retry_interval(Duration::from_millis(10))
            .with_read_wait(Duration::from_millis(50))
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines("a\r\nb\r\n"), vec!["a", "b"]);
        assert_eq!(split_lines("a\n\n"), vec!["a", ""]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode("Müller".as_bytes().to_vec(), false), "Müller");
        // 0xFC is ü in Latin-1
        assert_eq!(decode(vec![b'M', 0xFC, b'l'], false), "Mül");
        assert_eq!(decode(vec![b'M', 0xFC, b'l'], true), "Mül");
    }

    #[tokio::test]
    async fn test_refused_connection_exhausts_retries() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = TcpTransport::new(&fast_config().with_retries(2));
        let mut descriptor = descriptor_for(port, "example.com");

        let err = transport.send(&mut descriptor, deadline()).await.unwrap_err();
        match err {
            WhorlError::Connect { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(descriptor.errors.len(), 3);
        assert_eq!(descriptor.status, QueryStatus::Error);
    }

    #[tokio::test]
    async fn test_retries_stop_at_request_deadline() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = WhoisConfig::default()
            .with_retries(3)
            .with_retry_interval(Duration::from_secs(2));
        let transport = TcpTransport::new(&config);
        let mut descriptor = descriptor_for(port, "example.com");
        let start = Instant::now();

        let err = transport
            .send(&mut descriptor, start + Duration::from_millis(500))
            .await
            .unwrap_err();

        assert!(matches!(err, WhorlError::ReadTimeout(_)));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(descriptor.errors.len(), 1);
        assert_eq!(descriptor.status, QueryStatus::Error);
    }

    #[tokio::test]
    async fn test_query_is_crlf_terminated_and_response_split() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(socket);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let reply = format!("query={}\r\nok\r\n", line.trim_end());
            reader.get_mut().write_all(reply.as_bytes()).await.unwrap();
            line
        });

        let transport = TcpTransport::new(&fast_config());
        let mut descriptor = descriptor_for(port, "example.com");
        descriptor.args = "  example.com  ".to_string();

        let response = transport.send(&mut descriptor, deadline()).await.unwrap();
        let received = server.await.unwrap();

        assert_eq!(received, "example.com\r\n");
        assert_eq!(response.lines, vec!["query=example.com", "ok"]);
        assert_eq!(descriptor.status, QueryStatus::Ok);
        assert!(descriptor.errors.is_empty());
    }

    #[tokio::test]
    async fn test_silent_server_hits_stream_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"partial data\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let transport = TcpTransport::new(&fast_config()).with_stream_timeout(Duration::from_millis(300));
        let mut descriptor = descriptor_for(port, "example.com");

        let err = transport.send(&mut descriptor, deadline()).await.unwrap_err();
        assert!(matches!(err, WhorlError::ReadTimeout(_)));
    }

    #[tokio::test]
    async fn test_request_deadline_caps_the_hop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let transport = TcpTransport::new(&fast_config());
        let mut descriptor = descriptor_for(port, "example.com");
        let deadline = Instant::now() + Duration::from_millis(300);

        let err = transport.send(&mut descriptor, deadline).await.unwrap_err();
        assert!(matches!(err, WhorlError::ReadTimeout(_)));
    }

    #[tokio::test]
    async fn test_latin1_host_is_transcoded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(&[b'M', 0xFC, b'l', b'\n']).await.unwrap();
        });

        let transport = TcpTransport::new(&fast_config()).with_non_utf8_hosts(["127.0.0.1"]);
        let mut descriptor = descriptor_for(port, "example.com");

        let response = transport.send(&mut descriptor, deadline()).await.unwrap();
        assert_eq!(response.lines, vec!["Mül"]);
    }
}
