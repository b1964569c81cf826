//! WHOIS-over-HTTP gateways.
//!
//! A few registries only publish their data as a web page. The page is
//! fetched with the argument template appended as the query string and
//! flattened back into plain text lines.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::descriptor::QueryDescriptor;
use super::transport::{decode, RawResponse, Transport};
use crate::config::WhoisConfig;
use crate::error::{Result, WhorlError};

static LINE_BREAK_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|<p\b[^>]*>|</title>|</h[1-6]>").expect("Invalid line break regex")
});

static ROW_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<tr\b").expect("Invalid row regex"));

static CELL_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<td\b").expect("Invalid cell regex"));

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("Invalid tag regex"));

static PRE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<pre\b[^>]*>").expect("Invalid pre regex"));

static PRE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</pre>").expect("Invalid pre regex"));

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    max_response_bytes: usize,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&WhoisConfig::default())
    }
}

impl HttpTransport {
    pub fn new(config: &WhoisConfig) -> Self {
        let timeout = config.stream_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("whorl/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            timeout,
            max_response_bytes: config.max_response_bytes,
        }
    }

    fn url_for(descriptor: &QueryDescriptor) -> String {
        match &descriptor.args_template {
            Some(_) => format!("{}?{}", descriptor.server, descriptor.args),
            None => descriptor.server.clone(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, descriptor, deadline), fields(server = %descriptor.server))]
    async fn send(
        &self,
        descriptor: &mut QueryDescriptor,
        deadline: Instant,
    ) -> Result<RawResponse> {
        let url = Self::url_for(descriptor);
        let ceiling = deadline.min(Instant::now() + self.timeout);
        debug!(url = %url, "Fetching WHOIS gateway page");

        let limit = self.max_response_bytes;
        let fetch = async {
            let mut response = self.client.get(&url).send().await?.error_for_status()?;
            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                body.extend_from_slice(&chunk);
                if body.len() > limit {
                    return Ok(None);
                }
            }
            Ok::<_, reqwest::Error>(Some(body))
        };

        let body = match tokio::time::timeout_at(ceiling, fetch).await {
            Ok(Ok(Some(body))) => body,
            Ok(Ok(None)) => return Err(WhorlError::ResponseTooLarge(descriptor.server.clone())),
            Ok(Err(e)) => {
                let error = WhorlError::Http(e);
                descriptor.record_error(&error);
                return Err(error);
            }
            Err(_) => return Err(WhorlError::ReadTimeout(descriptor.server.clone())),
        };

        descriptor.mark_ok();
        Ok(RawResponse {
            lines: strip_html(&decode(body, false)),
        })
    }
}

/// Flatten an HTML page into text lines. `<pre>` content keeps its line
/// structure, block-level tags become breaks, runs of more than two blank
/// lines collapse.
pub fn strip_html(html: &str) -> Vec<String> {
    let mut text = String::new();
    let mut in_pre = false;

    for raw in html.lines() {
        let mut line = raw.trim().to_string();
        if let Some(m) = PRE_OPEN.find(&line) {
            text.push_str(&line[..m.start()]);
            text.push('\n');
            line = line[m.end()..].to_string();
            in_pre = true;
        }
        if let Some(m) = PRE_CLOSE.find(&line) {
            text.push_str(&line[..m.start()]);
            text.push('\n');
            line = line[m.end()..].to_string();
            in_pre = false;
        }
        text.push_str(&line);
        if in_pre {
            text.push('\n');
        }
    }

    let text = LINE_BREAK_TAGS.replace_all(&text, "\n");
    let text = CELL_TAG.replace_all(&text, " <td");
    let text = ROW_TAG.replace_all(&text, "\n<tr");
    let text = ANY_TAG.replace_all(&text, "");
    let text = text.replace("&nbsp;", " ");

    let mut lines = Vec::new();
    let mut blank_run = 0;
    for line in text.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line.to_string());
    }
    lines
}
