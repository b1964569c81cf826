use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, instrument, warn};

use super::descriptor::{ArgsContext, QueryDescriptor, ServerSpec};
use super::http::HttpTransport;
use super::parsers::{owner_registry, ParserRegistry, PARSER_REGISTRY};
use super::record::{Record, ServerHop};
use super::referral::parse_listing;
use super::servers::{ServerTable, StaticServerTable};
use super::transport::{RawResponse, TcpTransport, Transport};
use crate::config::WhoisConfig;
use crate::dns::{annotate_nameservers, DnsResolver, HostLookup};
use crate::error::{Result, WhorlError};
use crate::target::{Target, TargetType};

/// Resolver progress, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveState {
    Init,
    Querying,
    Parsing,
    Referring,
    Done,
    Failed,
}

impl fmt::Display for ResolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolveState::Init => "init",
            ResolveState::Querying => "querying",
            ResolveState::Parsing => "parsing",
            ResolveState::Referring => "referring",
            ResolveState::Done => "done",
            ResolveState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HopKind {
    /// A new authority; deduplicated by host.
    Authority,
    /// An ARIN sub-block on the current authority; deduplicated by handle.
    SubBlock,
}

#[derive(Debug, Clone)]
struct PendingQuery {
    spec: ServerSpec,
    handler: Option<String>,
    args: Option<String>,
    kind: HopKind,
}

impl PendingQuery {
    fn authority(spec: ServerSpec, handler: Option<String>) -> Self {
        Self {
            spec,
            handler,
            args: None,
            kind: HopKind::Authority,
        }
    }
}

/// Called with every hop just before it is queried.
pub type HopObserver = Arc<dyn Fn(&ServerHop) + Send + Sync>;

/// Everything one `resolve` call owns. Nothing outlives the call.
struct ResolutionContext {
    target: Target,
    descriptor: QueryDescriptor,
    record: Record,
    visited: HashSet<String>,
    seen_blocks: HashSet<String>,
    pending: VecDeque<PendingQuery>,
    deadline: Instant,
    deep: bool,
    hops: usize,
    state: ResolveState,
    args: ArgsContext,
}

impl ResolutionContext {
    fn transition(&mut self, next: ResolveState) {
        debug!(from = %self.state, to = %next, query = %self.target.query, "Resolver state");
        self.state = next;
    }
}

/// Referral-chasing WHOIS resolver.
///
/// Shares the read-only handler registry and server table between calls;
/// every call gets its own descriptor, record and visited set.
#[derive(Clone)]
pub struct WhoisClient {
    config: Arc<WhoisConfig>,
    servers: Arc<dyn ServerTable>,
    parsers: Arc<ParserRegistry>,
    transport: Arc<dyn Transport>,
    http: Arc<dyn Transport>,
    dns: Arc<dyn HostLookup>,
    observer: Option<HopObserver>,
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WhoisClient {
    pub fn new() -> Self {
        Self::with_config(WhoisConfig::default())
    }

    pub fn with_config(config: WhoisConfig) -> Self {
        let servers = StaticServerTable::builtin()
            .with_overrides(&config.servers)
            .with_non_utf8_hosts(&config.non_utf8);
        let transport = TcpTransport::new(&config).with_non_utf8_hosts(servers.non_utf8_hosts());
        let http = HttpTransport::new(&config);
        Self {
            servers: Arc::new(servers),
            parsers: PARSER_REGISTRY.clone(),
            transport: Arc::new(transport),
            http: Arc::new(http),
            dns: Arc::new(DnsResolver::new()),
            observer: None,
            config: Arc::new(config),
        }
    }

    pub fn with_servers(mut self, servers: Arc<dyn ServerTable>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_parsers(mut self, parsers: Arc<ParserRegistry>) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_http_transport(mut self, http: Arc<dyn Transport>) -> Self {
        self.http = http;
        self
    }

    pub fn with_host_lookup(mut self, dns: Arc<dyn HostLookup>) -> Self {
        self.dns = dns;
        self
    }

    pub fn with_hop_observer(mut self, observer: HopObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &WhoisConfig {
        &self.config
    }

    /// Resolve `target`, following referrals when `deep` is set.
    ///
    /// Never fails: errors end up in [`Record::errors`] and whatever was
    /// merged before the failure is kept.
    pub async fn resolve(&self, target: &str, deep: bool) -> Record {
        self.lookup(target, deep).await.unwrap_or_else(|e| {
            warn!(target = %target, error = %e, "WHOIS resolution failed");
            Record {
                errors: vec![e.to_string()],
                ..Record::default()
            }
        })
    }

    /// Like [`resolve`](Self::resolve) but surfaces failures that stop the
    /// chain before the first hop (bad input, no server for the TLD).
    #[instrument(skip(self))]
    pub async fn lookup(&self, target: &str, deep: bool) -> Result<Record> {
        let target = Target::parse(target)?;
        let entry = self
            .servers
            .find(&target)
            .ok_or_else(|| WhorlError::NoServerSpecified(target.query.clone()))?;
        let spec = ServerSpec::parse(&entry.server)?;
        Ok(self.run(target, spec, entry.handler, deep).await)
    }

    /// Start the chain at an explicit server instead of the server table.
    #[instrument(skip(self))]
    pub async fn lookup_with_server(
        &self,
        target: &str,
        server: &str,
        deep: bool,
    ) -> Result<Record> {
        let target = Target::parse(target)?;
        let spec = ServerSpec::parse(server)?;
        let handler = self.handler_for(&spec);
        Ok(self.run(target, spec, handler, deep).await)
    }

    async fn run(
        &self,
        target: Target,
        spec: ServerSpec,
        handler: Option<String>,
        deep: bool,
    ) -> Record {
        let mut ctx = ResolutionContext {
            descriptor: QueryDescriptor::new(target.kind, target.query.clone()),
            target,
            record: Record::new(),
            visited: HashSet::new(),
            seen_blocks: HashSet::new(),
            pending: VecDeque::from([PendingQuery::authority(spec, handler)]),
            deadline: Instant::now() + self.config.request_timeout(),
            deep,
            hops: 0,
            state: ResolveState::Init,
            args: ArgsContext::new(self.config.client_ip),
        };

        while let Some(next) = ctx.pending.pop_front() {
            if !ctx.deep && ctx.hops > 0 {
                break;
            }
            if Instant::now() >= ctx.deadline {
                warn!(server = %next.spec.host, "Request deadline exhausted");
                ctx.descriptor
                    .record_error(WhorlError::ReadTimeout(next.spec.host.clone()));
                break;
            }

            if next.kind == HopKind::Authority && !ctx.visited.insert(next.spec.hostname()) {
                debug!(server = %next.spec.host, "Skipping already visited server");
                continue;
            }

            ctx.transition(ResolveState::Querying);
            ctx.hops += 1;
            ctx.descriptor
                .retarget(&next.spec, self.config.port, next.handler.clone());
            self.prepare_args(&mut ctx).await;
            ctx.descriptor.apply_args(next.args.as_deref(), &ctx.args);
            if let Some(observer) = &self.observer {
                observer(&ctx.descriptor.hop());
            }

            let transport = if ctx.descriptor.is_http() {
                &self.http
            } else {
                &self.transport
            };
            let raw = match transport.send(&mut ctx.descriptor, ctx.deadline).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(server = %ctx.descriptor.server, error = %e, "WHOIS query failed");
                    if !e.is_recorded_by_transport() {
                        ctx.descriptor.record_error(&e);
                    }
                    continue;
                }
            };

            ctx.transition(ResolveState::Parsing);
            self.absorb(&mut ctx, raw);

            if !ctx.pending.is_empty() && ctx.deep {
                ctx.transition(ResolveState::Referring);
            }
        }

        self.finish(ctx).await
    }

    fn handler_for(&self, spec: &ServerSpec) -> Option<String> {
        self.parsers
            .handler_for_host(&spec.hostname())
            .map(str::to_string)
    }

    /// Resolve the client's reverse name once, only when a template needs it.
    async fn prepare_args(&self, ctx: &mut ResolutionContext) {
        let needs_hostname = ctx
            .descriptor
            .args_template
            .as_deref()
            .is_some_and(|t| t.contains("{hname}"));
        if needs_hostname && ctx.args.client_hostname.is_none() {
            let hostname = timeout_at(ctx.deadline, self.dns.reverse(ctx.args.client_ip))
                .await
                .ok()
                .flatten();
            let fallback = ctx.args.client_ip.to_string();
            ctx.args.client_hostname = Some(hostname.unwrap_or(fallback));
        }
    }

    /// Merge one response into the record and queue what it points at.
    fn absorb(&self, ctx: &mut ResolutionContext, raw: RawResponse) {
        ctx.record.push_hop(ctx.descriptor.hop());
        ctx.record.append_raw(&raw.lines);

        if let Some(ip) = ctx.target.ip {
            let listing = parse_listing(&raw.lines);
            if !listing.is_empty() {
                debug!(blocks = listing.len(), "Network listing received");
                for entry in listing.iter().filter(|entry| entry.contains(&ip)) {
                    if let Some(registry) = owner_registry(&entry.owner) {
                        match ServerSpec::parse(registry) {
                            Ok(spec) => {
                                let handler = self.handler_for(&spec);
                                ctx.pending.push_back(PendingQuery::authority(spec, handler));
                            }
                            Err(e) => ctx.descriptor.record_error(&e),
                        }
                        break;
                    }
                    if !ctx.seen_blocks.insert(entry.handle.clone()) {
                        continue;
                    }
                    ctx.pending.push_back(PendingQuery {
                        spec: ServerSpec {
                            host: ctx.descriptor.server.clone(),
                            port: Some(ctx.descriptor.port),
                            args_template: None,
                        },
                        handler: ctx.descriptor.assigned_handler.clone(),
                        args: Some(format!("n {}", entry.handle)),
                        kind: HopKind::SubBlock,
                    });
                }
                return;
            }
        }

        let host = ctx.descriptor.hostname();
        let parser = match self
            .parsers
            .select(ctx.descriptor.assigned_handler.as_deref(), &host)
        {
            Ok(parser) => parser,
            Err(e) => {
                warn!(host = %host, error = %e, "No parser for response");
                ctx.descriptor.record_error(&e);
                return;
            }
        };
        debug!(host = %host, handler = %parser.name(), "Parsing response");

        let mut hop = parser.parse(&raw.lines, &ctx.target.query);
        if ctx.target.kind == TargetType::As {
            if let Some(network) = hop.registrant.remove("network") {
                hop.registrant.insert("AS".to_string(), network);
            }
        }

        ctx.record.merge_registrant(hop.registrant);
        ctx.record.merge_registry(hop.registry);

        if !ctx.deep {
            return;
        }
        for referral in hop.referrals {
            match ServerSpec::parse(&referral.server) {
                Ok(spec) => {
                    debug!(referral = %spec, "Queueing referral");
                    let handler = referral.handler.or_else(|| self.handler_for(&spec));
                    ctx.pending.push_back(PendingQuery::authority(spec, handler));
                }
                Err(e) => ctx.descriptor.record_error(&e),
            }
        }
    }

    async fn finish(&self, mut ctx: ResolutionContext) -> Record {
        if ctx.record.registry_info.servers.is_empty() {
            ctx.transition(ResolveState::Failed);
        } else {
            ctx.transition(ResolveState::Done);
        }

        if ctx.record.registry_info.kind.is_none() {
            ctx.record.registry_info.kind = Some(ctx.target.kind);
        }
        ctx.record.errors = std::mem::take(&mut ctx.descriptor.errors);

        if self.config.annotate_nameservers {
            annotate_nameservers(
                &mut ctx.record.registrant_info,
                self.dns.as_ref(),
                ctx.deadline,
            )
            .await;
        }
        ctx.record
    }
}
