mod client;
pub mod descriptor;
pub mod extract;
pub mod http;
pub mod merge;
pub mod parsers;
pub mod record;
pub mod referral;
pub mod servers;
pub mod transport;

pub use client::{HopObserver, ResolveState, WhoisClient};
pub use descriptor::{ArgsContext, QueryDescriptor, QueryStatus, ServerSpec};
pub use http::HttpTransport;
pub use parsers::{ParsedHop, ParserRegistry, Referral, RegistryParser, PARSER_REGISTRY};
pub use record::{Field, FieldMap, Record, RegistryInfo, ServerHop};
pub use servers::{ServerEntry, ServerTable, StaticServerTable};
pub use transport::{RawResponse, TcpTransport, Transport};
