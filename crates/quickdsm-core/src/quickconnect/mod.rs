pub mod candidates;
pub mod resolver;
pub mod types;

pub use candidates::generate_candidates;
pub use resolver::{ezid, DiscoveryTransport, QuickConnect, ResolveError};
pub use types::{ConnectionCandidate, ConnectionType, Protocol, ResolvedAddress, ServerInfo, TunnelMode};

#[cfg(feature = "client")]
pub use resolver::HttpDiscovery;
