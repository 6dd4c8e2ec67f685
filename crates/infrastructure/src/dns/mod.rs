//! DNS resolution engine: wire codec, the four query transports, the
//! serial A/AAAA resolver, and the decorators that stack on top of it.

pub mod cache;
pub mod chain;
pub mod codec;
pub mod idna;
pub mod serial;
pub mod system;
pub mod trace;
pub mod transport;

pub use cache::CacheResolver;
pub use chain::ChainResolver;
pub use idna::IdnaResolver;
pub use serial::SerialResolver;
pub use system::SystemResolver;
pub use trace::TraceResolver;
