//! Netsonde Domain Layer
//!
//! Pure types and policy shared by every measurement component: the failure
//! taxonomy, the error classifier, IP scrubbing, bogon detection, the trace
//! event model and the resolver endpoint grammar. No I/O happens here.
pub mod bogon;
pub mod classify;
pub mod endpoint;
pub mod errors;
pub mod failure;
pub mod scrub;
pub mod trace;

pub use bogon::is_bogon;
pub use classify::{classify, ClassifyExt};
pub use endpoint::{parse_host_port, ResolverEndpoint};
pub use errors::{NetError, TlsErrorKind};
pub use failure::{ClassifiedError, Failure, Operation};
pub use scrub::scrub;
pub use trace::{Event, EventKind, TraceLog};
