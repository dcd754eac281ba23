//! Request coalescing for async data access.
//!
//! [`SingleFlightCache`] collapses concurrent fetches that share a key into
//! one underlying call, hands every caller the same outcome, and keeps the
//! settled entry around for a short grace period before evicting it.
//! [`TtlCache`] is the plain time-bounded memo used next to it for values
//! that stay valid for minutes rather than milliseconds.

mod cache;
mod single_flight;

pub mod error;
pub mod key;

pub use cache::KVCache;
pub use cache::ttl::TtlCache;
pub use error::{Error, KeyError, Result};
pub use key::{CompositeKey, CompositeKeyBuilder, KeyPart, RequestKey};
pub use single_flight::{
    DEFAULT_GRACE_PERIOD, Flight, FlightState, FlightStats, SingleFlightCache, SingleFlightConfig,
};
