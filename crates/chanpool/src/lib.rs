//! chanpool: Shared client handles, pooled per identity
//!
//! Callers acquire a client handle for a set of connection parameters and
//! release it when done. Handles are partitioned by identity (credentials,
//! endpoint and options) and each identity spreads its callers over a
//! configurable number of channels, preferring the least-loaded one.

pub mod collection;
pub mod diagnostics;
pub mod identity;
pub mod lease;
pub mod registry;
pub mod soak;

pub use collection::OrderedLeaseCollection;
pub use diagnostics::{IdentitySummary, LeaseSnapshot};
pub use identity::IdentityPool;
pub use lease::{ClientLease, LeaseStatus};
pub use registry::PoolRegistry;
