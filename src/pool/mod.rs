//! Bounded object pools.
//!
//! Pools are the engine's backpressure mechanism: when a downstream resource
//! (a pooled request wrapper, an outgoing byte buffer) is exhausted,
//! [`ResourcePool::acquire`] blocks the producing thread until a consumer
//! releases one. This is the only intentional blocking point in the engine,
//! deliberately trading throughput for bounded memory.
//!
//! Two acquisition policies exist:
//!
//! - **Bounded** (default): acquisition succeeds while the live count is
//!   below `maximum`, instantiating new resources on demand; the
//!   `maximum + 1`th concurrent acquire blocks until a release.
//! - **Capped**: acquisition additionally blocks once more than half of
//!   `maximum` resources have been instantiated and none are idle, giving
//!   gradual backpressure before the hard cutoff.

mod request;
mod resource;

pub use request::{request_pool, PooledRequest};
pub use resource::ResourcePool;
