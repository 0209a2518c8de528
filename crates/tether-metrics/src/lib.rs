//! Tether Call Status
//!
//! Per-endpoint and per-method call accounting for the client pipeline.
//!
//! - [`RpcStatus`]: lock-free counters for one URL or one URL+method pair
//! - [`RpcStatusRegistry`]: shared table of statuses, fed by the active-calls
//!   filter and read by the least-active load balancer
//! - [`ActiveCall`]: guard that ends a counted call when dropped
//! - [`StatusSnapshot`]: serializable point-in-time view
//!
//! # Usage Example
//!
//! ```rust
//! use tether_common::ServiceUrl;
//! use tether_metrics::RpcStatusRegistry;
//!
//! let registry = RpcStatusRegistry::new();
//! let url = ServiceUrl::new("jsonrpc", "127.0.0.1", 20000, "com.Greeter");
//!
//! registry.begin_count(&url, "Hello");
//! assert_eq!(registry.method_status(&url, "Hello").active(), 1);
//!
//! registry.end_count(&url, "Hello", true);
//! assert_eq!(registry.method_status(&url, "Hello").active(), 0);
//! assert_eq!(registry.snapshot().total_calls, 1);
//! ```
//!
//! # Thread Safety
//!
//! Counters are atomics; the status table sits behind a `parking_lot::RwLock`
//! that is only write-locked the first time a key is seen.

mod snapshot;
mod status;

pub use snapshot::{StatusEntry, StatusSnapshot};
pub use status::{ActiveCall, RpcStatus, RpcStatusRegistry};
