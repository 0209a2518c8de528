//! Directories: the live invoker set behind one cluster invoker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tether_common::{Invocation, Invoker, ServiceUrl};

mod registry_directory;
mod static_directory;

pub use registry_directory::RegistryDirectory;
pub use static_directory::StaticDirectory;

pub trait Directory: Send + Sync {
    /// The URL describing this directory; for registry-fed directories the
    /// registry URL, whose `sub_url` is the consumer reference.
    fn url(&self) -> &ServiceUrl;

    /// Invokers applicable to `invocation`; empty once destroyed.
    fn list(&self, invocation: &Invocation) -> Vec<Arc<dyn Invoker>>;

    /// Whether at least one listed invoker is available.
    fn is_available(&self) -> bool;

    fn is_destroyed(&self) -> bool;

    /// Releases every invoker exactly once. Repeated calls are no-ops.
    fn destroy(&self);
}

/// Destroyed flag shared by directory implementations.
#[derive(Debug, Default)]
pub(crate) struct DestroyFlag(AtomicBool);

impl DestroyFlag {
    pub(crate) fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sets the flag; `true` only for the caller that flipped it.
    pub(crate) fn set(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
