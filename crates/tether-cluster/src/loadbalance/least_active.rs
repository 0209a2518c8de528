use std::sync::Arc;

use tether_common::{Invocation, Invoker};
use tether_metrics::RpcStatusRegistry;

use super::{pick_weighted, LoadBalance};

/// Picks the invoker with the fewest in-flight calls for the method,
/// weighted-random among ties.
///
/// In-flight counts come from the status registry fed by the active-calls
/// filter, so invokers must be wrapped with that filter for this policy to
/// see anything but zeros.
#[derive(Debug, Clone)]
pub struct LeastActiveLoadBalance {
    status: Arc<RpcStatusRegistry>,
}

impl LeastActiveLoadBalance {
    pub const NAME: &'static str = "leastactive";

    pub fn new(status: Arc<RpcStatusRegistry>) -> Self {
        Self { status }
    }
}

impl LoadBalance for LeastActiveLoadBalance {
    fn select(&self, invokers: &[Arc<dyn Invoker>], invocation: &Invocation) -> Option<Arc<dyn Invoker>> {
        let method = invocation.method_name();
        let mut least = u64::MAX;
        let mut ties: Vec<Arc<dyn Invoker>> = Vec::new();

        for invoker in invokers {
            let active = self.status.method_status(invoker.url(), method).active();
            if active < least {
                least = active;
                ties.clear();
            }
            if active == least {
                ties.push(invoker.clone());
            }
        }
        pick_weighted(&ties, invocation)
    }
}
