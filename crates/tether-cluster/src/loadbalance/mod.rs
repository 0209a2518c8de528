//! Load-balancing policies.
//!
//! A policy picks one invoker from a candidate set. Policies are shared
//! between concurrent calls; any per-policy state is internally synchronized.

use std::sync::Arc;

use tether_common::constants::{DEFAULT_WEIGHT, WEIGHT_KEY};
use tether_common::{Invocation, Invoker};

mod least_active;
mod random;
mod round_robin;

pub use least_active::LeastActiveLoadBalance;
pub use random::RandomLoadBalance;
pub use round_robin::RoundRobinLoadBalance;

pub trait LoadBalance: Send + Sync {
    /// Picks one of `invokers`, or `None` when the slice is empty.
    fn select(&self, invokers: &[Arc<dyn Invoker>], invocation: &Invocation) -> Option<Arc<dyn Invoker>>;
}

/// Configured weight of `invoker` for this call; negative weights count as zero.
pub(crate) fn weight(invoker: &dyn Invoker, invocation: &Invocation) -> u64 {
    invoker
        .url()
        .method_param_int(invocation.method_name(), WEIGHT_KEY, DEFAULT_WEIGHT)
        .max(0) as u64
}

/// Weighted random pick among `candidates`, uniform when all weights match.
pub(crate) fn pick_weighted(
    candidates: &[Arc<dyn Invoker>],
    invocation: &Invocation,
) -> Option<Arc<dyn Invoker>> {
    use rand::Rng;

    match candidates.len() {
        0 => return None,
        1 => return Some(candidates[0].clone()),
        _ => {}
    }

    let weights: Vec<u64> = candidates
        .iter()
        .map(|invoker| weight(invoker.as_ref(), invocation))
        .collect();
    let total = weights.iter().fold(0u64, |total, weight| total.saturating_add(*weight));
    let same_weight = weights.windows(2).all(|pair| pair[0] == pair[1]);

    let mut rng = rand::thread_rng();
    if total == 0 || same_weight {
        return Some(candidates[rng.gen_range(0..candidates.len())].clone());
    }

    let mut offset = rng.gen_range(0..total);
    for (invoker, weight) in candidates.iter().zip(weights) {
        if offset < weight {
            return Some(invoker.clone());
        }
        offset -= weight;
    }
    candidates.last().cloned()
}
