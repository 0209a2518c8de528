use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tether_common::{Invocation, Invoker};

use super::{weight, LoadBalance};

/// Selection state of one invoker within a service and method.
struct WeightedEntry {
    invoker: Weak<dyn Invoker>,
    current: i64,
}

/// Smooth weighted round robin, one cycle per service and method.
///
/// Every pick adds each candidate's weight to its running score, takes the
/// highest score and subtracts the total weight from it. Equal weights give
/// plain rotation; a provider of weight 3 next to one of weight 1 is picked
/// three times per cycle of four, spread out rather than back to back.
///
/// Entries of destroyed or dropped invokers are discarded on the next pick.
#[derive(Default)]
pub struct RoundRobinLoadBalance {
    cycles: RwLock<HashMap<String, Arc<Mutex<Vec<WeightedEntry>>>>>,
}

impl RoundRobinLoadBalance {
    pub const NAME: &'static str = "roundrobin";

    pub fn new() -> Self {
        Self::default()
    }

    fn cycle(&self, key: &str) -> Arc<Mutex<Vec<WeightedEntry>>> {
        if let Some(cycle) = self.cycles.read().get(key) {
            return cycle.clone();
        }
        self.cycles.write().entry(key.to_string()).or_default().clone()
    }

    /// Number of invokers with selection state, across all cycles.
    pub fn tracked_invokers(&self) -> usize {
        self.cycles.read().values().map(|cycle| cycle.lock().len()).sum()
    }
}

impl std::fmt::Debug for RoundRobinLoadBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobinLoadBalance")
            .field("cycles", &self.cycles.read().len())
            .finish()
    }
}

impl LoadBalance for RoundRobinLoadBalance {
    fn select(&self, invokers: &[Arc<dyn Invoker>], invocation: &Invocation) -> Option<Arc<dyn Invoker>> {
        let first = invokers.first()?;
        if invokers.len() == 1 {
            return Some(first.clone());
        }

        let key = format!("{}.{}", first.url().service_key(), invocation.method_name());
        let cycle = self.cycle(&key);
        let mut entries = cycle.lock();
        entries.retain(|entry| {
            entry
                .invoker
                .upgrade()
                .is_some_and(|invoker| !invoker.is_destroyed())
        });

        let weights: Vec<i64> = invokers
            .iter()
            .map(|invoker| i64::try_from(weight(invoker.as_ref(), invocation)).unwrap_or(i64::MAX))
            .collect();
        let uniform = weights.iter().all(|weight| *weight == 0);

        let mut total: i64 = 0;
        let mut best: Option<(usize, usize, i64)> = None;
        for (index, invoker) in invokers.iter().enumerate() {
            let weight = if uniform { 1 } else { weights[index] };
            total = total.saturating_add(weight);

            let position = match entries
                .iter()
                .position(|entry| std::ptr::addr_eq(entry.invoker.as_ptr(), Arc::as_ptr(invoker)))
            {
                Some(position) => position,
                None => {
                    entries.push(WeightedEntry {
                        invoker: Arc::downgrade(invoker),
                        current: 0,
                    });
                    entries.len() - 1
                }
            };
            let entry = &mut entries[position];
            entry.current = entry.current.saturating_add(weight);
            if best.map_or(true, |(_, _, current)| entry.current > current) {
                best = Some((index, position, entry.current));
            }
        }

        let (index, position, _) = best?;
        let entry = &mut entries[position];
        entry.current = entry.current.saturating_sub(total);
        Some(invokers[index].clone())
    }
}
