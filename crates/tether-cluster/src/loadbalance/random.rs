use std::sync::Arc;

use tether_common::{Invocation, Invoker};

use super::{pick_weighted, LoadBalance};

/// Random selection weighted by each invoker's `weight` parameter.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomLoadBalance;

impl RandomLoadBalance {
    pub const NAME: &'static str = "random";

    pub fn new() -> Self {
        Self
    }
}

impl LoadBalance for RandomLoadBalance {
    fn select(&self, invokers: &[Arc<dyn Invoker>], invocation: &Invocation) -> Option<Arc<dyn Invoker>> {
        pick_weighted(invokers, invocation)
    }
}
