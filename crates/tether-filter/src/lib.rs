//! Tether Filters
//!
//! Filters decorate an [`Invoker`](tether_common::Invoker) with cross-cutting
//! behavior. Each filter sees the call on the way in ([`Filter::invoke`]) and
//! the outcome on the way out ([`Filter::on_response`]), including errors and
//! panics raised further down the chain.
//!
//! [`build_invoker_chain`] nests a list of filters around an invoker; the
//! first filter in the list is the outermost.

mod active;
mod chain;

pub use active::ActiveFilter;
pub use chain::{build_invoker_chain, Filter, FilterInvoker};
