use crate::snapshot::{StatusEntry, StatusSnapshot};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tether_common::ServiceUrl;

/// Call counters for one URL or one URL+method pair.
///
/// `active` is signed so that an unmatched end never wraps; it is clamped
/// at zero when read.
#[derive(Debug, Default)]
pub struct RpcStatus {
    /// Calls dispatched but not yet completed
    active: AtomicI64,
    /// Completed calls, successful or not
    total: AtomicU64,
    /// Completed calls that returned an error
    failed: AtomicU64,
}

impl RpcStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire).max(0) as u64
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.total().saturating_sub(self.failed())
    }

    fn begin(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    fn end(&self, succeeded: bool) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.total.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn entry(&self) -> StatusEntry {
        StatusEntry {
            active: self.active(),
            total: self.total(),
            failed: self.failed(),
        }
    }
}

/// One in-flight call opened by [`RpcStatusRegistry::begin_call`].
///
/// The call ends when the guard is dropped. A guard dropped without
/// [`finish`](Self::finish), because the call panicked or its future was
/// cancelled, records a failure.
#[must_use = "the call ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ActiveCall {
    url: Arc<RpcStatus>,
    method: Arc<RpcStatus>,
    succeeded: bool,
}

impl ActiveCall {
    /// Ends the call with its outcome.
    pub fn finish(mut self, succeeded: bool) {
        self.succeeded = succeeded;
    }
}

impl Drop for ActiveCall {
    fn drop(&mut self) {
        self.url.end(self.succeeded);
        self.method.end(self.succeeded);
    }
}

/// Shared table of [`RpcStatus`] keyed by URL and by URL+method.
///
/// Create one per client and share it (`Arc`) between the active-calls
/// filter and any load balancer that reads the counts.
#[derive(Debug, Default)]
pub struct RpcStatusRegistry {
    urls: RwLock<HashMap<String, Arc<RpcStatus>>>,
    methods: RwLock<HashMap<String, Arc<RpcStatus>>>,
}

impl RpcStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a call to `method` on `url` that ends when the returned guard
    /// is dropped.
    pub fn begin_call(&self, url: &ServiceUrl, method: &str) -> ActiveCall {
        let call = ActiveCall {
            url: self.url_status(url),
            method: self.method_status(url, method),
            succeeded: false,
        };
        call.url.begin();
        call.method.begin();
        call
    }

    /// Records the start of a call to `method` on `url`.
    pub fn begin_count(&self, url: &ServiceUrl, method: &str) {
        self.url_status(url).begin();
        self.method_status(url, method).begin();
    }

    /// Records the completion of a call started with [`begin_count`](Self::begin_count).
    pub fn end_count(&self, url: &ServiceUrl, method: &str, succeeded: bool) {
        self.url_status(url).end(succeeded);
        self.method_status(url, method).end(succeeded);
    }

    /// Status for every call made to `url`, created on first use.
    pub fn url_status(&self, url: &ServiceUrl) -> Arc<RpcStatus> {
        Self::get_or_insert(&self.urls, url.key())
    }

    /// Status for calls of `method` on `url`, created on first use.
    pub fn method_status(&self, url: &ServiceUrl, method: &str) -> Arc<RpcStatus> {
        Self::get_or_insert(&self.methods, method_status_key(url, method))
    }

    /// Forgets the counters of `url` and its methods, once its invoker is gone.
    pub fn remove(&self, url: &ServiceUrl) {
        let key = url.key();
        let prefix = format!("{}#", key);
        self.urls.write().remove(&key);
        self.methods.write().retain(|method, _| !method.starts_with(&prefix));
    }

    /// Forgets every counter. Used when a client is torn down.
    pub fn clear(&self) {
        self.urls.write().clear();
        self.methods.write().clear();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let urls: HashMap<String, StatusEntry> = self
            .urls
            .read()
            .iter()
            .map(|(key, status)| (key.clone(), status.entry()))
            .collect();
        let methods = self
            .methods
            .read()
            .iter()
            .map(|(key, status)| (key.clone(), status.entry()))
            .collect();

        StatusSnapshot {
            active_calls: urls.values().map(|e| e.active).sum(),
            total_calls: urls.values().map(|e| e.total).sum(),
            failed_calls: urls.values().map(|e| e.failed).sum(),
            urls,
            methods,
        }
    }

    fn get_or_insert(table: &RwLock<HashMap<String, Arc<RpcStatus>>>, key: String) -> Arc<RpcStatus> {
        if let Some(status) = table.read().get(&key) {
            return status.clone();
        }
        table.write().entry(key).or_default().clone()
    }
}

fn method_status_key(url: &ServiceUrl, method: &str) -> String {
    format!("{}#{}", url.key(), method)
}
