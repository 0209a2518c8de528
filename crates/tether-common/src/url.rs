//! Service URLs
//!
//! A [`ServiceUrl`] identifies one remote endpoint (`protocol://ip:port/path`)
//! together with an open parameter map carrying timeouts, retry counts, the
//! load-balance policy and per-method overrides. Values are immutable once
//! built; every "modification" returns a new value.
//!
//! # Identity
//!
//! - [`ServiceUrl::key`] is the normalized cache identity built from the
//!   protocol, location, path, group, interface and version.
//! - [`ServiceUrl::service_key`] is the logical service identity
//!   (`group/interface:version`) used in diagnostics.
//! - [`ServiceUrl::matches_service`] compares two URLs ignoring host and port,
//!   which is how a subscription decides whether a provider interests it.

use std::collections::BTreeMap;
use std::fmt;

use ::url::form_urlencoded;

use crate::constants::{
    GROUP_KEY, INTERFACE_KEY, METHODS_PREFIX, REFERENCE_OVERRIDE_KEYS, VERSION_KEY,
};
use crate::protocol::error::{Result, TetherError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceUrl {
    protocol: String,
    ip: String,
    port: Option<u16>,
    path: String,
    params: BTreeMap<String, String>,
    sub_url: Option<Box<ServiceUrl>>,
}

impl ServiceUrl {
    /// Creates a URL for an endpoint at `ip:port` exposing `path`.
    pub fn new(
        protocol: impl Into<String>,
        ip: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            ip: ip.into(),
            port: Some(port),
            path: path.into().trim_start_matches('/').to_string(),
            params: BTreeMap::new(),
            sub_url: None,
        }
    }

    /// Creates a location-less URL naming only a service, e.g. a subscription
    /// pattern.
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            path: service.into().trim_start_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Parses `protocol://ip:port/path?key=value&...`.
    ///
    /// # Errors
    /// Returns [`TetherError::Configuration`] when the text has no scheme or
    /// is otherwise not a URL.
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = ::url::Url::parse(raw.trim())?;
        if parsed.cannot_be_a_base() {
            return Err(TetherError::Configuration(format!(
                "URL '{}' has no authority section",
                raw
            )));
        }

        let params = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            protocol: parsed.scheme().to_string(),
            ip: parsed.host_str().unwrap_or_default().to_string(),
            port: parsed.port(),
            path: parsed.path().trim_start_matches('/').to_string(),
            params,
            sub_url: None,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `ip:port`, or just the ip when no port is set.
    pub fn location(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.ip, port),
            None => self.ip.clone(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Logical service name: the `interface` parameter, falling back to the path.
    pub fn service(&self) -> &str {
        match self.param(INTERFACE_KEY) {
            Some(interface) if !interface.is_empty() => interface,
            _ => &self.path,
        }
    }

    pub fn group(&self) -> &str {
        self.param_or(GROUP_KEY, "")
    }

    pub fn version(&self) -> &str {
        self.param_or(VERSION_KEY, "")
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn sub_url(&self) -> Option<&ServiceUrl> {
        self.sub_url.as_deref()
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_sub_url(mut self, sub_url: ServiceUrl) -> Self {
        self.sub_url = Some(Box::new(sub_url));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn param_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.param(key).unwrap_or(default)
    }

    /// Integer parameter; missing or malformed values yield `default`.
    pub fn param_int(&self, key: &str, default: i64) -> i64 {
        self.param(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Boolean parameter; missing or malformed values yield `default`.
    pub fn param_bool(&self, key: &str, default: bool) -> bool {
        self.param(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Looks up `methods.<method>.<key>`, then `<key>`.
    pub fn method_param(&self, method: &str, key: &str) -> Option<&str> {
        self.param(&method_key(method, key))
            .filter(|v| !v.is_empty())
            .or_else(|| self.param(key).filter(|v| !v.is_empty()))
    }

    pub fn method_param_int(&self, method: &str, key: &str, default: i64) -> i64 {
        self.method_param(method, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn method_param_bool(&self, method: &str, key: &str, default: bool) -> bool {
        self.method_param(method, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Normalized identity of this endpoint, used as the invoker cache key.
    pub fn key(&self) -> String {
        format!(
            "{}://{}/{}?group={}&interface={}&version={}",
            self.protocol,
            self.location(),
            self.path,
            self.group(),
            self.service(),
            self.version()
        )
    }

    /// `group/interface:version`, omitting empty parts.
    pub fn service_key(&self) -> String {
        let mut key = String::new();
        let group = self.group();
        if !group.is_empty() {
            key.push_str(group);
            key.push('/');
        }
        key.push_str(self.service());
        let version = self.version();
        if !version.is_empty() && version != "0.0.0" {
            key.push(':');
            key.push_str(version);
        }
        key
    }

    /// Whether this provider URL belongs to the service described by
    /// `subscription`, ignoring host and port.
    ///
    /// An empty protocol, group or version on the subscription side, or `*`
    /// for group and version, matches any value.
    pub fn matches_service(&self, subscription: &ServiceUrl) -> bool {
        if self.service() != subscription.service() {
            return false;
        }
        if !subscription.protocol.is_empty() && subscription.protocol != self.protocol {
            return false;
        }
        wildcard_eq(subscription.group(), self.group())
            && wildcard_eq(subscription.version(), self.version())
    }

    /// Merges a discovered provider URL with the consumer's reference URL.
    ///
    /// The result starts from `provider`. Reference parameters the provider
    /// lacks are filled in, and the reference's explicitly set `cluster`,
    /// `loadbalance` and `retries` (plus their `methods.<m>.` variants)
    /// override the provider's. Empty reference values count as unset.
    /// Neither input is modified.
    pub fn merge_reference(provider: &ServiceUrl, reference: &ServiceUrl) -> ServiceUrl {
        let mut merged = provider.clone();
        for (key, value) in reference.params.iter().filter(|(_, v)| !v.is_empty()) {
            if is_reference_override(key) {
                merged.params.insert(key.clone(), value.clone());
            } else {
                merged
                    .params
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        merged
    }
}

impl fmt::Display for ServiceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.location())?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path)?;
        }
        if !self.params.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter())
                .finish();
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

/// `methods.<method>.<key>`
pub fn method_key(method: &str, key: &str) -> String {
    format!("{}{}.{}", METHODS_PREFIX, method, key)
}

fn is_reference_override(key: &str) -> bool {
    if REFERENCE_OVERRIDE_KEYS.contains(&key) {
        return true;
    }
    key.strip_prefix(METHODS_PREFIX)
        .and_then(|rest| rest.rsplit_once('.'))
        .map(|(_, suffix)| REFERENCE_OVERRIDE_KEYS.contains(&suffix))
        .unwrap_or(false)
}

fn wildcard_eq(pattern: &str, value: &str) -> bool {
    pattern.is_empty() || pattern == "*" || pattern == value
}
