//! URL parameter keys and their defaults.

// Identity
pub const INTERFACE_KEY: &str = "interface";
pub const GROUP_KEY: &str = "group";
pub const VERSION_KEY: &str = "version";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const APPLICATION_KEY: &str = "application";

// Invocation pipeline
pub const CLUSTER_KEY: &str = "cluster";
pub const LOADBALANCE_KEY: &str = "loadbalance";
pub const RETRIES_KEY: &str = "retries";
pub const RETRY_BUSINESS_KEY: &str = "retry.business";
pub const AVAILABLE_CHECK_KEY: &str = "cluster.availablecheck";
pub const REFERENCE_FILTER_KEY: &str = "reference.filter";
pub const WEIGHT_KEY: &str = "weight";
pub const TIMEOUT_KEY: &str = "timeout";
pub const ASYNC_KEY: &str = "async";

/// Prefix for per-method overrides, e.g. `methods.GetUser.retries`.
pub const METHODS_PREFIX: &str = "methods.";

pub const DEFAULT_CLUSTER: &str = "failover";
pub const DEFAULT_LOADBALANCE: &str = "random";
pub const DEFAULT_RETRIES: i64 = 2;
pub const DEFAULT_WEIGHT: i64 = 100;
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_REFERENCE_FILTERS: &str = "active";

// Registries
/// Scheme of a direct URL entry that names a registry instead of a provider.
pub const REGISTRY_PROTOCOL: &str = "registry";
/// Marks the registry preferred by the `registryaware` cluster.
pub const REGISTRY_DEFAULT_KEY: &str = "default";

/// Reference parameters that override a discovered provider's value when
/// the reference sets them explicitly.
pub const REFERENCE_OVERRIDE_KEYS: [&str; 3] = [CLUSTER_KEY, LOADBALANCE_KEY, RETRIES_KEY];
