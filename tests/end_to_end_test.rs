//! End-to-End Tests
//!
//! A consumer reference assembled from [`ReferenceConfig`] against the
//! in-process registry and real JSON-RPC providers:
//!
//! ```text
//! ReferenceConfig::refer -> failover cluster -> RegistryDirectory
//!     -> ActiveFilter -> JsonRpcInvoker -> TestProvider
//! ```

mod common;

use std::sync::Arc;

use common::{dead_provider_url, init_tracing, wait_until, TestProvider, SERVICE};
use serde_json::json;
use tether::{
    ExtensionRegistry, Invocation, Invoker, MemoryRegistry, ReferenceConfig, Registry, ReplySlot,
    RpcStatusRegistry, ServiceUrl, TetherError,
};

fn registry() -> Arc<MemoryRegistry> {
    Arc::new(MemoryRegistry::new(ServiceUrl::new("memory", "127.0.0.1", 2181, "")))
}

fn reference() -> ReferenceConfig {
    ReferenceConfig {
        interface: SERVICE.to_string(),
        ..Default::default()
    }
}

async fn refer(
    config: &ReferenceConfig,
    registry: &Arc<MemoryRegistry>,
    extensions: &Arc<ExtensionRegistry>,
) -> Arc<dyn Invoker> {
    let invoker = config
        .refer(vec![registry.clone() as Arc<dyn Registry>], extensions.clone())
        .await
        .unwrap();
    assert!(
        wait_until(|| async { invoker.is_available() }).await,
        "no provider became available"
    );
    invoker
}

fn get_user() -> (Invocation, ReplySlot) {
    let reply = ReplySlot::new();
    let invocation = Invocation::new("GetUser", vec![json!("A001")]).with_reply(reply.clone());
    (invocation, reply)
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn test_call_through_registry() {
    init_tracing();
    let provider = TestProvider::start().await;
    let registry = registry();
    registry.register(provider.url()).await.unwrap();

    let extensions = Arc::new(ExtensionRegistry::with_defaults());
    let invoker = refer(&reference(), &registry, &extensions).await;

    let (invocation, reply) = get_user();
    let result = invoker.invoke(&invocation).await.unwrap();

    let expected = json!({"provider": provider.port, "args": ["A001"]});
    assert_eq!(result.value, Some(expected.clone()));
    assert_eq!(reply.get(), Some(expected));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_active_filter_records_calls() {
    let provider = TestProvider::start().await;
    let registry = registry();
    registry.register(provider.url()).await.unwrap();

    let status = Arc::new(RpcStatusRegistry::new());
    let extensions = Arc::new(ExtensionRegistry::with_status(status.clone()));
    let invoker = refer(&reference(), &registry, &extensions).await;

    for _ in 0..3 {
        let (invocation, _) = get_user();
        invoker.invoke(&invocation).await.unwrap();
    }
    let failing = Invocation::new("Fail", vec![]).with_reply(ReplySlot::new());
    assert!(invoker.invoke(&failing).await.is_err());

    let snapshot = status.snapshot();
    assert_eq!(snapshot.total_calls, 4);
    assert_eq!(snapshot.failed_calls, 1);
    assert_eq!(snapshot.active_calls, 0);
}

#[tokio::test]
async fn test_round_robin_spreads_calls() {
    let a = TestProvider::start().await;
    let b = TestProvider::start().await;
    let registry = registry();
    registry.register(a.url()).await.unwrap();
    registry.register(b.url()).await.unwrap();

    let config = ReferenceConfig {
        loadbalance: Some("roundrobin".to_string()),
        ..reference()
    };
    let extensions = Arc::new(ExtensionRegistry::with_defaults());
    let invoker = refer(&config, &registry, &extensions).await;
    let directory_ready = wait_until(|| async {
        let (invocation, _) = get_user();
        invoker.invoke(&invocation).await.is_ok() && a.calls() > 0 && b.calls() > 0
    })
    .await;
    assert!(directory_ready);

    let before = (a.calls(), b.calls());
    for _ in 0..10 {
        let (invocation, _) = get_user();
        invoker.invoke(&invocation).await.unwrap();
    }
    assert_eq!(a.calls() - before.0, 5);
    assert_eq!(b.calls() - before.1, 5);
}

// ============================================================================
// Failover
// ============================================================================

#[tokio::test]
async fn test_fails_over_from_dead_provider() {
    let healthy = TestProvider::start().await;
    let registry = registry();
    registry.register(dead_provider_url().await).await.unwrap();
    registry.register(healthy.url()).await.unwrap();

    let extensions = Arc::new(ExtensionRegistry::with_defaults());
    let invoker = refer(&reference(), &registry, &extensions).await;

    for _ in 0..10 {
        let (invocation, _) = get_user();
        let result = invoker.invoke(&invocation).await.unwrap();
        assert_eq!(result.value.unwrap()["provider"], healthy.port);
    }
    assert_eq!(healthy.calls(), 10);
}

#[tokio::test]
async fn test_retries_exhausted_lists_tried_providers() {
    let registry = registry();
    for _ in 0..3 {
        registry.register(dead_provider_url().await).await.unwrap();
    }

    let config = ReferenceConfig {
        retries: Some(1),
        ..reference()
    };
    let extensions = Arc::new(ExtensionRegistry::with_defaults());
    let invoker = config.refer(vec![registry.clone() as Arc<dyn Registry>], extensions).await.unwrap();
    assert!(wait_until(|| async { invoker.is_available() }).await);

    let (invocation, _) = get_user();
    match invoker.invoke(&invocation).await.unwrap_err() {
        TetherError::RetriesExhausted {
            attempts,
            providers,
            last,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(providers.len(), 2);
            assert_ne!(providers[0], providers[1]);
            assert!(matches!(*last, TetherError::Connection(_)));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_business_error_is_not_retried() {
    let a = TestProvider::start().await;
    let b = TestProvider::start().await;
    let registry = registry();
    registry.register(a.url()).await.unwrap();
    registry.register(b.url()).await.unwrap();

    let extensions = Arc::new(ExtensionRegistry::with_defaults());
    let invoker = refer(&reference(), &registry, &extensions).await;

    let failing = Invocation::new("Fail", vec![]).with_reply(ReplySlot::new());
    let err = invoker.invoke(&failing).await.unwrap_err();
    assert!(matches!(err, TetherError::Business(_)));
    assert_eq!(a.calls() + b.calls(), 1);
}

// ============================================================================
// Provider Changes
// ============================================================================

#[tokio::test]
async fn test_unregistered_provider_stops_receiving_calls() {
    let a = TestProvider::start().await;
    let b = TestProvider::start().await;
    let registry = registry();
    registry.register(a.url()).await.unwrap();
    registry.register(b.url()).await.unwrap();

    let extensions = Arc::new(ExtensionRegistry::with_defaults());
    let invoker = refer(&reference(), &registry, &extensions).await;

    registry.unregister(&a.url()).await.unwrap();
    // one more call may still land on a while the delete is applied
    assert!(
        wait_until(|| async {
            let before = a.calls();
            let (invocation, _) = get_user();
            invoker.invoke(&invocation).await.is_ok() && a.calls() == before
        })
        .await
    );

    let before = a.calls();
    for _ in 0..10 {
        let (invocation, _) = get_user();
        let result = invoker.invoke(&invocation).await.unwrap();
        assert_eq!(result.value.unwrap()["provider"], b.port);
    }
    assert_eq!(a.calls(), before);
}

#[tokio::test]
async fn test_all_providers_gone_is_no_provider() {
    let provider = TestProvider::start().await;
    let registry = registry();
    registry.register(provider.url()).await.unwrap();

    let extensions = Arc::new(ExtensionRegistry::with_defaults());
    let invoker = refer(&reference(), &registry, &extensions).await;

    registry.unregister(&provider.url()).await.unwrap();
    assert!(wait_until(|| async { !invoker.is_available() }).await);

    let (invocation, _) = get_user();
    let err = invoker.invoke(&invocation).await.unwrap_err();
    assert!(matches!(err, TetherError::NoProvider { .. }));
    assert!(err.to_string().contains(SERVICE));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_destroyed_reference() {
    let provider = TestProvider::start().await;
    let registry = registry();
    registry.register(provider.url()).await.unwrap();

    let extensions = Arc::new(ExtensionRegistry::with_defaults());
    let invoker = refer(&reference(), &registry, &extensions).await;
    assert_eq!(registry.subscription_count(), 1);

    invoker.destroy();
    invoker.destroy();

    assert!(!invoker.is_available());
    assert_eq!(registry.subscription_count(), 0);
    let (invocation, _) = get_user();
    let err = invoker.invoke(&invocation).await.unwrap_err();
    assert!(matches!(err, TetherError::Destroyed { .. }));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_direct_reference_skips_registry() {
    let a = TestProvider::start().await;
    let b = TestProvider::start().await;
    let config = ReferenceConfig {
        url: Some(format!(
            "jsonrpc://127.0.0.1:{};jsonrpc://127.0.0.1:{}",
            a.port, b.port
        )),
        ..reference()
    };

    let invoker = config
        .refer(Vec::new(), Arc::new(ExtensionRegistry::with_defaults()))
        .await
        .unwrap();
    for _ in 0..4 {
        let (invocation, _) = get_user();
        invoker.invoke(&invocation).await.unwrap();
    }
    assert_eq!(a.calls() + b.calls(), 4);
}
