//! Failover behavior of the advisor gateway against scripted providers.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stealthflow::application::advisor::{
    AdvisorGateway, AdvisorTransport, ChatCompletionResponse, GatewayConfig, MasterKey,
    ProviderEndpoint, ProviderId, ProviderKey, ProviderRequest,
};
use stealthflow::domain::errors::GatewayError;
use stealthflow::domain::signal::SignalKind;

const AAPL_BUY: &str =
    r#"{"recommendations": [{"symbol": "AAPL", "decision": "buy", "confidence": 0.8}]}"#;

/// Transport that fails for listed providers (or the first N calls) and
/// counts every call.
struct ScriptedTransport {
    calls: AtomicU32,
    failing: Vec<ProviderId>,
    fail_first: u32,
}

impl ScriptedTransport {
    fn new(failing: Vec<ProviderId>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failing,
            fail_first: 0,
        }
    }

    fn failing_first(count: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failing: Vec::new(),
            fail_first: count,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdvisorTransport for ScriptedTransport {
    async fn chat(
        &self,
        request: &ProviderRequest,
        _bearer: &str,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = call < self.fail_first
            || self
                .failing
                .iter()
                .any(|p| request.base_url == p.default_base_url());
        if failing {
            return Err(GatewayError::Transport {
                reason: "provider unavailable".to_string(),
            });
        }
        serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": AAPL_BUY}}]
        }))
        .map_err(|e| GatewayError::InvalidResponse {
            reason: e.to_string(),
        })
    }
}

fn gateway_with(
    failing: Vec<ProviderId>,
    providers: &[ProviderId],
) -> (AdvisorGateway, Arc<ScriptedTransport>) {
    let master = MasterKey::from_passphrase("integration-test");
    let endpoints: Vec<ProviderEndpoint> = providers
        .iter()
        .map(|id| {
            ProviderEndpoint::new(
                *id,
                vec![ProviderKey::seal_new(&master, &format!("sk-{}", id)).unwrap()],
            )
        })
        .collect();

    let transport = Arc::new(ScriptedTransport::new(failing));
    let config = GatewayConfig {
        max_attempts: 1,
        backoff_base: Duration::from_millis(1),
        ..GatewayConfig::default()
    };
    let gateway = AdvisorGateway::new(
        endpoints,
        master,
        transport.clone(),
        Arc::new(Mutex::new(StdRng::seed_from_u64(3))),
        config,
    );
    (gateway, transport)
}

#[tokio::test]
async fn failover_skips_failing_providers_and_marks_keys() {
    let (gateway, _transport) = gateway_with(
        vec![ProviderId::Requesty, ProviderId::Deepseek],
        &[
            ProviderId::Requesty,
            ProviderId::Deepseek,
            ProviderId::Openrouter,
        ],
    );

    let report = gateway.advise("analyze AAPL today", None).await.unwrap();

    assert_eq!(report.provider, ProviderId::Openrouter);
    assert_eq!(report.recommendations.len(), 1);
    assert_eq!(report.recommendations[0].symbol, "AAPL");
    assert_eq!(report.recommendations[0].decision, SignalKind::Buy);
    assert!((report.recommendations[0].confidence - 0.8).abs() < 1e-9);

    // Both failed providers had their keys marked against the cooldown.
    assert_eq!(gateway.key_error_count(ProviderId::Requesty), 1);
    assert_eq!(gateway.key_error_count(ProviderId::Deepseek), 1);
    assert_eq!(gateway.key_error_count(ProviderId::Openrouter), 0);
}

#[tokio::test]
async fn exhaustion_surfaces_last_error() {
    let (gateway, _transport) = gateway_with(
        vec![ProviderId::Requesty, ProviderId::Deepseek],
        &[ProviderId::Requesty, ProviderId::Deepseek],
    );

    let err = gateway.advise("analyze AAPL today", None).await.unwrap_err();
    match err {
        GatewayError::Exhausted { last } => assert!(last.contains("provider unavailable")),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn cache_hit_issues_single_outbound_call() {
    let (gateway, transport) = gateway_with(vec![], &[ProviderId::Requesty]);

    let first = gateway.advise("analyze AAPL today", None).await.unwrap();
    let second = gateway.advise("analyze AAPL today", None).await.unwrap();

    assert_eq!(transport.calls(), 1);
    assert_eq!(first.recommendations.len(), second.recommendations.len());

    // A different prompt misses the cache.
    gateway.advise("analyze TSLA today", None).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn rate_limited_key_recovers_after_cooldown() {
    let master = MasterKey::from_passphrase("integration-test");
    let endpoints = vec![ProviderEndpoint::new(
        ProviderId::Requesty,
        vec![ProviderKey::seal_new(&master, "sk-only").unwrap()],
    )];
    let transport = Arc::new(ScriptedTransport::failing_first(1));
    let config = GatewayConfig {
        max_attempts: 1,
        key_cooldown: Duration::from_millis(50),
        breaker_threshold: 100,
        ..GatewayConfig::default()
    };
    let gateway = AdvisorGateway::new(
        endpoints,
        master,
        transport.clone(),
        Arc::new(Mutex::new(StdRng::seed_from_u64(3))),
        config,
    );

    // First call fails and marks the only key rate limited.
    assert!(gateway.advise("prompt", None).await.is_err());
    assert_eq!(gateway.key_error_count(ProviderId::Requesty), 1);

    // While the key cools down the provider is skipped entirely.
    let err = gateway.advise("prompt", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Exhausted { .. }));
    assert_eq!(transport.calls(), 1);

    // After the cooldown the key flows again.
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(gateway.advise("prompt", None).await.is_ok());
}
