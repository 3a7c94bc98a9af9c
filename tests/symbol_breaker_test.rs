//! Per-symbol circuit breaker behavior through the execution engine.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stealthflow::application::execution::{BreakerConfig, ExecutionConfig, ExecutionEngine};
use stealthflow::domain::errors::ExecutionError;
use stealthflow::domain::order::{ExecutionTactic, OrderIntent, OrderSide};
use stealthflow::infrastructure::mock::MockBroker;
use rust_decimal_macros::dec;

fn engine(broker: Arc<MockBroker>, cooldown: Duration) -> ExecutionEngine {
    let config = ExecutionConfig {
        jitter_range_ms: (0, 1),
        size_variance: 0.0,
        chunk_variance: 0.0,
        decoy_probability: 0.0,
        breaker: BreakerConfig {
            max_consecutive_failures: 3,
            cooldown,
        },
        ..ExecutionConfig::default()
    };
    ExecutionEngine::new(broker, config, Arc::new(Mutex::new(StdRng::seed_from_u64(9))))
}

fn tsla_intent() -> OrderIntent {
    OrderIntent {
        symbol: "TSLA".to_string(),
        side: OrderSide::Buy,
        total_quantity: dec!(10),
        reference_price: dec!(250),
        tactic: ExecutionTactic::Simple,
    }
}

#[tokio::test]
async fn breaker_trips_then_resets_after_cooldown() {
    let broker = Arc::new(MockBroker::new());
    broker.fail_orders_at(vec![0, 1, 2]);
    let engine = engine(broker.clone(), Duration::from_secs(1));

    // Three consecutive broker failures for TSLA.
    for _ in 0..3 {
        let result = engine.execute(&tsla_intent()).await.unwrap();
        assert!(!result.success);
    }

    // Immediately after: the breaker is open and no broker call is made.
    let calls_before = broker.placed_orders().len();
    let err = engine.execute(&tsla_intent()).await.unwrap_err();
    match err {
        ExecutionError::SymbolBreakerOpen { symbol, retry_in } => {
            assert_eq!(symbol, "TSLA");
            assert!(retry_in <= Duration::from_secs(1));
        }
    }
    assert_eq!(broker.placed_orders().len(), calls_before);

    // After the cooldown a succeeding order closes the breaker.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let result = engine.execute(&tsla_intent()).await.unwrap();
    assert!(result.success);
    assert!(!engine.breakers().is_tripped("TSLA"));

    // Subsequent requests flow normally.
    let result = engine.execute(&tsla_intent()).await.unwrap();
    assert!(result.success);
}

#[tokio::test]
async fn other_symbols_flow_while_one_is_barred() {
    let broker = Arc::new(MockBroker::new());
    broker.fail_orders_at(vec![0, 1, 2]);
    let engine = engine(broker.clone(), Duration::from_secs(60));

    for _ in 0..3 {
        let _ = engine.execute(&tsla_intent()).await.unwrap();
    }
    assert!(engine.breakers().is_tripped("TSLA"));

    let aapl = OrderIntent {
        symbol: "AAPL".to_string(),
        ..tsla_intent()
    };
    let result = engine.execute(&aapl).await.unwrap();
    assert!(result.success);
}
