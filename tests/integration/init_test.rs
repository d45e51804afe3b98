mod support;

use std::sync::Arc;
use std::time::Duration;

use rabbit_log::{
    Bootstrap, InitError, LogError, PublishError, SupervisorState, CODE_FATAL, CODE_PANIC,
};
use serde_json::{json, Value};
use support::{logger_config, MockTransport};

async fn explode() {
    panic!("boom")
}

#[inline(never)]
async fn fail_inside_order_handler(order_id: u32) -> u32 {
    if order_id > 0 {
        panic!("order {} has no lines", order_id);
    }
    order_id
}

fn payload(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test(start_paused = true)]
async fn concurrent_init_runs_one_connect_sequence() {
    let mock = MockTransport::new();
    mock.set_dial_delay(Duration::from_millis(200));
    let bootstrap = Arc::new(Bootstrap::<MockTransport>::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let bootstrap = Arc::clone(&bootstrap);
            let mock = mock.clone();
            tokio::spawn(async move { bootstrap.init(mock, logger_config("orders")).await })
        })
        .collect();

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(mock.dial_count(), 1);
    assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    assert_eq!(clients[0].supervisor().state(), SupervisorState::Connected);
}

#[tokio::test(start_paused = true)]
async fn init_error_is_cached_for_later_calls() {
    let mock = MockTransport::new();
    let bootstrap = Bootstrap::<MockTransport>::new();

    let first = bootstrap.init(mock.clone(), logger_config("")).await;
    assert_eq!(first.err(), Some(InitError::MissingService));

    let second = bootstrap.init(mock.clone(), logger_config("orders")).await;
    assert_eq!(second.err(), Some(InitError::MissingService));

    assert!(bootstrap.is_initialized());
    assert!(bootstrap.client().is_none());
    assert_eq!(mock.dial_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn init_succeeds_even_when_broker_stays_down() {
    let mock = MockTransport::failing();
    let bootstrap = Bootstrap::<MockTransport>::new();

    let client = bootstrap.init(mock.clone(), logger_config("orders")).await.unwrap();

    assert_eq!(client.supervisor().state(), SupervisorState::Disconnected);
    let err = client.info("lost").await.unwrap_err();
    assert!(matches!(err, LogError::Publish(PublishError::NoChannel)));
}

#[tokio::test(start_paused = true)]
async fn info_ships_the_minimal_payload() {
    let mock = MockTransport::new();
    let bootstrap = Bootstrap::<MockTransport>::new();
    let client = bootstrap.init(mock.clone(), logger_config("orders")).await.unwrap();

    client.info("started").await.unwrap();

    let published = mock.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "log-service.logs");
    assert_eq!(published[0].routing_key, "log");
    assert_eq!(
        payload(&published[0].body),
        json!({"level": 0, "service": "orders", "text": "started"})
    );
}

#[tokio::test(start_paused = true)]
async fn helpers_set_level_project_and_code() {
    let mock = MockTransport::new();
    let bootstrap = Bootstrap::<MockTransport>::new();
    let mut config = logger_config("orders");
    config.project = Some("shop".to_string());
    let client = bootstrap.init(mock.clone(), config).await.unwrap();

    client.error_with_code("payment declined", 402).await.unwrap();
    client.fatal("out of memory").await.unwrap();

    let published = mock.published();
    assert_eq!(
        payload(&published[0].body),
        json!({"level": 1, "project": "shop", "service": "orders", "code": 402, "text": "payment declined"})
    );
    assert_eq!(
        payload(&published[1].body),
        json!({"level": 2, "project": "shop", "service": "orders", "code": CODE_FATAL, "text": "out of memory"})
    );
}

#[tokio::test(start_paused = true)]
async fn guarded_reports_panics_as_fatal() {
    let mock = MockTransport::new();
    let bootstrap = Bootstrap::<MockTransport>::new();
    let client = bootstrap.init(mock.clone(), logger_config("orders")).await.unwrap();

    let ok = client.guarded(async { 7 }).await;
    assert_eq!(ok, Some(7));
    assert!(mock.published().is_empty());

    let failed = client.guarded(explode()).await;
    assert!(failed.is_none());

    let published = mock.published();
    assert_eq!(published.len(), 1);
    let record = payload(&published[0].body);
    assert_eq!(record["level"], json!(2));
    assert_eq!(record["code"], json!(CODE_PANIC));
    assert!(record["text"].as_str().unwrap().starts_with("boom:\n"));
}

#[tokio::test(start_paused = true)]
async fn panic_report_carries_the_panic_site_backtrace() {
    let mock = MockTransport::new();
    let bootstrap = Bootstrap::<MockTransport>::new();
    let client = bootstrap.init(mock.clone(), logger_config("orders")).await.unwrap();

    assert!(client.guarded(fail_inside_order_handler(42)).await.is_none());

    let published = mock.published();
    assert_eq!(published.len(), 1);
    let record = payload(&published[0].body);
    let text = record["text"].as_str().unwrap();
    assert!(text.starts_with("order 42 has no lines:\n"));
    assert!(text.contains("fail_inside_order_handler"), "{}", text);
    assert!(!text.contains("report_panic"), "{}", text);
}

#[tokio::test]
async fn process_wide_helpers_require_init() {
    assert!(rabbit_log::client().is_none());
    assert!(matches!(rabbit_log::info("early").await, Err(LogError::NotInitialized)));
    assert!(matches!(rabbit_log::fatal("early").await, Err(LogError::NotInitialized)));
    assert_eq!(rabbit_log::guarded(async { 1 }).await, Some(1));
}
