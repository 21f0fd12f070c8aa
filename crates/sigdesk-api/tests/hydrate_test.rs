//! Hydration against a local REST stub.

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sigdesk_api::{hydrate_store, ApiClient};
use sigdesk_core::{Regime, SignalCategory};
use sigdesk_feed::{run_store_consumer, IngestionAdapter, LiveSignalStore, StoreConfig};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

async fn start_stub() -> String {
    let app = Router::new()
        .route("/regime/context", get(|| async { Json(json!({"regime": "squeeze", "confidence": 0.8})) }))
        .route("/regime/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/top/gainers",
            get(|| async {
                Json(json!({"payload": [
                    {"symbol": "SOLUSDT", "change": "+8.2%"},
                    {"symbol": "SUIUSDT", "change": "+6.9%"}
                ]}))
            }),
        )
        .route(
            "/top/losers",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route(
            "/funding",
            get(|| async { Json(json!([{"symbol": "BTCUSDT", "fundingRate": "0.0001"}])) }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_hydrate_fills_store_and_reports_failures() {
    let base = start_stub().await;
    let client = ApiClient::new(base).unwrap();

    let (writer, reader) = LiveSignalStore::create(StoreConfig::default());
    let (tx, rx) = mpsc::channel(16);
    let token = CancellationToken::new();
    let consumer = tokio::spawn(run_store_consumer(writer, rx, token.clone()));
    let adapter = IngestionAdapter::new(tx);

    let report = hydrate_store(&client, &adapter).await;
    assert_eq!(report.healthy, Some(true));
    assert_eq!(report.failed, vec!["/top/losers".to_string()]);
    assert_eq!(report.fetched.len(), 3);
    assert!(!report.is_complete());

    timeout(Duration::from_secs(2), async {
        while reader.revision() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("updates applied");

    assert_eq!(reader.current_regime(), Some(Regime::Squeeze));
    assert_eq!(reader.snapshot(SignalCategory::TopGainers).len(), 2);
    assert_eq!(reader.snapshot(SignalCategory::Funding)[0].symbol(), "BTCUSDT");
    assert!(reader.snapshot(SignalCategory::TopLosers).is_empty());

    token.cancel();
    let _ = timeout(Duration::from_secs(2), consumer).await;
}

#[tokio::test]
async fn test_unhealthy_regime_service_is_reported() {
    let app = Router::new().route(
        "/regime/health",
        get(|| async { Json(json!({"status": "degraded", "healthy": false})) }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let client = ApiClient::new(format!("http://{addr}")).unwrap();

    let (tx, _rx) = mpsc::channel(16);
    let report = hydrate_store(&client, &IngestionAdapter::new(tx)).await;
    assert_eq!(report.healthy, Some(false));
    assert!(report.fetched.is_empty());
    assert_eq!(
        report.failed,
        vec!["/regime/context", "/top/gainers", "/top/losers", "/funding"]
    );
}

#[tokio::test]
async fn test_regime_health() {
    let client = ApiClient::new(start_stub().await).unwrap();
    let health = client.fetch_regime_health().await.unwrap();
    assert!(health.is_healthy());
}

#[tokio::test]
async fn test_status_error_carries_path() {
    let client = ApiClient::new(start_stub().await).unwrap();
    let err = client.fetch_top_movers(false).await.unwrap_err();
    assert!(err.to_string().contains("/top/losers"));
    assert!(err.to_string().contains("500"));
}
