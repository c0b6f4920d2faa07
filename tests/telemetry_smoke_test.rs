//! Smoke tests for OTLP export.
//!
//! These tests need an OTLP collector feeding Tempo, Prometheus and Loki on
//! their default local ports.
//!
//! Run with:
//! ```sh
//! cargo test --test telemetry_smoke_test -- --ignored --nocapture
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use opentelemetry::KeyValue;
use scripter_rs::model::SessionId;
use scripter_rs::telemetry::session::{record_outcome, record_state_transition, start_session_span};
use scripter_rs::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry, metrics};

const SERVICE: &str = "scripter-smoke-test";

static TELEMETRY: OnceLock<TelemetryGuard> = OnceLock::new();

fn ensure_telemetry() -> &'static TelemetryGuard {
    TELEMETRY.get_or_init(|| {
        init_telemetry(TelemetryConfig {
            endpoint: Some("http://localhost:4317".to_string()),
            service_name: SERVICE.to_string(),
            log_level: "info".to_string(),
        })
        .expect("failed to init telemetry")
    })
}

/// Force-flush all providers and give backends time to ingest.
async fn flush_and_wait(guard: &TelemetryGuard) {
    guard.force_flush();
    tokio::time::sleep(Duration::from_secs(8)).await;
}

async fn query(url: &str, params: &[(&str, &str)]) -> serde_json::Value {
    let resp = reqwest::Client::new()
        .get(url)
        .query(params)
        .send()
        .await
        .expect("query failed");
    assert!(resp.status().is_success(), "{url}: {}", resp.status());
    resp.json().await.expect("response is not json")
}

#[test]
#[ignore]
fn smoke_session_lifecycle() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();
        assert!(guard.is_exporting());

        let id = SessionId::new(uuid::Uuid::new_v4().to_string()).unwrap();
        {
            let span = start_session_span(&id);
            let _enter = span.enter();
            record_state_transition(&span, "idle", "connecting");
            record_state_transition(&span, "connecting", "open");
            tracing::info!(session_id = %id, "smoke test session");
            record_state_transition(&span, "open", "closed");
            record_outcome(&span, "card");
        }

        metrics::sessions_created().add(1, &[]);
        metrics::sessions_finished().add(1, &[KeyValue::new("outcome", "card")]);
        metrics::stream_frames().add(3, &[KeyValue::new("kind", "token")]);
        metrics::session_duration_ms().record(420.0, &[KeyValue::new("outcome", "card")]);

        flush_and_wait(guard).await;

        let tags = format!("service.name={SERVICE}");
        let traces = query(
            "http://localhost:3200/api/search",
            &[("tags", tags.as_str()), ("limit", "5")],
        )
        .await;
        assert!(
            traces["traces"].as_array().is_some_and(|t| !t.is_empty()),
            "expected traces in Tempo, got: {traces}"
        );

        let series = query(
            "http://localhost:9090/api/v1/query",
            &[("query", "scripter_sessions_created_total")],
        )
        .await;
        assert!(
            series["data"]["result"].as_array().is_some_and(|r| !r.is_empty()),
            "expected metric results in Prometheus, got: {series}"
        );

        let selector = format!(r#"{{service_name="{SERVICE}"}}"#);
        let logs = query(
            "http://localhost:3100/loki/api/v1/query_range",
            &[("query", selector.as_str()), ("limit", "10")],
        )
        .await;
        assert!(
            logs["data"]["result"].as_array().is_some_and(|s| !s.is_empty()),
            "expected log streams in Loki, got: {logs}"
        );
    });
}
