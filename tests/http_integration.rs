#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use std::time::Duration;

use actix_web::{test, App};
use memspeed_agent::growth::{GrowthPolicy, MIB};
use memspeed_agent::{
    healthz, scrape_metrics, start, status, stop, AppState, EngineConfig, Metrics, RunController,
    RunStatus,
};

fn state() -> AppState {
    AppState {
        ctrl: RunController::default(),
        metrics: Metrics::new().unwrap(),
        config: EngineConfig {
            growth: GrowthPolicy {
                initial_chunk: MIB,
                min_chunk: MIB,
                max_attempts: 64,
            },
            sample_interval_ms: 10,
            ..EngineConfig::default()
        },
    }
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(actix_web::web::Data::new($state))
                .service(healthz)
                .service(start)
                .service(stop)
                .service(status)
                .service(scrape_metrics),
        )
        .await
    };
}

macro_rules! get_status {
    ($app:expr) => {{
        let req = test::TestRequest::get().uri("/runs/status").to_request();
        let st: RunStatus = test::call_and_read_body_json(&$app, req).await;
        st
    }};
}

#[actix_web::test]
async fn start_stop_and_metrics() {
    let app = app!(state());

    let req = test::TestRequest::get().uri("/healthz").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // nothing to stop yet
    let req = test::TestRequest::post().uri("/runs/stop").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["applied"], false);

    let req = test::TestRequest::post()
        .uri("/runs")
        .set_json(serde_json::json!({"duration_minutes": 0.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/runs")
        .set_json(serde_json::json!({"duration_minutes": 10.0, "ceiling_bytes": 2 * MIB}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    if !resp.status().is_success() {
        let body = test::read_body(resp).await;
        panic!("/runs start failed: {}", String::from_utf8_lossy(&body));
    }

    let req = test::TestRequest::post()
        .uri("/runs")
        .set_json(serde_json::json!({"duration_minutes": 1.0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::CONFLICT);

    // wait until passes are flowing
    let mut st = get_status!(app);
    for _ in 0..500 {
        if st.last_sample.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        st = get_status!(app);
    }
    assert!(st.last_sample.is_some());
    assert_eq!(st.allocated_bytes, 2 * MIB as u64);
    assert_eq!(
        serde_json::to_value(st.state).unwrap(),
        serde_json::json!("RUNNING")
    );
    assert!(st.system_memory_used_percent > 0.0);
    assert!(st.system_memory_used_percent <= 100.0);

    let req = test::TestRequest::post().uri("/runs/stop").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["applied"], true);

    for _ in 0..500 {
        if !st.running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        st = get_status!(app);
    }
    assert!(!st.running);
    let summary = st.last_summary.expect("summary");
    assert!(summary.loops >= 1);
    assert_eq!(
        serde_json::to_value(summary.reason).unwrap(),
        serde_json::json!("ABORTED")
    );

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("memspeed_runs_total 1"));
    assert!(text.contains("memspeed_run_active 0"));
}

#[actix_web::test]
async fn failed_allocation_is_reported() {
    let app = app!(state());

    let req = test::TestRequest::post()
        .uri("/runs")
        .set_json(serde_json::json!({"duration_minutes": 1.0, "ceiling_bytes": 0}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let mut st = get_status!(app);
    for _ in 0..500 {
        if st.last_failure.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        st = get_status!(app);
    }
    assert!(st.last_failure.is_some());
    assert!(st.last_summary.is_none());
    assert!(st.last_sample.is_none());
    assert!(!st.running);
    // host figure is served even without a live run
    assert!(st.system_memory_used_percent > 0.0);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert!(String::from_utf8_lossy(&body).contains("memspeed_runs_failed_total 1"));
}
