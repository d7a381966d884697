#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use actix_web::{get, post, web, App, HttpResponse, HttpServer};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::domain::{AppState, RunController, StartRequest};
use crate::metrics::Metrics;
use crate::service::SpeedTestRunner;

fn runner(data: &web::Data<AppState>) -> SpeedTestRunner {
    SpeedTestRunner::new(data.ctrl.clone(), data.metrics.clone(), data.config.clone())
}

#[post("/runs")]
pub async fn start(payload: web::Json<StartRequest>, data: web::Data<AppState>) -> HttpResponse {
    let req = payload.into_inner();
    let runner = runner(&data);
    info!(minutes = req.duration_minutes, ceiling = ?req.ceiling_bytes, "start run request");
    if runner.is_running() {
        return json_error(
            actix_web::http::StatusCode::CONFLICT,
            "another run is active",
        );
    }
    if let Err(e) = runner.validate_request(&req) {
        return json_error(actix_web::http::StatusCode::BAD_REQUEST, &format!("{e:#}"));
    }
    match runner.start(&req) {
        Ok(_) => HttpResponse::Accepted().json(json!({"status":"ok"})),
        Err(e) => {
            error!(error = %format!("{e:#}"), "start run failed");
            let code = if runner.is_running() {
                actix_web::http::StatusCode::CONFLICT
            } else {
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
            };
            json_error(code, &format!("{e:#}"))
        }
    }
}

#[post("/runs/stop")]
pub async fn stop(data: web::Data<AppState>) -> HttpResponse {
    let applied = runner(&data).stop();
    if applied {
        info!("stop run request accepted");
    } else {
        warn!("stop: no run in progress");
    }
    HttpResponse::Ok().json(json!({"status":"ok","applied":applied}))
}

#[get("/healthz")]
pub async fn healthz(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(runner(&data).health())
}

#[get("/runs/status")]
pub async fn status(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(runner(&data).status())
}

#[get("/metrics")]
pub async fn scrape_metrics(data: web::Data<AppState>) -> HttpResponse {
    match runner(&data).encode_metrics() {
        Ok(buf) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buf),
        Err(e) => {
            error!(error=%format!("{e:#}"), "encode metrics failed");
            HttpResponse::InternalServerError().body("encode metrics failed")
        }
    }
}

pub async fn serve(bind: &str, config: EngineConfig) -> std::io::Result<()> {
    let metrics = Metrics::new().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, format!("metrics init: {e:#}"))
    })?;
    let state = AppState {
        ctrl: RunController::default(),
        metrics,
        config,
    };
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(healthz)
            .service(start)
            .service(stop)
            .service(status)
            .service(scrape_metrics)
    })
    .bind(bind)?
    .run()
    .await
}

fn json_error(code: actix_web::http::StatusCode, reason: &str) -> HttpResponse {
    HttpResponse::build(code).json(json!({"status":"error","reason":reason}))
}
