//! HTTP API: telemetry ingest, history, session lifecycle, export.

use std::sync::Arc;

use actix::Addr;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use validator::Validate;

use crate::config::Config;
use crate::core::export;
use crate::core::session::SessionManager;
use crate::core::source::simulate_burst;
use crate::error::ApiError;
use crate::models::reading::ReadingInput;
use crate::websocket::real_time_message;
use crate::websocket::server::{Broadcast, ClientCount, MonitorHub};

/// Application state shared by all handlers.
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub hub: Addr<MonitorHub>,
    pub config: Config,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health))
        .service(
            web::scope("/api")
                .route("/data", web::post().to(receive_data))
                .route("/history/{patient_id}", web::get().to(patient_history))
                .route("/export/{patient_id}", web::get().to(export_session))
                .route("/simulate", web::post().to(simulate))
                .route("/sessions/{patient_id}", web::get().to(session_status))
                .route("/sessions/{patient_id}/start", web::post().to(start_session))
                .route("/sessions/{patient_id}/stop", web::post().to(stop_session))
                .route("/sessions/{patient_id}/pause", web::post().to(pause_session))
                .route("/sessions/{patient_id}/resume", web::post().to(resume_session))
                .route("/sessions/{patient_id}/window", web::put().to(update_window)),
        );
}

// ===== Request Bodies =====

#[derive(Debug, Deserialize, Validate)]
pub struct SimulateRequest {
    #[serde(default = "default_duration")]
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: u32,
    #[serde(default = "default_max_volume")]
    #[validate(range(min = 1.0, max = 10000.0))]
    pub max_volume: f64,
    #[serde(default = "default_sim_patient")]
    #[validate(length(min = 1, max = 64))]
    pub patient_id: String,
}

fn default_duration() -> u32 {
    10
}

fn default_max_volume() -> f64 {
    500.0
}

fn default_sim_patient() -> String {
    "test_patient_001".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    pub window_minutes: Option<f64>,
    pub smoothing_alpha: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    pub window_minutes: f64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub minutes: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

fn require_positive(name: &str, value: f64) -> Result<(), ApiError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ApiError::InvalidParameter(format!("{name} must be a positive number")))
    }
}

fn require_alpha(value: f64) -> Result<(), ApiError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ApiError::InvalidParameter("smoothing_alpha must be in (0, 1]".into()))
    }
}

// ===== Handlers =====

async fn index(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "HemoDrop Backend API is running!",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.config.mode(),
        "endpoints": {
            "root": "GET /",
            "health": "GET /health",
            "receive_data": "POST /api/data",
            "websocket": "WS /ws",
            "history": "GET /api/history/{patient_id}",
            "export": "GET /api/export/{patient_id}",
            "simulate": "POST /api/simulate",
            "session_status": "GET /api/sessions/{patient_id}",
            "session_lifecycle": "POST /api/sessions/{patient_id}/{start|stop|pause|resume}",
            "session_window": "PUT /api/sessions/{patient_id}/window",
        },
    }))
}

async fn health(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let active_connections = state
        .hub
        .send(ClientCount)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "mode": state.config.mode(),
        "active_connections": active_connections,
        "active_sessions": state.manager.active_sessions(),
    })))
}

/// Telemetry ingest: the sensor bridge posts here in production mode.
async fn receive_data(
    state: web::Data<AppState>,
    payload: web::Json<ReadingInput>,
) -> Result<HttpResponse, ApiError> {
    let input = payload.into_inner();
    input.validate()?;
    let reading = input.into_reading()?;
    debug!(
        patient_id = %reading.patient_id,
        volume_ml = reading.cumulative_volume_ml,
        "received telemetry"
    );
    let record = state.manager.ingest(reading).await?;
    state.hub.do_send(Broadcast {
        payload: real_time_message(&record),
    });
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Data received and processed",
        "derived": record,
    })))
}

async fn patient_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = path.into_inner();
    if let Some(minutes) = query.minutes {
        require_positive("minutes", minutes)?;
    }
    let status = state.manager.status(&patient_id).await?;
    let history = state.manager.history(&patient_id, Utc::now(), query.minutes).await?;
    let trend = state.manager.trend(&patient_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "patient_id": patient_id,
        "window_minutes": query.minutes.unwrap_or(status.window_minutes),
        "data_points": history.len(),
        "trend": trend,
        "history": history,
    })))
}

async fn export_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ExportQuery>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = path.into_inner();
    let archive = state.manager.archive(&patient_id).await?;
    match query.format.as_deref().unwrap_or("json") {
        "csv" => Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .body(export::to_csv(&archive))),
        "json" => {
            let body = export::to_json(&archive).map_err(|err| ApiError::Internal(err.to_string()))?;
            Ok(HttpResponse::Ok().content_type("application/json").body(body))
        }
        other => Err(ApiError::InvalidParameter(format!("unknown export format: {other}"))),
    }
}

/// Generates a burst of simulated readings through the full pipeline.
async fn simulate(
    state: web::Data<AppState>,
    payload: web::Json<SimulateRequest>,
) -> Result<HttpResponse, ApiError> {
    if !state.config.simulation.enabled {
        return Err(ApiError::SimulationDisabled);
    }
    let request = payload.into_inner();
    request.validate()?;

    let readings = simulate_burst(&request.patient_id, request.duration_minutes, request.max_volume);
    let mut records = Vec::with_capacity(readings.len());
    for reading in readings {
        let record = state.manager.ingest(reading).await?;
        state.hub.do_send(Broadcast {
            payload: real_time_message(&record),
        });
        records.push(record);
    }
    info!(patient_id = %request.patient_id, points = records.len(), "generated simulated burst");
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": format!("Generated {} simulated data points", records.len()),
        "data_points": records.len(),
        "records": records,
    })))
}

async fn session_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let status = state.manager.status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(status))
}

async fn start_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: Option<web::Json<StartSessionRequest>>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = path.into_inner();
    let request = payload.map(web::Json::into_inner).unwrap_or_default();
    if let Some(minutes) = request.window_minutes {
        require_positive("window_minutes", minutes)?;
    }
    if let Some(alpha) = request.smoothing_alpha {
        require_alpha(alpha)?;
    }

    let (session_id, replaced) = state
        .manager
        .start_session(&patient_id, request.window_minutes, request.smoothing_alpha)
        .await;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "patient_id": patient_id,
        "session_id": session_id,
        "replaced_points": replaced.as_ref().map(|archive| archive.points()),
    })))
}

/// Stops monitoring; the retained data rides along for the archive path.
async fn stop_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let archive = state.manager.stop_session(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "archive": archive,
    })))
}

async fn pause_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    state.manager.pause_session(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "state": "paused" })))
}

async fn resume_session(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    state.manager.resume_session(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "success", "state": "active" })))
}

async fn update_window(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<WindowRequest>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = path.into_inner();
    require_positive("window_minutes", payload.window_minutes)?;
    state.manager.set_window(&patient_id, payload.window_minutes).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "window_minutes": payload.window_minutes,
    })))
}

#[cfg(test)]
mod tests {
    use actix::Actor;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    use super::*;
    use crate::config::{MonitoringConfig, ServerConfig, SimulationConfig, WebSocketConfig};

    fn test_config(simulation_enabled: bool) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            websocket: WebSocketConfig {
                ping_interval_secs: 30,
                client_timeout_secs: 90,
            },
            monitoring: MonitoringConfig {
                window_minutes: 100_000.0,
                smoothing_alpha: 0.25,
                max_retained_points: 5000,
                trend_points: 5,
            },
            simulation: SimulationConfig {
                enabled: simulation_enabled,
                tick_seconds: 5,
                patient_id: "sim_patient".into(),
                max_volume_ml: 500.0,
                ramp_ml_per_min: 6.0,
            },
            upstream: None,
        }
    }

    fn test_state(simulation_enabled: bool) -> web::Data<AppState> {
        let config = test_config(simulation_enabled);
        web::Data::new(AppState {
            manager: Arc::new(SessionManager::new(config.monitoring.clone())),
            hub: MonitorHub::new(config.mode()).start(),
            config,
        })
    }

    #[actix_rt::test]
    async fn health_reports_mode_and_counts() {
        let app = test::init_service(App::new().app_data(test_state(true)).configure(configure)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["mode"], "simulation");
        assert_eq!(body["active_connections"], 0);
        assert_eq!(body["active_sessions"], 0);
    }

    #[actix_rt::test]
    async fn ingest_then_history_roundtrip() {
        let app = test::init_service(App::new().app_data(test_state(true)).configure(configure)).await;
        let base_ms = Utc::now().timestamp_millis() - 120_000;

        for (offset_ms, volume) in [(0i64, 0.0), (60_000, 20.0), (120_000, 45.0)] {
            let req = test::TestRequest::post()
                .uri("/api/data")
                .set_json(json!({
                    "patient_id": "p-1",
                    "timestamp_ms": base_ms + offset_ms,
                    "cumulative_volume_ml": volume,
                }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/history/p-1").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data_points"], 3);
        assert_eq!(body["history"][2]["instantaneous_rate_ml_per_min"], 25.0);
        assert_eq!(body["history"][2]["severity"], "Normal bleeding");
        assert!(body["trend"]["trend"].is_string());
    }

    #[actix_rt::test]
    async fn ingest_rejects_negative_volume() {
        let app = test::init_service(App::new().app_data(test_state(true)).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/data")
            .set_json(json!({
                "patient_id": "p-1",
                "timestamp_ms": Utc::now().timestamp_millis(),
                "cumulative_volume_ml": -5.0,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn history_for_unknown_patient_is_not_found() {
        let app = test::init_service(App::new().app_data(test_state(true)).configure(configure)).await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/history/ghost").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn simulate_is_forbidden_in_production_mode() {
        let app = test::init_service(App::new().app_data(test_state(false)).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/simulate")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn simulate_pushes_burst_through_pipeline() {
        let app = test::init_service(App::new().app_data(test_state(true)).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/simulate")
            .set_json(json!({
                "duration_minutes": 5,
                "max_volume": 300.0,
                "patient_id": "sim-7",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data_points"], 5);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/history/sim-7").to_request(),
        )
        .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data_points"], 5);
    }

    #[actix_rt::test]
    async fn session_lifecycle_over_http() {
        let app = test::init_service(App::new().app_data(test_state(true)).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/sessions/p-9/start").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/data")
            .set_json(json!({
                "patient_id": "p-9",
                "timestamp_ms": Utc::now().timestamp_millis(),
                "cumulative_volume_ml": 30.0,
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/sessions/p-9/pause").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        // Paused sessions reject telemetry with a conflict.
        let req = test::TestRequest::post()
            .uri("/api/data")
            .set_json(json!({
                "patient_id": "p-9",
                "timestamp_ms": Utc::now().timestamp_millis(),
                "cumulative_volume_ml": 35.0,
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/sessions/p-9/resume").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::put()
            .uri("/api/sessions/p-9/window")
            .set_json(json!({ "window_minutes": -10.0 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/sessions/p-9/stop").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["archive"]["records"].as_array().unwrap().len(), 1);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/sessions/p-9").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn export_supports_csv_and_json() {
        let app = test::init_service(App::new().app_data(test_state(true)).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/data")
            .set_json(json!({
                "patient_id": "p-2",
                "timestamp_ms": Utc::now().timestamp_millis(),
                "cumulative_volume_ml": 120.0,
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/export/p-2?format=csv").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.starts_with("timestamp,patient_id"));
        assert!(body.contains("Minor Hemorrhage"));

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/export/p-2").to_request(),
        )
        .await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data_points"], 1);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/export/p-2?format=xml").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn root_document_lists_endpoints() {
        let app = test::init_service(App::new().app_data(test_state(true)).configure(configure)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["mode"], "simulation");
        assert!(body["endpoints"]["websocket"].is_string());
    }
}
