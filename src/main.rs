//! HemoDrop monitoring backend
//!
//! Main entry point: wires the configured reading source into the pipeline
//! and serves the HTTP/WebSocket API.

use std::sync::Arc;
use std::time::Duration;

use actix::Actor;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Context as _;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hemodrop::api::{self, AppState};
use hemodrop::config;
use hemodrop::core::session::SessionManager;
use hemodrop::core::source::{self, ChannelSource, SimulatedSource};
use hemodrop::websocket::{self, server::MonitorHub};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = config::load_config().context("failed to load configuration")?;
    info!(mode = config.mode(), "starting HemoDrop backend");

    // Create the session manager and the WebSocket hub
    let manager = Arc::new(SessionManager::new(config.monitoring.clone()));
    let hub = MonitorHub::new(config.mode()).start();

    // Forward derived records from producer tasks to connected clients
    let (records_tx, mut records_rx) = mpsc::channel(256);
    {
        let hub = hub.clone();
        tokio::spawn(async move {
            while let Some(record) = records_rx.recv().await {
                hub.do_send(websocket::server::Broadcast {
                    payload: websocket::real_time_message(&record),
                });
            }
        });
    }

    // Wire the configured reading source into the pipeline. When neither
    // source is active, telemetry still arrives over POST /api/data.
    if config.simulation.enabled {
        let tick = Duration::from_secs(config.simulation.tick_seconds.max(1));
        let ramp_per_tick = config.simulation.ramp_ml_per_min * tick.as_secs_f64() / 60.0;
        let simulator = SimulatedSource::new(
            config.simulation.patient_id.clone(),
            config.simulation.max_volume_ml,
            ramp_per_tick,
        );
        tokio::spawn(source::run_source_pump(
            Box::new(simulator),
            Arc::clone(&manager),
            records_tx.clone(),
            tick,
            1,
        ));
        info!(patient_id = %config.simulation.patient_id, "simulation source started");
    } else if let Some(upstream) = config.upstream.clone() {
        let url = url::Url::parse(&upstream.url).context("invalid upstream feed url")?;
        let (feed_tx, feed_rx) = mpsc::channel(256);
        tokio::spawn(source::run_upstream_feed(url, feed_tx));
        tokio::spawn(source::run_source_pump(
            Box::new(ChannelSource::new(feed_rx)),
            Arc::clone(&manager),
            records_tx.clone(),
            Duration::from_secs(1),
            64,
        ));
        info!(url = %upstream.url, "upstream feed source started");
    } else {
        info!("no reading source configured, accepting telemetry over HTTP only");
    }

    // Create app state
    let state = web::Data::new(AppState {
        manager,
        hub,
        config: config.clone(),
    });

    info!(host = %config.server.host, port = config.server.port, "HTTP server listening");

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            // Add app state
            .app_data(state.clone())
            // Request spans
            .wrap(tracing_actix_web::TracingLogger::default())
            // Development posture: dashboards connect from anywhere
            .wrap(Cors::permissive())
            // API routes
            .configure(api::configure)
            // WebSocket route
            .service(websocket::server::websocket_route())
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
