//! HemoDrop monitoring backend core library
//!
//! This module exports the streaming blood-loss pipeline and the service
//! surface built around it.

pub mod api;
pub mod core;
pub mod error;
pub mod models;
pub mod websocket;

/// Application configuration
pub mod config {
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize)]
    pub struct Config {
        pub server: ServerConfig,
        pub websocket: WebSocketConfig,
        pub monitoring: MonitoringConfig,
        pub simulation: SimulationConfig,
        #[serde(default)]
        pub upstream: Option<UpstreamConfig>,
    }

    impl Config {
        pub fn mode(&self) -> &'static str {
            if self.simulation.enabled {
                "simulation"
            } else {
                "production"
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ServerConfig {
        pub host: String,
        pub port: u16,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct WebSocketConfig {
        pub ping_interval_secs: u64,
        pub client_timeout_secs: u64,
    }

    /// Pipeline settings shared by every new monitoring session.
    #[derive(Debug, Clone, Deserialize)]
    pub struct MonitoringConfig {
        pub window_minutes: f64,
        pub smoothing_alpha: f64,
        pub max_retained_points: usize,
        pub trend_points: usize,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct SimulationConfig {
        pub enabled: bool,
        pub tick_seconds: u64,
        pub patient_id: String,
        pub max_volume_ml: f64,
        pub ramp_ml_per_min: f64,
    }

    /// Live feed to consume in production mode.
    #[derive(Debug, Clone, Deserialize)]
    pub struct UpstreamConfig {
        pub url: String,
    }

    /// Load configuration from file
    pub fn load_config() -> Result<Config, config::ConfigError> {
        let env = std::env::var("HEMODROP_ENV").unwrap_or_else(|_| "development".into());
        config::Config::builder()
            // Start with default settings
            .add_source(config::File::with_name("config/default"))
            // Override with environment-specific settings
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("HEMODROP").separator("__"))
            .build()?
            .try_deserialize()
    }

}
