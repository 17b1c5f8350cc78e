// src/main.rs

mod api;
mod config;
mod detector;
mod matcher;
mod model;
mod normalizer;
mod report;
mod types;

use anyhow::{Context, Result};
use detector::ParkingDetector;
use model::{YoloModel, ZoneModel, COCO_CLASSES};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = types::Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "parking_violation_detector={},ort=warn",
            config.logging.level
        ))
        .init();

    info!("🚗 Illegal Parking Detection Service Starting");
    info!("✓ Configuration loaded from {}", config_path);

    // Models load once at startup and are shared read-only for the life of
    // the process.
    let vehicle_model = YoloModel::new(
        &config.models.vehicle_model_path,
        COCO_CLASSES,
        config.models.num_threads,
    )
    .context("Vehicle model is required")?;
    info!("✓ Vehicle detector ready");

    let zone_model = ZoneModel::load(&config.models.zone_model_path, config.models.num_threads);

    let detector = Arc::new(ParkingDetector::new(
        Box::new(vehicle_model),
        zone_model,
        config.detection.clone(),
    ));

    api::serve(detector, &config.server.host, config.server.port).await
}
