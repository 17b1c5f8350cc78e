// src/api.rs
//
// HTTP surface: /health, /detect, /model-info. This layer only marshals
// bytes in and JSON out; every failure becomes a structured
// `success: false` envelope so callers always get a parseable response.

use crate::detector::ParkingDetector;
use crate::normalizer;
use crate::report::DetectionResponse;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::Engine;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    detector: Arc<ParkingDetector>,
}

#[derive(Debug, Deserialize)]
struct DetectRequest {
    /// Base64-encoded JPEG or PNG bytes.
    image: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

impl ErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

pub async fn serve(detector: Arc<ParkingDetector>, host: &str, port: u16) -> Result<()> {
    let state = AppState { detector };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/detect", post(detect_handler))
        .route("/model-info", get(model_info_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("🅿️  Illegal parking detection API listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "message": "illegal parking detection API is running"
    }))
}

async fn detect_handler(
    State(state): State<AppState>,
    Json(request): Json<DetectRequest>,
) -> Response {
    let Some(encoded) = request.image else {
        return error_response(StatusCode::BAD_REQUEST, "missing image data");
    };

    let image = match decode_image(&encoded) {
        Ok(image) => image,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("image decoding failed: {}", e))
        }
    };

    // Inference is CPU-bound; keep it off the async runtime threads.
    let detector = state.detector.clone();
    let result = tokio::task::spawn_blocking(move || detector.detect(&image)).await;

    match result {
        Ok(Ok(detection)) => Json(DetectionResponse::from(&detection)).into_response(),
        Ok(Err(e)) => {
            error!("Detection pipeline failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
        Err(e) => {
            // Pipeline panic or cancellation: still answer with the envelope.
            error!("Detection task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "detection failed")
        }
    }
}

async fn model_info_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut classes = serde_json::Map::new();
    for class_id in 0..crate::model::ZONE_MODEL_CLASSES {
        if let Some(kind) = normalizer::zone_kind_for_class(class_id) {
            classes.insert(
                class_id.to_string(),
                serde_json::json!({
                    "name": kind.name(),
                    "korean": kind.korean_name(),
                    "penalty": kind.penalty(),
                }),
            );
        }
    }

    let mut vehicle_classes = serde_json::Map::new();
    for class_id in [2usize, 3, 5, 7] {
        if let Some(kind) = normalizer::vehicle_kind_for_class(class_id) {
            vehicle_classes.insert(class_id.to_string(), serde_json::json!(kind.name()));
        }
    }

    Json(serde_json::json!({
        "model_version": "v2.0",
        "zone_model_loaded": state.detector.zone_model_loaded(),
        "classes": classes,
        "vehicle_classes": vehicle_classes,
    }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// Base64 payload -> decoded 3-channel RGB image.
fn decode_image(encoded: &str) -> Result<RgbImage> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("invalid base64")?;
    let image = image::load_from_memory(&bytes).context("unsupported or corrupt image data")?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_image_rejects_bad_base64() {
        let err = decode_image("not base64 at all!!!").unwrap_err();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn test_decode_image_rejects_non_image_bytes() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"plain text payload");
        let err = decode_image(&encoded).unwrap_err();
        assert!(err.to_string().contains("image"));
    }

    #[test]
    fn test_decode_image_roundtrip_png() {
        let mut png_bytes = Vec::new();
        let image = RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]));
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut png_bytes), image::ImageFormat::Png)
            .unwrap();

        let encoded = base64::engine::general_purpose::STANDARD.encode(&png_bytes);
        let decoded = decode_image(&encoded).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(0, 0), &image::Rgb([10, 20, 30]));
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = serde_json::to_value(ErrorResponse::new("missing image data")).unwrap();
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["error"], "missing image data");
    }
}
