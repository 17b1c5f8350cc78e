// src/types.rs

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub models: ModelsConfig,
    pub detection: DetectionConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Custom 3-class restricted-zone model. Optional: when the weights are
    /// missing the pipeline runs with an empty zone list.
    pub zone_model_path: String,
    /// COCO-pretrained vehicle model. Required.
    pub vehicle_model_path: String,
    pub num_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub zone_confidence_cutoff: f32,
    pub vehicle_confidence_cutoff: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            zone_confidence_cutoff: 0.25,
            vehicle_confidence_cutoff: 0.4,
        }
    }
}

// ============================================================================
// DOMAIN TYPES
// ============================================================================

/// Axis-aligned box in original image pixels. x1 < x2, y1 < y2.
/// Serializes as the 4-integer array `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 + self.x2) as f64 / 2.0,
            (self.y1 + self.y2) as f64 / 2.0,
        )
    }
}

impl Serialize for BoundingBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(4))?;
        seq.serialize_element(&self.x1)?;
        seq.serialize_element(&self.y1)?;
        seq.serialize_element(&self.x2)?;
        seq.serialize_element(&self.y2)?;
        seq.end()
    }
}

/// Restricted-parking zone categories from the custom 3-class model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Hydrant,
    DisabledParking,
    SchoolZone,
}

impl ZoneKind {
    pub fn name(&self) -> &'static str {
        match self {
            ZoneKind::Hydrant => "hydrant",
            ZoneKind::DisabledParking => "disabled_parking",
            ZoneKind::SchoolZone => "school_zone",
        }
    }

    /// Display label kept from the original service for client compatibility.
    pub fn korean_name(&self) -> &'static str {
        match self {
            ZoneKind::Hydrant => "소화전",
            ZoneKind::DisabledParking => "장애인주차구역",
            ZoneKind::SchoolZone => "어린이보호구역",
        }
    }

    /// Fixed fine in KRW attached to a violation in this zone.
    pub fn penalty(&self) -> u64 {
        match self {
            ZoneKind::Hydrant => 120_000,
            ZoneKind::DisabledParking => 100_000,
            ZoneKind::SchoolZone => 80_000,
        }
    }
}

/// Vehicle categories recognized from the COCO detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

impl VehicleKind {
    pub fn name(&self) -> &'static str {
        match self {
            VehicleKind::Car => "car",
            VehicleKind::Motorcycle => "motorcycle",
            VehicleKind::Bus => "bus",
            VehicleKind::Truck => "truck",
        }
    }
}

/// A normalized restricted-zone detection.
#[derive(Debug, Clone)]
pub struct ZoneDetection {
    pub bbox: BoundingBox,
    /// Raw model confidence; rounded to 3 decimals only when serialized.
    pub confidence: f32,
    pub class_id: usize,
    pub kind: ZoneKind,
}

impl ZoneDetection {
    pub fn penalty(&self) -> u64 {
        self.kind.penalty()
    }
}

/// A normalized vehicle detection.
#[derive(Debug, Clone)]
pub struct VehicleDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub kind: VehicleKind,
}

/// A matched vehicle/zone pair. Owns both detections: once matched the
/// pairing never changes.
#[derive(Debug, Clone)]
pub struct Violation {
    pub vehicle: VehicleDetection,
    pub zone: ZoneDetection,
    /// Center-to-center distance, recorded rounded to 1 decimal.
    pub distance: f64,
    pub penalty: u64,
}

/// Immutable per-image snapshot. Summary counts and the penalty total are
/// always recomputed from the lists so they cannot drift.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub timestamp: String,
    pub zones: Vec<ZoneDetection>,
    pub vehicles: Vec<VehicleDetection>,
    pub violations: Vec<Violation>,
}

impl DetectionResult {
    pub fn total_penalty(&self) -> u64 {
        self.violations.iter().map(|v| v.penalty).sum()
    }
}
