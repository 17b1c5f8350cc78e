// src/report.rs
//
// Result aggregation and the JSON wire format. The summary block is
// computed from the lists at conversion time; nothing in it is stored.

use crate::types::{BoundingBox, DetectionResult, VehicleDetection, Violation, ZoneDetection};
use serde::{Serialize, Serializer};

/// Assemble a result snapshot. The timestamp is caller-supplied so the
/// aggregation itself stays pure.
pub fn aggregate(
    zones: Vec<ZoneDetection>,
    vehicles: Vec<VehicleDetection>,
    violations: Vec<Violation>,
    timestamp: String,
) -> DetectionResult {
    DetectionResult {
        timestamp,
        zones,
        vehicles,
        violations,
    }
}

// ============================================================================
// WIRE FORMAT
// ============================================================================
// Field names and shapes match the original service so existing clients
// keep working.

#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub success: bool,
    pub timestamp: String,
    pub detection_summary: DetectionSummary,
    pub detections: Detections,
}

#[derive(Debug, Serialize)]
pub struct DetectionSummary {
    pub total_violation_zones: usize,
    pub total_vehicles: usize,
    pub total_violations: usize,
    pub total_penalty: u64,
}

#[derive(Debug, Serialize)]
pub struct Detections {
    pub violation_zones: Vec<ZoneReport>,
    pub vehicles: Vec<VehicleReport>,
    pub violations: Vec<ViolationReport>,
}

#[derive(Debug, Serialize)]
pub struct ZoneReport {
    pub bbox: BoundingBox,
    #[serde(serialize_with = "round3")]
    pub confidence: f32,
    pub class_id: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub korean_name: &'static str,
    pub penalty: u64,
}

#[derive(Debug, Serialize)]
pub struct VehicleReport {
    pub bbox: BoundingBox,
    #[serde(serialize_with = "round3")]
    pub confidence: f32,
    pub vehicle_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ViolationReport {
    pub vehicle: VehicleReport,
    pub violation_zone: ZoneReport,
    pub distance: f64,
    pub penalty: u64,
}

/// Confidence is reported to 3 decimals; the stored value stays unrounded.
fn round3<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(((*value as f64) * 1000.0).round() / 1000.0)
}

impl From<&ZoneDetection> for ZoneReport {
    fn from(zone: &ZoneDetection) -> Self {
        Self {
            bbox: zone.bbox,
            confidence: zone.confidence,
            class_id: zone.class_id,
            kind: zone.kind.name(),
            korean_name: zone.kind.korean_name(),
            penalty: zone.penalty(),
        }
    }
}

impl From<&VehicleDetection> for VehicleReport {
    fn from(vehicle: &VehicleDetection) -> Self {
        Self {
            bbox: vehicle.bbox,
            confidence: vehicle.confidence,
            vehicle_type: vehicle.kind.name(),
        }
    }
}

impl From<&Violation> for ViolationReport {
    fn from(violation: &Violation) -> Self {
        Self {
            vehicle: (&violation.vehicle).into(),
            violation_zone: (&violation.zone).into(),
            distance: violation.distance,
            penalty: violation.penalty,
        }
    }
}

impl From<&DetectionResult> for DetectionResponse {
    fn from(result: &DetectionResult) -> Self {
        Self {
            success: true,
            timestamp: result.timestamp.clone(),
            detection_summary: DetectionSummary {
                total_violation_zones: result.zones.len(),
                total_vehicles: result.vehicles.len(),
                total_violations: result.violations.len(),
                total_penalty: result.total_penalty(),
            },
            detections: Detections {
                violation_zones: result.zones.iter().map(Into::into).collect(),
                vehicles: result.vehicles.iter().map(Into::into).collect(),
                violations: result.violations.iter().map(Into::into).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, VehicleKind, ZoneKind};

    fn sample_zone() -> ZoneDetection {
        ZoneDetection {
            bbox: BoundingBox::new(50, 50, 150, 150),
            confidence: 0.87654,
            class_id: 0,
            kind: ZoneKind::Hydrant,
        }
    }

    fn sample_vehicle() -> VehicleDetection {
        VehicleDetection {
            bbox: BoundingBox::new(50, 350, 150, 450),
            confidence: 0.7,
            kind: VehicleKind::Car,
        }
    }

    #[test]
    fn test_summary_counts_are_list_lengths() {
        let zone = sample_zone();
        let vehicle = sample_vehicle();
        let violation = Violation {
            vehicle: vehicle.clone(),
            zone: zone.clone(),
            distance: 300.0,
            penalty: zone.penalty(),
        };

        let result = aggregate(
            vec![zone],
            vec![vehicle.clone(), vehicle],
            vec![violation],
            "t".to_string(),
        );
        let response = DetectionResponse::from(&result);

        assert!(response.success);
        assert_eq!(response.detection_summary.total_violation_zones, 1);
        assert_eq!(response.detection_summary.total_vehicles, 2);
        assert_eq!(response.detection_summary.total_violations, 1);
        assert_eq!(response.detection_summary.total_penalty, 120_000);
    }

    #[test]
    fn test_no_violations_means_zero_penalty() {
        let result = aggregate(Vec::new(), vec![sample_vehicle()], Vec::new(), "t".to_string());
        let response = DetectionResponse::from(&result);

        assert_eq!(response.detection_summary.total_violations, 0);
        assert_eq!(response.detection_summary.total_penalty, 0);
        assert!(response.detections.violations.is_empty());
    }

    #[test]
    fn test_wire_field_names() {
        let zone = sample_zone();
        let vehicle = sample_vehicle();
        let violation = Violation {
            vehicle: vehicle.clone(),
            zone: zone.clone(),
            distance: 300.0,
            penalty: 120_000,
        };
        let result = aggregate(vec![zone], vec![vehicle], vec![violation], "t".to_string());
        let json = serde_json::to_value(DetectionResponse::from(&result)).unwrap();

        let zone_json = &json["detections"]["violation_zones"][0];
        assert_eq!(zone_json["type"], "hydrant");
        assert_eq!(zone_json["korean_name"], "소화전");
        assert_eq!(zone_json["penalty"], 120_000);
        assert_eq!(zone_json["bbox"], serde_json::json!([50, 50, 150, 150]));

        let vehicle_json = &json["detections"]["vehicles"][0];
        assert_eq!(vehicle_json["vehicle_type"], "car");

        let violation_json = &json["detections"]["violations"][0];
        assert_eq!(violation_json["distance"], 300.0);
        assert_eq!(violation_json["vehicle"]["vehicle_type"], "car");
        assert_eq!(violation_json["violation_zone"]["type"], "hydrant");
    }

    #[test]
    fn test_confidence_rounds_to_three_decimals_in_report() {
        let result = aggregate(vec![sample_zone()], Vec::new(), Vec::new(), "t".to_string());
        let json = serde_json::to_value(DetectionResponse::from(&result)).unwrap();

        let conf = json["detections"]["violation_zones"][0]["confidence"]
            .as_f64()
            .unwrap();
        assert!((conf - 0.877).abs() < 1e-9);
    }
}
