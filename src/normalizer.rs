// src/normalizer.rs
//
// Turns raw model output into typed detections. Class ids outside the
// recognized maps are expected noise from a general-purpose detector and
// are silently dropped; a single malformed detection is skipped rather than
// failing the whole image.

use crate::model::RawDetection;
use crate::types::{BoundingBox, VehicleDetection, VehicleKind, ZoneDetection, ZoneKind};

/// Class ids of the custom 3-class restricted-zone model.
pub fn zone_kind_for_class(class_id: usize) -> Option<ZoneKind> {
    match class_id {
        0 => Some(ZoneKind::Hydrant),
        1 => Some(ZoneKind::DisabledParking),
        2 => Some(ZoneKind::SchoolZone),
        _ => None,
    }
}

/// COCO class ids for the vehicle categories we recognize.
pub fn vehicle_kind_for_class(class_id: usize) -> Option<VehicleKind> {
    match class_id {
        2 => Some(VehicleKind::Car),
        3 => Some(VehicleKind::Motorcycle),
        5 => Some(VehicleKind::Bus),
        7 => Some(VehicleKind::Truck),
        _ => None,
    }
}

pub fn normalize_zones(raw: &[RawDetection]) -> Vec<ZoneDetection> {
    raw.iter()
        .filter_map(|det| {
            let kind = zone_kind_for_class(det.class_id)?;
            let bbox = sanitize_bbox(det)?;
            Some(ZoneDetection {
                bbox,
                confidence: det.confidence,
                class_id: det.class_id,
                kind,
            })
        })
        .collect()
}

pub fn normalize_vehicles(raw: &[RawDetection]) -> Vec<VehicleDetection> {
    raw.iter()
        .filter_map(|det| {
            let kind = vehicle_kind_for_class(det.class_id)?;
            let bbox = sanitize_bbox(det)?;
            Some(VehicleDetection {
                bbox,
                confidence: det.confidence,
                kind,
            })
        })
        .collect()
}

/// Truncate coordinates to integer pixels, rejecting detections that are
/// malformed: non-finite values or a box that degenerates after truncation.
fn sanitize_bbox(det: &RawDetection) -> Option<BoundingBox> {
    if !det.confidence.is_finite() || det.bbox.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let [x1, y1, x2, y2] = det.bbox;
    let bbox = BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32);

    if bbox.x1 >= bbox.x2 || bbox.y1 >= bbox.y2 {
        return None;
    }

    Some(bbox)
}
