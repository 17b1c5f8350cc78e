// src/matcher.rs
//
// Spatial violation matching. A vehicle is in violation when its bbox
// center lies strictly closer than a resolution-scaled threshold to a
// restricted zone's bbox center.
//
// Matching is FIRST-match-wins over the zone list, not nearest-match: for
// each vehicle the zones are scanned in detection order and the first one
// inside the threshold is taken. Changing this to nearest-zone is a policy
// change, not a bug fix.

use crate::types::{VehicleDetection, Violation, ZoneDetection};

/// Fraction of the image diagonal used as the violation distance threshold.
const DIAGONAL_FRACTION: f64 = 0.4;

/// Threshold proportional to the image diagonal, so the rule behaves the
/// same at any resolution.
pub fn distance_threshold(image_width: u32, image_height: u32) -> f64 {
    let w = image_width as f64;
    let h = image_height as f64;
    DIAGONAL_FRACTION * (w * w + h * h).sqrt()
}

/// Pair vehicles with zones. At most one violation per vehicle; a zone may
/// be matched by any number of vehicles. Inputs are never mutated and the
/// output order follows the vehicle list.
pub fn match_violations(
    vehicles: &[VehicleDetection],
    zones: &[ZoneDetection],
    image_width: u32,
    image_height: u32,
) -> Vec<Violation> {
    let threshold = distance_threshold(image_width, image_height);
    let mut violations = Vec::new();

    for vehicle in vehicles {
        for zone in zones {
            let distance = center_distance(vehicle, zone);

            if distance < threshold {
                violations.push(Violation {
                    vehicle: vehicle.clone(),
                    zone: zone.clone(),
                    distance: round1(distance),
                    penalty: zone.penalty(),
                });
                break;
            }
        }
    }

    violations
}

fn center_distance(vehicle: &VehicleDetection, zone: &ZoneDetection) -> f64 {
    let (vx, vy) = vehicle.bbox.center();
    let (zx, zy) = zone.bbox.center();
    ((vx - zx).powi(2) + (vy - zy).powi(2)).sqrt()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
