// src/detector.rs
//
// Pipeline orchestrator: zone pass -> vehicle pass -> normalize -> match
// -> aggregate. One image in, one immutable result out, on the calling
// thread. The models are the only shared state; they sit behind mutexes
// because ONNX Runtime sessions need exclusive access during inference.

use crate::matcher;
use crate::model::{DetectionModel, RawDetection, ZoneModel};
use crate::normalizer;
use crate::report;
use crate::types::{DetectionConfig, DetectionResult};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use image::RgbImage;
use std::sync::Mutex;
use tracing::{debug, info};

pub struct ParkingDetector {
    vehicle_model: Mutex<Box<dyn DetectionModel>>,
    zone_model: Mutex<ZoneModel>,
    config: DetectionConfig,
}

impl ParkingDetector {
    pub fn new(
        vehicle_model: Box<dyn DetectionModel>,
        zone_model: ZoneModel,
        config: DetectionConfig,
    ) -> Self {
        if !zone_model.is_present() {
            info!("Zone model absent: every image will report zero violations");
        }

        Self {
            vehicle_model: Mutex::new(vehicle_model),
            zone_model: Mutex::new(zone_model),
            config,
        }
    }

    pub fn zone_model_loaded(&self) -> bool {
        self.zone_model
            .lock()
            .map(|m| m.is_present())
            .unwrap_or(false)
    }

    /// Run the full pipeline on a decoded RGB image, stamped with the
    /// current UTC time.
    pub fn detect(&self, image: &RgbImage) -> Result<DetectionResult> {
        self.detect_at(image, Utc::now().to_rfc3339())
    }

    /// Same pipeline with a caller-supplied timestamp.
    pub fn detect_at(&self, image: &RgbImage, timestamp: String) -> Result<DetectionResult> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            bail!("image has zero dimensions ({}x{})", width, height);
        }

        let raw_zones = self.run_zone_pass(image)?;
        let raw_vehicles = self.run_vehicle_pass(image)?;

        let zones = normalizer::normalize_zones(&raw_zones);
        let vehicles = normalizer::normalize_vehicles(&raw_vehicles);

        let violations = matcher::match_violations(&vehicles, &zones, width, height);

        debug!(
            "Pipeline: {} zone(s), {} vehicle(s), {} violation(s)",
            zones.len(),
            vehicles.len(),
            violations.len()
        );

        Ok(report::aggregate(zones, vehicles, violations, timestamp))
    }

    fn run_zone_pass(&self, image: &RgbImage) -> Result<Vec<RawDetection>> {
        let mut zone_model = self
            .zone_model
            .lock()
            .map_err(|_| anyhow!("zone model lock poisoned"))?;

        match &mut *zone_model {
            ZoneModel::Present(model) => model.detect(image, self.config.zone_confidence_cutoff),
            ZoneModel::Absent => Ok(Vec::new()),
        }
    }

    fn run_vehicle_pass(&self, image: &RgbImage) -> Result<Vec<RawDetection>> {
        let mut vehicle_model = self
            .vehicle_model
            .lock()
            .map_err(|_| anyhow!("vehicle model lock poisoned"))?;

        vehicle_model.detect(image, self.config.vehicle_confidence_cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VehicleKind, ZoneKind};

    /// Fixed-output stand-in for an ONNX session.
    struct StubModel {
        detections: Vec<RawDetection>,
    }

    impl StubModel {
        fn with(detections: Vec<RawDetection>) -> Box<dyn DetectionModel> {
            Box::new(Self { detections })
        }
    }

    impl DetectionModel for StubModel {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn detect(&mut self, _image: &RgbImage, cutoff: f32) -> Result<Vec<RawDetection>> {
            Ok(self
                .detections
                .iter()
                .copied()
                .filter(|d| d.confidence >= cutoff)
                .collect())
        }
    }

    fn raw(bbox: [f32; 4], confidence: f32, class_id: usize) -> RawDetection {
        RawDetection {
            bbox,
            confidence,
            class_id,
        }
    }

    fn blank_image(width: u32, height: u32) -> RgbImage {
        RgbImage::new(width, height)
    }

    #[test]
    fn test_full_pipeline_worked_example() {
        // 1000x800 image: threshold ~= 512.2. Zone centered (100,100),
        // vehicle centered (100,400): distance 300 -> one violation.
        let zone_model = ZoneModel::Present(StubModel::with(vec![raw(
            [50.0, 50.0, 150.0, 150.0],
            0.9,
            0,
        )]));
        let vehicle_model = StubModel::with(vec![raw([50.0, 350.0, 150.0, 450.0], 0.8, 2)]);

        let detector =
            ParkingDetector::new(vehicle_model, zone_model, DetectionConfig::default());
        let result = detector
            .detect_at(&blank_image(1000, 800), "t".to_string())
            .unwrap();

        assert_eq!(result.zones.len(), 1);
        assert_eq!(result.vehicles.len(), 1);
        assert_eq!(result.violations.len(), 1);

        let violation = &result.violations[0];
        assert_eq!(violation.zone.kind, ZoneKind::Hydrant);
        assert_eq!(violation.vehicle.kind, VehicleKind::Car);
        assert_eq!(violation.distance, 300.0);
        assert_eq!(result.total_penalty(), 120_000);
    }

    #[test]
    fn test_absent_zone_model_degrades_to_empty_zone_list() {
        let vehicle_model = StubModel::with(vec![
            raw([0.0, 0.0, 100.0, 100.0], 0.9, 2),
            raw([200.0, 200.0, 300.0, 300.0], 0.9, 7),
        ]);

        let detector = ParkingDetector::new(
            vehicle_model,
            ZoneModel::Absent,
            DetectionConfig::default(),
        );
        let result = detector
            .detect_at(&blank_image(640, 480), "t".to_string())
            .unwrap();

        assert!(result.zones.is_empty());
        assert_eq!(result.vehicles.len(), 2);
        assert!(result.violations.is_empty());
        assert_eq!(result.total_penalty(), 0);
    }

    #[test]
    fn test_zero_dimension_image_is_rejected() {
        let detector = ParkingDetector::new(
            StubModel::with(Vec::new()),
            ZoneModel::Absent,
            DetectionConfig::default(),
        );

        let err = detector
            .detect_at(&blank_image(0, 0), "t".to_string())
            .unwrap_err();
        assert!(err.to_string().contains("zero dimensions"));
    }

    #[test]
    fn test_confidence_cutoffs_applied_per_pass() {
        // Zone at 0.3 passes the 0.25 zone cutoff; vehicle at 0.3 fails the
        // 0.4 vehicle cutoff.
        let zone_model = ZoneModel::Present(StubModel::with(vec![raw(
            [0.0, 0.0, 50.0, 50.0],
            0.3,
            0,
        )]));
        let vehicle_model = StubModel::with(vec![raw([0.0, 0.0, 50.0, 50.0], 0.3, 2)]);

        let detector =
            ParkingDetector::new(vehicle_model, zone_model, DetectionConfig::default());
        let result = detector
            .detect_at(&blank_image(640, 480), "t".to_string())
            .unwrap();

        assert_eq!(result.zones.len(), 1);
        assert!(result.vehicles.is_empty());
    }

    #[test]
    fn test_violation_lists_stay_consistent() {
        // Every violation's vehicle and zone must also appear in the
        // result's own lists.
        let zone_model = ZoneModel::Present(StubModel::with(vec![
            raw([0.0, 0.0, 20.0, 20.0], 0.9, 0),
            raw([100.0, 100.0, 120.0, 120.0], 0.9, 2),
        ]));
        let vehicle_model = StubModel::with(vec![
            raw([10.0, 10.0, 40.0, 40.0], 0.9, 2),
            raw([90.0, 90.0, 130.0, 130.0], 0.9, 5),
        ]);

        let detector =
            ParkingDetector::new(vehicle_model, zone_model, DetectionConfig::default());
        let result = detector
            .detect_at(&blank_image(640, 480), "t".to_string())
            .unwrap();

        for violation in &result.violations {
            assert!(result
                .vehicles
                .iter()
                .any(|v| v.bbox == violation.vehicle.bbox));
            assert!(result.zones.iter().any(|z| z.bbox == violation.zone.bbox));
        }
    }
}
