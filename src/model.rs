// src/model.rs
//
// Detection model adapter boundary.
//
// Downstream code (normalizer, matcher) only ever sees `RawDetection`
// records produced through the `DetectionModel` trait; nothing outside this
// module touches ONNX Runtime. The restricted-zone model is optional at
// startup, which is expressed as the `ZoneModel` sum type rather than a
// null check scattered through the pipeline.

use anyhow::{Context, Result};
use image::RgbImage;
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use std::path::Path;
use tracing::{debug, info, warn};

const YOLO_INPUT_SIZE: usize = 640;
const NMS_IOU_THRESHOLD: f32 = 0.45;

/// One detection exactly as a model produced it, before any class mapping.
/// bbox is `[x1, y1, x2, y2]` in original image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// Capability every detection backend provides: one image in, raw
/// detections out. Inference must not mutate anything observable outside
/// the call; `&mut self` exists only because ONNX Runtime sessions require
/// exclusive access while running.
pub trait DetectionModel: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, image: &RgbImage, confidence_cutoff: f32) -> Result<Vec<RawDetection>>;
}

/// The zone model may be entirely absent (missing weights). Absence is a
/// degraded mode, not an error: the pipeline then sees an empty zone list.
pub enum ZoneModel {
    Present(Box<dyn DetectionModel>),
    Absent,
}

impl ZoneModel {
    /// Load the zone model if its weights exist, logging the degraded mode
    /// otherwise.
    pub fn load(model_path: &str, num_threads: usize) -> Self {
        if !Path::new(model_path).exists() {
            warn!(
                "Zone model weights not found at {}; running without zone detection",
                model_path
            );
            return ZoneModel::Absent;
        }

        match YoloModel::new(model_path, ZONE_MODEL_CLASSES, num_threads) {
            Ok(model) => {
                info!("✓ Zone model loaded");
                ZoneModel::Present(Box::new(model))
            }
            Err(e) => {
                warn!("Zone model failed to load: {}. Running without it.", e);
                ZoneModel::Absent
            }
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, ZoneModel::Present(_))
    }
}

/// Number of classes in the custom restricted-zone model.
pub const ZONE_MODEL_CLASSES: usize = 3;
/// Number of classes in the COCO-pretrained vehicle model.
pub const COCO_CLASSES: usize = 80;

/// YOLOv8-style single-image detector backed by an ONNX Runtime session.
pub struct YoloModel {
    session: Session,
    num_classes: usize,
}

impl YoloModel {
    pub fn new(model_path: &str, num_classes: usize, num_threads: usize) -> Result<Self> {
        info!("Loading YOLO model: {}", model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load model: {}", model_path))?;

        Ok(Self {
            session,
            num_classes,
        })
    }

    fn infer(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.to_vec().into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let output = &outputs[0];
        let (_, data) = output.try_extract_tensor::<f32>()?;

        Ok(data.to_vec())
    }

    fn postprocess(
        &self,
        output: &[f32],
        scale: f32,
        pad_x: f32,
        pad_y: f32,
        conf_thresh: f32,
    ) -> Vec<RawDetection> {
        let mut detections = Vec::new();

        // YOLOv8 output: [1, 4 + num_classes, N] where each of the N
        // predictions is [cx, cy, w, h, class0_conf, ...].
        let num_preds = output.len() / (4 + self.num_classes);

        for i in 0..num_preds {
            let cx = output[i];
            let cy = output[num_preds + i];
            let w = output[num_preds * 2 + i];
            let h = output[num_preds * 3 + i];

            let mut max_conf = 0.0f32;
            let mut best_class = 0;

            for c in 0..self.num_classes {
                let conf = output[num_preds * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c;
                }
            }

            if max_conf < conf_thresh {
                continue;
            }

            // Center format -> corner format, then reverse the letterbox
            let x1 = (cx - w / 2.0 - pad_x) / scale;
            let y1 = (cy - h / 2.0 - pad_y) / scale;
            let x2 = (cx + w / 2.0 - pad_x) / scale;
            let y2 = (cy + h / 2.0 - pad_y) / scale;

            detections.push(RawDetection {
                bbox: [x1, y1, x2, y2],
                confidence: max_conf,
                class_id: best_class,
            });
        }

        nms(detections, NMS_IOU_THRESHOLD)
    }
}

impl DetectionModel for YoloModel {
    fn name(&self) -> &'static str {
        "yolo-onnx"
    }

    fn detect(&mut self, image: &RgbImage, confidence_cutoff: f32) -> Result<Vec<RawDetection>> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let (input, scale, pad_x, pad_y) = letterbox(image.as_raw(), width, height);

        let output = self.infer(&input)?;
        let detections = self.postprocess(&output, scale, pad_x, pad_y, confidence_cutoff);

        debug!("Model produced {} raw detection(s)", detections.len());
        Ok(detections)
    }
}

/// Letterbox an RGB image into a normalized CHW tensor: scale to fit
/// 640x640 preserving aspect ratio, center on a gray canvas, then map
/// [0, 255] -> [0, 1]. Returns the tensor plus the scale/padding needed to
/// map detections back to original coordinates.
fn letterbox(src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, f32, f32, f32) {
    let target_size = YOLO_INPUT_SIZE;

    let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
    let scaled_w = (src_w as f32 * scale) as usize;
    let scaled_h = (src_h as f32 * scale) as usize;

    let pad_x = (target_size - scaled_w) as f32 / 2.0;
    let pad_y = (target_size - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![114u8; target_size * target_size * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_x = x + pad_x as usize;
            let dst_y = y + pad_y as usize;
            let dst_idx = (dst_y * target_size + dst_x) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    // HWC -> CHW
    let mut input = vec![0.0f32; 3 * target_size * target_size];
    for c in 0..3 {
        for h in 0..target_size {
            for w in 0..target_size {
                let hwc_idx = (h * target_size + w) * 3 + c;
                let chw_idx = c * target_size * target_size + h * target_size + w;
                input[chw_idx] = canvas[hwc_idx] as f32 / 255.0;
            }
        }
    }

    (input, scale, pad_x, pad_y)
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();

    while !detections.is_empty() {
        let current = detections.remove(0);
        keep.push(current);

        detections.retain(|det| {
            det.class_id != current.class_id || iou(&current.bbox, &det.bbox) < iou_threshold
        });
    }

    keep
}

fn iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
