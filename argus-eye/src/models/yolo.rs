//! YOLOv8 object detection model

use crate::config::ModelConfig;
use crate::error::VisionError;
use crate::frame::{Frame, PixelEncoding};
use crate::models::{BoundingBox, Detection};
use std::cmp::Ordering;
use tracing::debug;

/// COCO class names (80 classes)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Padding value used around the letterboxed image
const LETTERBOX_FILL: u8 = 114;

/// Aspect-preserving mapping between frame pixels and the square network input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub input_size: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Letterbox {
    pub fn new(frame_width: u32, frame_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / frame_width.max(1) as f32)
            .min(input_size as f32 / frame_height.max(1) as f32);
        let (scaled_w, scaled_h) = Self::scaled_dims(frame_width, frame_height, scale);
        Self {
            input_size,
            scale,
            pad_x: input_size.saturating_sub(scaled_w) as f32 / 2.0,
            pad_y: input_size.saturating_sub(scaled_h) as f32 / 2.0,
            frame_width,
            frame_height,
        }
    }

    fn scaled_dims(frame_width: u32, frame_height: u32, scale: f32) -> (u32, u32) {
        (
            ((frame_width as f32 * scale).round() as u32).max(1),
            ((frame_height as f32 * scale).round() as u32).max(1),
        )
    }

    /// Size of the frame once scaled into the input square
    pub fn scaled_size(&self) -> (u32, u32) {
        Self::scaled_dims(self.frame_width, self.frame_height, self.scale)
    }

    /// Map a point in network input space back to frame pixels (clamped)
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let fx = ((x - self.pad_x) / self.scale).clamp(0.0, self.frame_width as f32);
        let fy = ((y - self.pad_y) / self.scale).clamp(0.0, self.frame_height as f32);
        (fx, fy)
    }

    /// Build the `[1, 3, S, S]` RGB float tensor (values in [0, 1]) for `frame`
    pub fn tensor(&self, frame: &Frame) -> Vec<f32> {
        let (scaled_w, scaled_h) = self.scaled_size();
        let mut scaled = Frame::new(scaled_w, scaled_h, frame.encoding());
        frame.resize_into(&mut scaled);

        let side = self.input_size as usize;
        let plane = side * side;
        let mut tensor = vec![LETTERBOX_FILL as f32 / 255.0; plane * 3];

        let (red, blue) = match scaled.encoding() {
            PixelEncoding::Rgb8 => (0, 2),
            PixelEncoding::Bgr8 => (2, 0),
        };
        let off_x = self.pad_x.floor() as usize;
        let off_y = self.pad_y.floor() as usize;
        let data = scaled.data();

        for y in 0..scaled_h as usize {
            let ty = y + off_y;
            if ty >= side {
                break;
            }
            for x in 0..scaled_w as usize {
                let tx = x + off_x;
                if tx >= side {
                    break;
                }
                let src = (y * scaled_w as usize + x) * 3;
                let dst = ty * side + tx;
                tensor[dst] = data[src + red] as f32 / 255.0;
                tensor[plane + dst] = data[src + 1] as f32 / 255.0;
                tensor[2 * plane + dst] = data[src + blue] as f32 / 255.0;
            }
        }

        tensor
    }
}

/// Post-processing knobs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub score_floor: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            score_floor: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

impl From<&ModelConfig> for DecodeParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            score_floor: config.score_floor,
            iou_threshold: config.iou_threshold,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    class_id: usize,
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }
        inter / union
    }
}

/// Decode a raw YOLOv8 output tensor of shape `[1, 4 + C, N]`.
///
/// Each of the N columns holds `cx, cy, w, h` in input space followed by C
/// class scores. Candidates whose best score is below `score_floor` are
/// dropped, boxes are mapped back to frame pixels, overlapping boxes of the
/// same class are suppressed, and the result is ordered by descending score.
pub fn decode_yolov8<S: AsRef<str>>(
    output: &[f32],
    shape: &[usize],
    letterbox: &Letterbox,
    class_names: &[S],
    params: &DecodeParams,
) -> Result<Vec<Detection>, VisionError> {
    let (features, proposals) = match shape {
        [1, f, n] | [f, n] => (*f, *n),
        _ => {
            return Err(VisionError::Model(format!(
                "Unexpected YOLOv8 output shape {:?}",
                shape
            )))
        }
    };
    if features <= 4 {
        return Err(VisionError::Model(format!(
            "YOLOv8 output has {} features, expected box + class scores",
            features
        )));
    }
    let expected = features
        .checked_mul(proposals)
        .ok_or_else(|| VisionError::Model("YOLOv8 output size overflow".to_string()))?;
    if output.len() != expected {
        return Err(VisionError::Model(format!(
            "YOLOv8 output holds {} values, shape {:?} needs {}",
            output.len(),
            shape,
            expected
        )));
    }

    let num_classes = features - 4;
    let at = |row: usize, col: usize| output[row * proposals + col];

    let mut candidates = Vec::new();
    for i in 0..proposals {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class_id in 0..num_classes {
            let score = at(4 + class_id, i);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }
        if !best_score.is_finite() || best_score < params.score_floor {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
            continue;
        }
        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push(Candidate {
            class_id: best_class,
            score: best_score.min(1.0),
            x1,
            y1,
            x2,
            y2,
        });
    }

    let kept = non_max_suppression(candidates, params.iou_threshold, params.max_detections);
    debug!("YOLOv8 decoded {} detections", kept.len());

    Ok(kept
        .into_iter()
        .map(|c| Detection {
            class_id: c.class_id,
            class_name: class_names
                .get(c.class_id)
                .map(|name| name.as_ref().to_string())
                .unwrap_or_else(|| format!("class_{}", c.class_id)),
            bbox: BoundingBox::new(c.x1 as i32, c.y1 as i32, c.x2 as i32, c.y2 as i32),
            confidence: c.score,
        })
        .collect())
}

/// Class-aware greedy NMS, highest score first
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32, limit: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep.len() >= limit {
            break;
        }
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// YOLOv8 running on ONNX Runtime
#[cfg(feature = "onnx")]
pub struct YoloDetector {
    session: ort::session::Session,
    input_size: u32,
    params: DecodeParams,
    class_names: Vec<String>,
}

#[cfg(feature = "onnx")]
impl YoloDetector {
    /// Load weights from `model_path` with the COCO class table
    pub fn new(model_path: &std::path::Path, config: &ModelConfig) -> Result<Self, VisionError> {
        let session = ort::session::Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load YOLO model: {}", e)))?;

        tracing::info!("YOLO model loaded from {:?}", model_path);

        Ok(Self {
            session,
            input_size: config.input_size,
            params: DecodeParams::from(config),
            class_names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the class table (for models trained on other datasets)
    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }
}

#[cfg(feature = "onnx")]
impl crate::models::Detector for YoloDetector {
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        debug!("Running YOLO detection on {}x{} frame", frame.width(), frame.height());

        let letterbox = Letterbox::new(frame.width(), frame.height(), self.input_size);
        let side = self.input_size as usize;
        let input = ort::value::Tensor::from_array(([1usize, 3, side, side], letterbox.tensor(frame).into_boxed_slice()))
            .map_err(|e| VisionError::Ort(format!("Failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs!["images" => input])
            .map_err(|e| VisionError::Ort(format!("YOLO inference failed: {}", e)))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;
        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        decode_yolov8(data, &shape, &letterbox, &self.class_names, &self.params)
    }

    fn class_name(&self, class_id: usize) -> &str {
        self.class_names.get(class_id).map(String::as_str).unwrap_or("unknown")
    }

    fn num_classes(&self) -> usize {
        self.class_names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Color;

    /// Lay out proposals column-major the way the exported model does
    fn tensor(num_classes: usize, proposals: &[([f32; 4], usize, f32)]) -> (Vec<f32>, Vec<usize>) {
        let features = 4 + num_classes;
        let n = proposals.len();
        let mut data = vec![0.0; features * n];
        for (i, (bbox, class_id, score)) in proposals.iter().enumerate() {
            for (row, value) in bbox.iter().enumerate() {
                data[row * n + i] = *value;
            }
            data[(4 + class_id) * n + i] = *score;
        }
        (data, vec![1, features, n])
    }

    #[test]
    fn test_coco_table_size() {
        assert_eq!(COCO_CLASSES.len(), 80);
        assert_eq!(COCO_CLASSES[0], "person");
        assert_eq!(COCO_CLASSES[79], "toothbrush");
    }

    #[test]
    fn test_letterbox_640x480() {
        let lb = Letterbox::new(640, 480, 640);
        assert_eq!(lb.scale, 1.0);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 80.0);
        assert_eq!(lb.scaled_size(), (640, 480));
        assert_eq!(lb.to_frame(100.0, 180.0), (100.0, 100.0));
        // Points in the padding clamp to the frame
        assert_eq!(lb.to_frame(-5.0, 10.0), (0.0, 0.0));
    }

    #[test]
    fn test_letterbox_tensor_pads_and_orders_rgb() {
        let mut frame = Frame::new(64, 32, PixelEncoding::Bgr8);
        frame.fill(Color::rgb(255, 0, 0));
        let lb = Letterbox::new(64, 32, 64);
        let t = lb.tensor(&frame);
        let plane = 64 * 64;
        assert_eq!(t.len(), plane * 3);

        // Row 0 is padding
        assert!((t[0] - 114.0 / 255.0).abs() < 1e-6);
        // Centre row carries the red frame
        let centre = 32 * 64 + 10;
        assert!((t[centre] - 1.0).abs() < 1e-6);
        assert!(t[plane + centre].abs() < 1e-6);
        assert!(t[2 * plane + centre].abs() < 1e-6);
    }

    #[test]
    fn test_decode_maps_boxes_to_frame() {
        let lb = Letterbox::new(640, 480, 640);
        let (data, shape) = tensor(80, &[([150.0, 180.0, 100.0, 80.0], 16, 0.82)]);
        let dets = decode_yolov8(&data, &shape, &lb, COCO_CLASSES, &DecodeParams::default()).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 16);
        assert_eq!(dets[0].class_name, "dog");
        assert!((dets[0].confidence - 0.82).abs() < 1e-6);
        assert_eq!(dets[0].bbox, BoundingBox::new(100, 60, 200, 140));
    }

    #[test]
    fn test_decode_drops_candidates_below_floor() {
        let lb = Letterbox::new(640, 480, 640);
        let (data, shape) = tensor(
            3,
            &[
                ([100.0, 200.0, 20.0, 20.0], 0, 0.1),
                ([300.0, 200.0, 20.0, 20.0], 1, 0.26),
            ],
        );
        let names = ["a", "b", "c"];
        let dets = decode_yolov8(&data, &shape, &lb, &names, &DecodeParams::default()).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_name, "b");
    }

    #[test]
    fn test_decode_nms_is_class_aware() {
        let lb = Letterbox::new(640, 640, 640);
        let (data, shape) = tensor(
            2,
            &[
                ([100.0, 100.0, 50.0, 50.0], 0, 0.9),
                ([102.0, 101.0, 50.0, 50.0], 0, 0.8),
                ([101.0, 100.0, 50.0, 50.0], 1, 0.7),
            ],
        );
        let names = ["cat", "dog"];
        let dets = decode_yolov8(&data, &shape, &lb, &names, &DecodeParams::default()).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_name, "cat");
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(dets[1].class_name, "dog");
    }

    #[test]
    fn test_decode_orders_by_confidence() {
        let lb = Letterbox::new(640, 640, 640);
        let (data, shape) = tensor(
            1,
            &[
                ([50.0, 50.0, 20.0, 20.0], 0, 0.3),
                ([300.0, 300.0, 20.0, 20.0], 0, 0.95),
                ([500.0, 500.0, 20.0, 20.0], 0, 0.6),
            ],
        );
        let dets = decode_yolov8(&data, &shape, &lb, &["x"], &DecodeParams::default()).unwrap();
        let scores: Vec<f32> = dets.iter().map(|d| d.confidence).collect();
        assert_eq!(scores, vec![0.95, 0.6, 0.3]);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let lb = Letterbox::new(640, 480, 640);
        let params = DecodeParams::default();
        assert!(decode_yolov8(&[0.0; 8], &[1, 4, 2], &lb, COCO_CLASSES, &params).is_err());
        assert!(decode_yolov8(&[0.0; 10], &[1, 6, 2], &lb, COCO_CLASSES, &params).is_err());
        assert!(decode_yolov8(&[0.0; 12], &[2, 1, 6, 1], &lb, COCO_CLASSES, &params).is_err());
    }

    #[test]
    fn test_decode_unknown_class_gets_placeholder_name() {
        let lb = Letterbox::new(640, 640, 640);
        let (data, shape) = tensor(2, &[([100.0, 100.0, 20.0, 20.0], 1, 0.9)]);
        let dets = decode_yolov8(&data, &shape, &lb, &["only"], &DecodeParams::default()).unwrap();
        assert_eq!(dets[0].class_name, "class_1");
    }

    #[test]
    fn test_decode_params_from_model_config() {
        let mut config = ModelConfig::default();
        config.score_floor = 0.1;
        config.iou_threshold = 0.45;
        let params = DecodeParams::from(&config);
        assert_eq!(params.score_floor, 0.1);
        assert_eq!(params.iou_threshold, 0.45);
        assert_eq!(params.max_detections, 300);
    }
}
