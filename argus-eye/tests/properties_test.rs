use argus_eye::annotator::{color_for_confidence, ConfidenceTier, TIER_HIGH_COLOR, TIER_LOW_COLOR, TIER_MEDIUM_COLOR};
use argus_eye::controller::{CycleOutcome, PipelineController};
use argus_eye::error::VisionError;
use argus_eye::frame::{Frame, PixelEncoding};
use argus_eye::models::{BoundingBox, Detection, Detector};
use argus_eye::source::FrameSource;
use argus_eye::PipelineConfig;
use proptest::prelude::*;

/// Yields `remaining` black frames, then reports a failed read
struct FiniteSource {
    remaining: usize,
    open: bool,
}

impl FrameSource for FiniteSource {
    fn open(&mut self, _source_id: u32) -> Result<(), VisionError> {
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, VisionError> {
        if self.remaining == 0 {
            return Err(VisionError::TransientRead("drained".to_string()));
        }
        self.remaining -= 1;
        Ok(Frame::new(16, 12, PixelEncoding::Bgr8))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Returns the same detections for every frame
struct FixedDetector {
    detections: Vec<Detection>,
}

impl Detector for FixedDetector {
    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        Ok(self.detections.clone())
    }

    fn class_name(&self, _class_id: usize) -> &str {
        "object"
    }

    fn num_classes(&self) -> usize {
        1
    }
}

fn config(frame_skip: u32, threshold: f32) -> PipelineConfig {
    PipelineConfig {
        frame_skip,
        confidence_threshold: threshold,
        target_size: (16, 12),
        ..PipelineConfig::default()
    }
}

fn detection(confidence: f32) -> Detection {
    Detection {
        class_id: 0,
        class_name: "object".to_string(),
        bbox: BoundingBox::new(1, 1, 8, 8),
        confidence,
    }
}

proptest! {
    #[test]
    fn test_frame_skip_processes_floor_m_over_n(frame_skip in 1u32..12, captured in 0usize..80) {
        let source = FiniteSource { remaining: captured, open: false };
        let detector = FixedDetector { detections: Vec::new() };
        let mut controller = PipelineController::new(config(frame_skip, 0.5), source, detector).unwrap();
        controller.start().unwrap();

        let mut processed = 0usize;
        for _ in 0..captured {
            if let CycleOutcome::Processed { .. } = controller.cycle().unwrap() {
                processed += 1;
            }
        }

        prop_assert_eq!(processed, captured / frame_skip as usize);
        prop_assert_eq!(controller.stats().captured, captured as u64);
        prop_assert_eq!(controller.stats().skipped as usize, captured - processed);
    }

    #[test]
    fn test_nothing_below_threshold_is_logged(
        confidences in prop::collection::vec(0.0f32..=1.0, 0..20),
        threshold in 0.0f32..=1.0,
    ) {
        let source = FiniteSource { remaining: 1, open: false };
        let detector = FixedDetector { detections: confidences.iter().copied().map(detection).collect() };
        let mut controller = PipelineController::new(config(1, threshold), source, detector).unwrap();
        controller.start().unwrap();
        controller.cycle().unwrap();

        let logged: Vec<f32> = controller.snapshot().iter().map(|r| r.confidence).collect();
        let expected: Vec<f32> = confidences.iter().copied().filter(|c| *c >= threshold).collect();
        prop_assert!(logged.iter().all(|c| *c >= threshold));
        prop_assert_eq!(logged, expected);
    }

    #[test]
    fn test_tier_colors_follow_boundaries(confidence in 0.0f32..=1.0) {
        let expected = if confidence > 0.6 {
            TIER_HIGH_COLOR
        } else if confidence > 0.3 {
            TIER_MEDIUM_COLOR
        } else {
            TIER_LOW_COLOR
        };
        prop_assert_eq!(color_for_confidence(confidence), expected);
    }
}

#[test]
fn test_tier_examples() {
    assert_eq!(ConfidenceTier::for_confidence(0.7), ConfidenceTier::High);
    assert_eq!(ConfidenceTier::for_confidence(0.45), ConfidenceTier::Medium);
    assert_eq!(ConfidenceTier::for_confidence(0.2), ConfidenceTier::Low);
    assert_eq!(ConfidenceTier::for_confidence(0.6), ConfidenceTier::Medium);
    assert_eq!(ConfidenceTier::for_confidence(0.3), ConfidenceTier::Low);
}
