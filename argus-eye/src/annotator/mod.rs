//! Frame annotation: detection boxes, labels and the FPS overlay

pub mod font;

use crate::frame::{Color, Frame};
use crate::models::Detection;

/// Color for confidence above 0.6
pub const TIER_HIGH_COLOR: Color = Color::bgr(37, 245, 75);
/// Color for confidence in (0.3, 0.6]
pub const TIER_MEDIUM_COLOR: Color = Color::bgr(66, 224, 245);
/// Color for confidence at or below 0.3
pub const TIER_LOW_COLOR: Color = Color::bgr(78, 66, 245);
/// FPS overlay color, never used for detections
pub const FPS_COLOR: Color = Color::bgr(0, 0, 255);

/// Visual emphasis band of an accepted detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn for_confidence(confidence: f32) -> Self {
        if confidence > 0.6 {
            ConfidenceTier::High
        } else if confidence > 0.3 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn color(self) -> Color {
        match self {
            ConfidenceTier::High => TIER_HIGH_COLOR,
            ConfidenceTier::Medium => TIER_MEDIUM_COLOR,
            ConfidenceTier::Low => TIER_LOW_COLOR,
        }
    }
}

/// Tier color for a confidence score
pub fn color_for_confidence(confidence: f32) -> Color {
    ConfidenceTier::for_confidence(confidence).color()
}

/// Label drawn above a detection box
pub fn label_text(detection: &Detection) -> String {
    format!("{}: {:.2}", detection.class_name, detection.confidence)
}

/// Text of the FPS overlay
pub fn fps_text(fps: f64) -> String {
    format!("FPS: {:.2}", fps)
}

/// Stroke and text geometry
#[derive(Debug, Clone)]
pub struct AnnotationStyle {
    pub line_thickness: u32,
    pub text_scale: u32,
    /// Gap between a label's baseline and the top edge of its box
    pub label_gap: i32,
    /// Baseline-left corner of the FPS text
    pub fps_origin: (i32, i32),
    pub fps_color: Color,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            line_thickness: 2,
            text_scale: 2,
            label_gap: 5,
            fps_origin: (50, 50),
            fps_color: FPS_COLOR,
        }
    }
}

/// Draws onto frames in place; holds no state besides its style
#[derive(Debug, Clone, Default)]
pub struct Annotator {
    style: AnnotationStyle,
}

impl Annotator {
    pub fn new(style: AnnotationStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &AnnotationStyle {
        &self.style
    }

    /// Draw the detection's box and a "{class}: {confidence}" label just above
    /// its top-left corner.
    pub fn draw_detection(&self, frame: &mut Frame, detection: &Detection, color: Color) {
        let bbox = detection.bbox;
        self.draw_rectangle(frame, bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max, color);

        let baseline = bbox.y_min.saturating_sub(self.style.label_gap);
        let top = baseline.saturating_sub(font::text_height(self.style.text_scale));
        font::draw_text(frame, bbox.x_min, top, &label_text(detection), color, self.style.text_scale);
    }

    /// Draw "FPS: {value}" at the fixed overlay position
    pub fn draw_fps_overlay(&self, frame: &mut Frame, fps: f64) {
        let (x, baseline) = self.style.fps_origin;
        let top = baseline - font::text_height(self.style.text_scale);
        font::draw_text(frame, x, top, &fps_text(fps), self.style.fps_color, self.style.text_scale);
    }

    fn draw_rectangle(&self, frame: &mut Frame, left: i32, top: i32, right: i32, bottom: i32, color: Color) {
        let thickness = self.style.line_thickness.max(1) as i32;
        let (width, height) = (frame.width() as i32, frame.height() as i32);
        // Stroke straddles the box edge
        let outer = thickness / 2;
        for offset in -outer..=(thickness - outer - 1) {
            let (l, t) = (left.saturating_add(offset), top.saturating_add(offset));
            let (r, b) = (right.saturating_sub(offset), bottom.saturating_sub(offset));
            if l > r || t > b {
                break;
            }
            // Edges outside the frame stay outside; only the visible span is walked
            for x in l.clamp(-1, width)..=r.clamp(-1, width) {
                frame.put_pixel(x, t, color);
                frame.put_pixel(x, b, color);
            }
            for y in t.clamp(-1, height)..=b.clamp(-1, height) {
                frame.put_pixel(l, y, color);
                frame.put_pixel(r, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelEncoding;
    use crate::models::BoundingBox;

    fn detection(confidence: f32) -> Detection {
        Detection {
            class_id: 16,
            class_name: "dog".to_string(),
            bbox: BoundingBox::new(100, 100, 200, 180),
            confidence,
        }
    }

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(ConfidenceTier::for_confidence(0.7), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::for_confidence(0.45), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::for_confidence(0.2), ConfidenceTier::Low);
    }

    #[test]
    fn test_confidence_tier_boundaries() {
        assert_eq!(ConfidenceTier::for_confidence(0.6), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::for_confidence(0.3), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::for_confidence(0.600_001), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::for_confidence(1.0), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::for_confidence(0.0), ConfidenceTier::Low);
    }

    #[test]
    fn test_tier_colors_are_distinct_from_fps() {
        let colors = [TIER_HIGH_COLOR, TIER_MEDIUM_COLOR, TIER_LOW_COLOR];
        for color in colors {
            assert_ne!(color, FPS_COLOR);
        }
        assert_eq!(color_for_confidence(0.9), TIER_HIGH_COLOR);
        assert_eq!(color_for_confidence(0.5), TIER_MEDIUM_COLOR);
        assert_eq!(color_for_confidence(0.1), TIER_LOW_COLOR);
    }

    #[test]
    fn test_label_and_fps_text() {
        assert_eq!(label_text(&detection(0.8)), "dog: 0.80");
        assert_eq!(label_text(&detection(0.456)), "dog: 0.46");
        assert_eq!(fps_text(29.9712), "FPS: 29.97");
    }

    #[test]
    fn test_draw_detection_paints_box_edges() {
        let annotator = Annotator::default();
        let mut frame = Frame::new(640, 480, PixelEncoding::Bgr8);
        let det = detection(0.8);
        annotator.draw_detection(&mut frame, &det, TIER_HIGH_COLOR);

        assert_eq!(frame.pixel(100, 100), Some(TIER_HIGH_COLOR));
        assert_eq!(frame.pixel(200, 180), Some(TIER_HIGH_COLOR));
        assert_eq!(frame.pixel(150, 180), Some(TIER_HIGH_COLOR));
        assert_eq!(frame.pixel(99, 140), Some(TIER_HIGH_COLOR));
        // Interior stays untouched
        assert_eq!(frame.pixel(150, 140), Some(Color::rgb(0, 0, 0)));
    }

    #[test]
    fn test_draw_detection_label_sits_above_box() {
        let annotator = Annotator::default();
        let mut frame = Frame::new(640, 480, PixelEncoding::Bgr8);
        annotator.draw_detection(&mut frame, &detection(0.8), TIER_HIGH_COLOR);

        let label_band = (100 - 5 - 14)..(100 - 5);
        let lit_in_band = label_band
            .flat_map(|y| (100..300).map(move |x| (x, y)))
            .filter(|&(x, y)| frame.pixel(x, y as u32) == Some(TIER_HIGH_COLOR))
            .count();
        assert!(lit_in_band > 0);
    }

    #[test]
    fn test_draw_detection_clips_at_frame_edge() {
        let annotator = Annotator::default();
        let mut frame = Frame::new(64, 48, PixelEncoding::Bgr8);
        let mut det = detection(0.5);
        det.bbox = BoundingBox::new(-10, 2, 80, 60);
        annotator.draw_detection(&mut frame, &det, TIER_MEDIUM_COLOR);
        assert_eq!(frame.pixel(10, 2), Some(TIER_MEDIUM_COLOR));
    }

    #[test]
    fn test_draw_detection_with_extreme_coordinates_finishes() {
        let annotator = Annotator::default();
        let mut frame = Frame::new(64, 48, PixelEncoding::Bgr8);
        let mut det = detection(0.9);
        det.bbox = BoundingBox::new(2, 3, i32::MAX, i32::MAX);
        annotator.draw_detection(&mut frame, &det, TIER_HIGH_COLOR);
        assert_eq!(frame.pixel(15, 3), Some(TIER_HIGH_COLOR));
        assert_eq!(frame.pixel(2, 10), Some(TIER_HIGH_COLOR));
        assert_eq!(frame.pixel(30, 30), Some(Color::rgb(0, 0, 0)));

        let mut frame = Frame::new(64, 48, PixelEncoding::Bgr8);
        det.bbox = BoundingBox::new(i32::MIN, i32::MIN, 20, 12);
        annotator.draw_detection(&mut frame, &det, TIER_LOW_COLOR);
        assert_eq!(frame.pixel(20, 5), Some(TIER_LOW_COLOR));
        assert_eq!(frame.pixel(8, 12), Some(TIER_LOW_COLOR));
    }

    #[test]
    fn test_fps_overlay_uses_overlay_color() {
        let annotator = Annotator::default();
        let mut frame = Frame::new(640, 480, PixelEncoding::Rgb8);
        annotator.draw_fps_overlay(&mut frame, 12.5);

        let mut found = false;
        for y in 36..50 {
            for x in 50..200 {
                match frame.pixel(x, y) {
                    Some(c) if c == FPS_COLOR => found = true,
                    Some(c) => assert_eq!(c, Color::rgb(0, 0, 0)),
                    None => {}
                }
            }
        }
        assert!(found);
    }
}
