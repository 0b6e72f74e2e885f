use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Axis-aligned rectangle in full-image pixel coordinates.
///
/// Serialized as `[x1, y1, x2, y2]`. Construction guarantees `x1 < x2` and
/// `y1 < y2`, so a `Rect` always covers at least one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 4]", into = "[u32; 4]")]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rect {
    /// Returns `None` for a degenerate rectangle
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
        (x1 < x2 && y1 < y2).then_some(Self { x1, y1, x2, y2 })
    }

    /// Rectangle covering a whole `width` x `height` image
    pub fn full(width: u32, height: u32) -> Option<Self> {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Shift both corners by the given offset
    pub fn translate(&self, dx: u32, dy: u32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Clip to a `width` x `height` area anchored at the origin.
    /// Returns `None` if nothing of the rectangle is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
        Self::new(
            self.x1.min(width),
            self.y1.min(height),
            self.x2.min(width),
            self.y2.min(height),
        )
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x1 >= self.x1 && other.y1 >= self.y1 && other.x2 <= self.x2 && other.y2 <= self.y2
    }
}

impl TryFrom<[u32; 4]> for Rect {
    type Error = String;

    fn try_from([x1, y1, x2, y2]: [u32; 4]) -> Result<Self, Self::Error> {
        Rect::new(x1, y1, x2, y2)
            .ok_or_else(|| format!("degenerate rect [{}, {}, {}, {}]", x1, y1, x2, y2))
    }
}

impl From<Rect> for [u32; 4] {
    fn from(r: Rect) -> Self {
        [r.x1, r.y1, r.x2, r.y2]
    }
}

/// One label attached to a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            confidence: None,
            method: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

/// A labelled rectangle, the unit every detector and recognizer reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub labels: Vec<Label>,
    pub rect: Rect,
}

impl Region {
    pub fn new(rect: Rect, labels: Vec<Label>) -> Self {
        Self { labels, rect }
    }

    pub fn labelled(rect: Rect, label: impl Into<String>) -> Self {
        Self::new(rect, vec![Label::new(label)])
    }

    /// True if any of this region's labels appears in `triggers`, or
    /// `triggers` holds the `all` sentinel.
    pub fn is_triggered_by(&self, triggers: &[String]) -> bool {
        triggers.iter().any(|t| t == ALL_LABELS)
            || self
                .labels
                .iter()
                .any(|l| triggers.iter().any(|t| *t == l.label))
    }
}

/// Trigger-label sentinel matching every region
pub const ALL_LABELS: &str = "all";

/// What a stage hands back after each call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports: Option<Vec<Region>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl StageOutput {
    pub fn reports(reports: Vec<Region>) -> Self {
        Self {
            reports: Some(reports),
            file: None,
        }
    }

    pub fn file(path: PathBuf) -> Self {
        Self {
            reports: None,
            file: Some(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

/// Per-file JSON report artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file: PathBuf,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub frames: Vec<FrameReport>,
}

/// One frame of a [`FileReport`], keyed by the name of each reporting stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame: usize,
    #[serde(flatten)]
    pub stages: IndexMap<String, Vec<Region>>,
}

/// Connected component found by the contour detector, in scan-area coordinates
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> u32 {
        self.pixel_count
    }

    /// Share of the bounding box covered by the component's own pixels
    pub fn fill_ratio(&self) -> f32 {
        (self.area() as f32 / (self.width() * self.height()) as f32).min(1.0)
    }

    pub fn perimeter(&self) -> f32 {
        // Approximate perimeter from bounding box
        2.0 * (self.width() as f32 + self.height() as f32)
    }

    pub fn circularity(&self) -> f32 {
        let perimeter = self.perimeter();
        // Bounding box area gives a steadier estimate than pixel count for edge contours
        let area = (self.width() * self.height()) as f32;

        if area == 0.0 {
            return 0.0;
        }

        // Circularity = perimeter² / (4π × area)
        (perimeter * perimeter) / (4.0 * std::f32::consts::PI * area)
    }

    pub fn aspect_ratio(&self) -> f32 {
        let w = self.width() as f32;
        let h = self.height() as f32;
        if h == 0.0 {
            return 0.0;
        }
        w / h
    }

    pub fn is_circular(&self, threshold: f32) -> bool {
        let circ = self.circularity();
        (0.7..=threshold).contains(&circ)
    }

    pub fn radius(&self) -> f32 {
        (self.width() as f32 + self.height() as f32) / 4.0
    }

    pub fn is_reasonable_size(&self, min_radius: f32, max_radius: f32) -> bool {
        let r = self.radius();
        r >= min_radius && r <= max_radius
    }

    /// Exclusive-bound rectangle around the component
    pub fn rect(&self) -> Rect {
        Rect {
            x1: self.min_x,
            y1: self.min_y,
            x2: self.max_x + 1,
            y2: self.max_y + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_rejects_degenerate() {
        assert!(Rect::new(5, 5, 5, 10).is_none());
        assert!(Rect::new(6, 5, 5, 10).is_none());
        assert!(Rect::new(0, 0, 1, 1).is_some());
    }

    #[test]
    fn rect_serializes_as_corner_array() {
        let r = Rect::new(1, 2, 30, 40).unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), "[1,2,30,40]");
        let back: Rect = serde_json::from_str("[1,2,30,40]").unwrap();
        assert_eq!(back, r);
        assert!(serde_json::from_str::<Rect>("[10,2,3,40]").is_err());
    }

    #[test]
    fn clip_keeps_inside_part() {
        let r = Rect::new(90, 10, 120, 50).unwrap();
        assert_eq!(r.clip(100, 100), Rect::new(90, 10, 100, 50));
        assert_eq!(r.clip(80, 100), None);
    }

    #[test]
    fn region_trigger_matching() {
        let r = Region::labelled(Rect::new(0, 0, 4, 4).unwrap(), "face");
        assert!(r.is_triggered_by(&["face".to_string()]));
        assert!(r.is_triggered_by(&["all".to_string()]));
        assert!(!r.is_triggered_by(&["car".to_string()]));
        assert!(!r.is_triggered_by(&[]));
    }

    #[test]
    fn label_optional_fields_are_omitted() {
        let json = serde_json::to_string(&Label::new("cat")).unwrap();
        assert_eq!(json, r#"{"label":"cat"}"#);
        let json = serde_json::to_string(&Label::new("cat").with_method("lbp")).unwrap();
        assert_eq!(json, r#"{"label":"cat","method":"lbp"}"#);
    }

    #[test]
    fn contour_rect_is_exclusive() {
        let c = Contour {
            label: 1,
            min_x: 3,
            min_y: 4,
            max_x: 9,
            max_y: 4,
            pixel_count: 7,
        };
        assert_eq!(c.rect(), Rect::new(3, 4, 10, 5).unwrap());
        assert_eq!(c.width(), 7);
        assert_eq!(c.fill_ratio(), 1.0);

        let outline = Contour {
            max_y: 7,
            pixel_count: 14,
            ..c
        };
        assert_eq!(outline.fill_ratio(), 0.5);
    }
}
