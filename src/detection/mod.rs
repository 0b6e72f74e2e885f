//! Detection and recognition capabilities.
//!
//! Each type here implements [`Detector`](crate::pipeline::Detector) and knows
//! nothing about ROIs or the stage chain; it is wrapped in a
//! [`DetectorStage`](crate::pipeline::DetectorStage) by the registry.

pub mod circles;
pub mod contour_detector;
pub mod contours;
pub mod ocr;
pub mod preprocessing;
pub mod tone;

pub use contour_detector::{ContourDetector, ContourDetectorParams};
pub use ocr::{TextRecognizer, TextRecognizerParams};
pub use tone::{ToneClassifier, ToneClassifierParams, ToneStrategy};
