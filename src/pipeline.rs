use crate::config::INPUT_FILES;
use crate::models::{MediaKind, Rect, Region, StageOutput};
use anyhow::{Result, anyhow};
use image::{GrayImage, RgbImage, imageops};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Per-frame accumulator threaded through the stage chain.
///
/// Holds the decoded frame in canonical form (RGB plus grayscale) and the
/// output of every stage that has run so far, keyed by stage name in
/// declaration order. The image buffers are released once the chain finishes
/// with the frame; the outputs stay until the file's completion hooks ran.
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub file: PathBuf,
    pub kind: MediaKind,
    /// Running frame index, 0 for photos
    pub frame: usize,
    pub image: Option<RgbImage>,
    pub gray: Option<GrayImage>,
    pub outputs: IndexMap<String, StageOutput>,
}

impl FrameContext {
    pub fn new(
        file: impl Into<PathBuf>,
        kind: MediaKind,
        frame: usize,
        image: RgbImage,
        gray: GrayImage,
    ) -> Self {
        Self {
            file: file.into(),
            kind,
            frame,
            image: Some(image),
            gray: Some(gray),
            outputs: IndexMap::new(),
        }
    }

    pub fn is_photo(&self) -> bool {
        self.kind == MediaKind::Photo
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    pub fn image(&self) -> Result<&RgbImage> {
        self.image
            .as_ref()
            .ok_or_else(|| anyhow!("frame {} image already released", self.frame))
    }

    pub fn gray(&self) -> Result<&GrayImage> {
        self.gray
            .as_ref()
            .ok_or_else(|| anyhow!("frame {} grayscale image already released", self.frame))
    }

    pub fn output(&self, stage: &str) -> Option<&StageOutput> {
        self.outputs.get(stage)
    }

    /// Regions last reported by `stage`, if it ran and produced any reports
    pub fn reports(&self, stage: &str) -> Option<&[Region]> {
        self.outputs.get(stage)?.reports.as_deref()
    }

    pub fn install(&mut self, stage: impl Into<String>, output: StageOutput) {
        self.outputs.insert(stage.into(), output);
    }

    /// Drop the pixel buffers, keeping scalar fields and stage outputs
    pub fn release_images(&mut self) {
        self.image = None;
        self.gray = None;
    }
}

/// Contract shared by every pipeline step: detectors, recognizers and writers.
///
/// Stages are built once per worker and see every file routed to it, one
/// frame at a time and strictly in sequence.
pub trait Stage: Send {
    /// Unique stage name, also the key of its output in the [`FrameContext`]
    fn name(&self) -> &str;

    /// Run on one frame. Outputs of earlier stages are visible in `context`.
    fn execute(
        &mut self,
        context: &FrameContext,
        input_root: &Path,
        output_root: &Path,
    ) -> Result<StageOutput>;

    /// Called exactly once per file, after its last frame, with that frame's context.
    fn completed(
        &mut self,
        context: &FrameContext,
        input_root: &Path,
        output_root: &Path,
    ) -> Result<StageOutput> {
        let _ = (context, input_root, output_root);
        Ok(StageOutput::default())
    }

    /// Called instead of [`Stage::completed`] when a file fails part-way
    fn abandon(&mut self) {}
}

/// Pixels handed to a [`Detector`]: the full frame or a cropped ROI
#[derive(Clone, Copy)]
pub struct ScanArea<'a> {
    pub image: &'a RgbImage,
    pub gray: &'a GrayImage,
}

impl ScanArea<'_> {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Rectangle covering the whole area in its own coordinates
    pub fn bounds(&self) -> Option<Rect> {
        Rect::full(self.width(), self.height())
    }
}

/// An opaque detection or recognition capability.
///
/// Returned rects are relative to the scanned area; [`DetectorStage`] takes
/// care of translating them back to full-image coordinates.
pub trait Detector: Send {
    fn scan(&mut self, area: ScanArea<'_>) -> Result<Vec<Region>>;
}

/// Scan the whole frame
pub fn scan_full(detector: &mut dyn Detector, image: &RgbImage, gray: &GrayImage) -> Result<Vec<Region>> {
    let regions = detector.scan(ScanArea { image, gray })?;
    Ok(regions
        .into_iter()
        .filter_map(|r| clip_region(r, image.width(), image.height()))
        .collect())
}

/// Crop to `roi`, scan the crop, and translate the results to full-image
/// coordinates. Results are clipped to the crop, so every returned rect lies
/// inside both the ROI and the image.
pub fn scan_roi(
    detector: &mut dyn Detector,
    image: &RgbImage,
    gray: &GrayImage,
    roi: Rect,
) -> Result<Vec<Region>> {
    let Some(roi) = roi.clip(image.width(), image.height()) else {
        debug!(?roi, "ROI lies outside the frame, skipping");
        return Ok(Vec::new());
    };

    let image_crop = imageops::crop_imm(image, roi.x1, roi.y1, roi.width(), roi.height()).to_image();
    let gray_crop = imageops::crop_imm(gray, roi.x1, roi.y1, roi.width(), roi.height()).to_image();

    let regions = detector.scan(ScanArea {
        image: &image_crop,
        gray: &gray_crop,
    })?;

    Ok(regions
        .into_iter()
        .filter_map(|r| clip_region(r, roi.width(), roi.height()))
        .map(|mut r| {
            r.rect = r.rect.translate(roi.x1, roi.y1);
            r
        })
        .collect())
}

fn clip_region(mut region: Region, width: u32, height: u32) -> Option<Region> {
    region.rect = region.rect.clip(width, height)?;
    Some(region)
}

/// Generic stage wrapping a [`Detector`] with input routing.
///
/// Each configured input is either `files` (scan the whole frame) or the name
/// of an earlier stage whose regions are re-scanned as ROIs when their labels
/// match the trigger labels.
pub struct DetectorStage<D> {
    name: String,
    inputs: Vec<String>,
    trigger_labels: Vec<String>,
    detector: D,
}

impl<D: Detector> DetectorStage<D> {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<String>,
        trigger_labels: Vec<String>,
        detector: D,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            trigger_labels,
            detector,
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }
}

impl<D: Detector> Stage for DetectorStage<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, context: &FrameContext, _input_root: &Path, _output_root: &Path) -> Result<StageOutput> {
        let image = context.image()?;
        let gray = context.gray()?;
        let mut all_regions = Vec::new();

        for source in &self.inputs {
            if source == INPUT_FILES {
                all_regions.extend(scan_full(&mut self.detector, image, gray)?);
                continue;
            }

            if self.trigger_labels.is_empty() {
                warn!(
                    "Stage '{}' takes input from '{}' but has no trigger labels, skipping source",
                    self.name, source
                );
                continue;
            }

            let rois = match context.reports(source) {
                Some(rois) if !rois.is_empty() => rois,
                _ => {
                    warn!(
                        "Stage '{}' takes input from '{}' but '{}' reported no regions for frame {}",
                        self.name, source, source, context.frame
                    );
                    continue;
                }
            };

            for roi in rois.iter().filter(|r| r.is_triggered_by(&self.trigger_labels)) {
                all_regions.extend(scan_roi(&mut self.detector, image, gray, roi.rect)?);
            }
        }

        debug!("Stage '{}' found {} regions", self.name, all_regions.len());
        Ok(StageOutput::reports(all_regions))
    }
}
