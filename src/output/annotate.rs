use crate::error::ConfigError;
use crate::models::Region;
use crate::pipeline::FrameContext;
use ab_glyph::{FontVec, PxScale};
use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect as DrawRect;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const TEXT_SCALE: f32 = 16.0;

/// Output size of an annotated image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

/// Options of the `photowriter` and `framewriter` stage types
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotateParams {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub size: Option<Size>,
    /// TrueType/OpenType font for label text; without one only boxes are drawn
    #[serde(default)]
    pub font: Option<PathBuf>,
}

fn default_format() -> String {
    "png".to_string()
}

/// Draws the regions of selected stages onto a copy of the frame
pub struct Annotator {
    inputs: Vec<String>,
    font: Option<FontVec>,
    size: Option<Size>,
}

impl Annotator {
    pub fn new(
        stage: &str,
        inputs: Vec<String>,
        font: Option<&Path>,
        size: Option<Size>,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Construction {
            stage: stage.to_string(),
            reason,
        };

        if let Some(size) = size {
            if size.width == 0 || size.height == 0 {
                return Err(invalid("size must be non-zero".to_string()));
            }
        }

        let font = match font {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|e| invalid(format!("failed to read font {}: {}", path.display(), e)))?;
                let font = FontVec::try_from_vec(bytes)
                    .map_err(|e| invalid(format!("invalid font {}: {}", path.display(), e)))?;
                Some(font)
            }
            None => None,
        };

        Ok(Self { inputs, font, size })
    }

    /// Annotated and resized copy of the context's frame
    pub fn render(&self, stage: &str, context: &FrameContext) -> Result<RgbImage> {
        let mut img = context.image()?.clone();

        for source in &self.inputs {
            match context.reports(source) {
                Some(regions) if !regions.is_empty() => self.draw(&mut img, regions),
                _ => warn!(
                    "Stage '{}' takes input from '{}' but '{}' reported no regions for frame {}",
                    stage, source, source, context.frame
                ),
            }
        }

        Ok(match self.size {
            Some(size) => imageops::resize(&img, size.width, size.height, FilterType::Triangle),
            None => img,
        })
    }

    /// Box every region and put its first label above it, or just inside
    /// the box when it touches the top border.
    pub fn draw(&self, img: &mut RgbImage, regions: &[Region]) {
        for region in regions {
            let r = region.rect;
            draw_hollow_rect_mut(
                img,
                DrawRect::at(r.x1 as i32, r.y1 as i32).of_size(r.width(), r.height()),
                BOX_COLOR,
            );
            if r.width() > 2 && r.height() > 2 {
                draw_hollow_rect_mut(
                    img,
                    DrawRect::at(r.x1 as i32 + 1, r.y1 as i32 + 1).of_size(r.width() - 2, r.height() - 2),
                    BOX_COLOR,
                );
            }

            let (Some(font), Some(label)) = (&self.font, region.labels.first()) else {
                continue;
            };
            let text_height = TEXT_SCALE as u32 + 2;
            let text_y = if r.y1 >= text_height {
                r.y1 - text_height
            } else {
                r.y1 + 3
            };
            draw_text_mut(
                img,
                TEXT_COLOR,
                r.x1 as i32 + 2,
                text_y as i32,
                PxScale::from(TEXT_SCALE),
                font,
                &label.label,
            );
        }
    }
}
