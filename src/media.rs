use crate::error::MediaError;
use anyhow::{Result, bail};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Lazily decoded frames of a video stream, in order
pub type FrameStream = Box<dyn Iterator<Item = image::ImageResult<DynamicImage>>>;

/// Decoding backend used by the orchestrator to classify and read input files
pub trait MediaDecoder: Send {
    /// Decode `path` as a single still image
    fn decode_photo(&self, path: &Path) -> Result<DynamicImage>;

    /// Open `path` as a frame-iterable stream
    fn open_video(&self, path: &Path) -> Result<FrameStream>;
}

/// Decoder backed by the `image` crate.
///
/// Still formats decode as photos. GIF is a frame container, so it is never
/// decoded as a photo and is read as a video stream instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl MediaDecoder for ImageDecoder {
    fn decode_photo(&self, path: &Path) -> Result<DynamicImage> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        if reader.format() == Some(ImageFormat::Gif) {
            bail!("{} is a frame container, not a still image", path.display());
        }
        Ok(reader.decode()?)
    }

    fn open_video(&self, path: &Path) -> Result<FrameStream> {
        let file = BufReader::new(File::open(path)?);
        let decoder = GifDecoder::new(file)?;
        let frames = decoder
            .into_frames()
            .map(|frame| frame.map(|f| DynamicImage::ImageRgba8(f.into_buffer())));
        Ok(Box::new(frames))
    }
}

/// Convert any supported frame into an RGB image plus a grayscale copy.
///
/// Grayscale, RGB and RGBA sources are accepted; alpha is dropped. Any other
/// channel layout is an error for the file being processed.
pub fn normalize(img: &DynamicImage) -> Result<(RgbImage, GrayImage), MediaError> {
    match img.color().channel_count() {
        1 | 3 | 4 => Ok((img.to_rgb8(), img.to_luma8())),
        n => Err(MediaError::UnsupportedChannels(n)),
    }
}
