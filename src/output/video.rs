use crate::error::ConfigError;
use crate::models::StageOutput;
use crate::output::annotate::{Annotator, Size};
use crate::output::output_path;
use crate::pipeline::{FrameContext, Stage};
use anyhow::{Context, Result, bail};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options of the `videowriter` stage type
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoWriterParams {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub font: Option<PathBuf>,
    /// Display time of each output frame
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u32,
}

fn default_format() -> String {
    "gif".to_string()
}

fn default_delay_ms() -> u32 {
    100
}

/// Output stream of the file currently being written
struct OpenStream {
    path: PathBuf,
    encoder: GifEncoder<BufWriter<File>>,
    frames: usize,
}

/// Writes every frame of a video, annotated, into one output video.
///
/// The stream is opened on frame 0, appended to on every later frame and
/// closed by the completion hook, so each input video gets exactly one
/// open/close cycle. Photos are ignored.
pub struct VideoWriter {
    name: String,
    annotator: Annotator,
    delay: Delay,
    stream: Option<OpenStream>,
    opened: usize,
    closed: usize,
}

impl VideoWriter {
    pub fn new(name: impl Into<String>, inputs: Vec<String>, params: VideoWriterParams) -> Result<Self, ConfigError> {
        let name = name.into();
        if params.format != "gif" {
            return Err(ConfigError::Construction {
                stage: name,
                reason: format!("unsupported video format '{}', only gif is supported", params.format),
            });
        }
        let annotator = Annotator::new(&name, inputs, params.font.as_deref(), params.size)?;

        Ok(Self {
            name,
            annotator,
            delay: Delay::from_numer_denom_ms(params.delay_ms, 1),
            stream: None,
            opened: 0,
            closed: 0,
        })
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of output streams opened and closed so far
    pub fn cycles(&self) -> (usize, usize) {
        (self.opened, self.closed)
    }

    fn open(&mut self, context: &FrameContext, input_root: &Path, output_root: &Path) -> Result<()> {
        if let Some(stale) = &self.stream {
            bail!(
                "stage '{}' got frame 0 of {} while {} is still open",
                self.name,
                context.file.display(),
                stale.path.display()
            );
        }

        let path = output_path(&context.file, input_root, output_root, "-annotated", "gif")?;
        let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut encoder = GifEncoder::new(BufWriter::new(file));
        encoder.set_repeat(Repeat::Infinite)?;

        debug!("Opened {}", path.display());
        self.stream = Some(OpenStream {
            path,
            encoder,
            frames: 0,
        });
        self.opened += 1;
        Ok(())
    }
}

impl Stage for VideoWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, context: &FrameContext, input_root: &Path, output_root: &Path) -> Result<StageOutput> {
        if !context.is_video() {
            return Ok(StageOutput::default());
        }

        if context.frame == 0 {
            self.open(context, input_root, output_root)?;
        }

        let img = self.annotator.render(&self.name, context)?;
        let Some(stream) = self.stream.as_mut() else {
            bail!(
                "stage '{}' got frame {} of {} without an open stream",
                self.name,
                context.frame,
                context.file.display()
            );
        };

        let rgba = DynamicImage::ImageRgb8(img).to_rgba8();
        stream
            .encoder
            .encode_frame(Frame::from_parts(rgba, 0, 0, self.delay))
            .with_context(|| format!("failed to append to {}", stream.path.display()))?;
        stream.frames += 1;

        Ok(StageOutput::file(stream.path.clone()))
    }

    fn completed(&mut self, context: &FrameContext, _input_root: &Path, _output_root: &Path) -> Result<StageOutput> {
        let Some(stream) = self.stream.take() else {
            return Ok(StageOutput::default());
        };

        let OpenStream { path, encoder, frames } = stream;
        // Dropping the encoder writes the trailer and flushes the file, but
        // swallows any I/O error on the way
        drop(encoder);
        self.closed += 1;

        if let Err(e) = check_trailer(&path) {
            if let Err(rm) = std::fs::remove_file(&path) {
                warn!("Failed to remove {}: {}", path.display(), rm);
            }
            return Err(e.context(format!("failed to finish {}", path.display())));
        }

        info!(
            "Wrote {} frames of {} to {}",
            frames,
            context.file.display(),
            path.display()
        );
        Ok(StageOutput::file(path))
    }

    fn abandon(&mut self) {
        if let Some(stream) = self.stream.take() {
            warn!("Discarding partial video {}", stream.path.display());
            drop(stream.encoder);
            if let Err(e) = std::fs::remove_file(&stream.path) {
                warn!("Failed to remove {}: {}", stream.path.display(), e);
            }
            self.closed += 1;
        }
    }
}

/// Last byte of every complete GIF stream
const GIF_TRAILER: u8 = 0x3B;

/// Fail unless `path` ends with the GIF trailer, i.e. was written out in full
fn check_trailer(path: &Path) -> Result<()> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        bail!("{} is empty", path.display());
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8];
    file.read_exact(&mut last)?;
    if last[0] != GIF_TRAILER {
        bail!("{} is truncated", path.display());
    }
    Ok(())
}
