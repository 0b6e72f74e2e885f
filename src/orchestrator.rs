use crate::config::PipelineConfig;
use crate::error::{ConfigError, MediaError};
use crate::media::{FrameStream, ImageDecoder, MediaDecoder, normalize};
use crate::models::{MediaKind, StageOutput};
use crate::pipeline::{FrameContext, Stage};
use crate::registry::StageRegistry;
use anyhow::{Context, Result};
use image::DynamicImage;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What happened to one input file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Neither a photo nor a video; nothing was run
    Skipped,
    Completed(FileSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    pub kind: MediaKind,
    /// Number of frames run through the chain
    pub frames: usize,
    /// Non-empty outputs of the completion hooks, keyed by stage name
    pub artifacts: IndexMap<String, StageOutput>,
}

/// A classified input file, ready to be iterated
enum Media {
    Photo(DynamicImage),
    Video(FrameStream),
}

/// Runs the stage chain over input files, one file and one frame at a time.
///
/// Stages are built once and reused for every file handed to
/// [`Pipeline::process_file`]; stateful stages rely on this to keep per-file
/// state between frames.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    decoder: Box<dyn MediaDecoder>,
    input_root: PathBuf,
    output_root: PathBuf,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>, input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            stages,
            decoder: Box::new(ImageDecoder),
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Build fresh stages for `config` from the registry
    pub fn from_config(
        config: &PipelineConfig,
        registry: &StageRegistry,
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let stages = registry.build(config)?;
        Ok(Self::new(stages, input_root, output_root))
    }

    /// Replace the decoding backend
    pub fn with_decoder(mut self, decoder: impl MediaDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every frame of `path` through the chain, then the completion hooks.
    ///
    /// Files that decode neither as a photo nor as a video are skipped. Any
    /// other failure is returned after every stage dropped its per-file state.
    pub fn process_file(&mut self, path: &Path) -> Result<FileOutcome> {
        let Some(media) = self.classify(path) else {
            warn!("Ignoring {}: neither a photo nor a video", path.display());
            return Ok(FileOutcome::Skipped);
        };

        let result = match media {
            Media::Photo(img) => self.run_photo(path, img),
            Media::Video(frames) => self.run_video(path, frames),
        };

        if result.is_err() {
            for stage in &mut self.stages {
                stage.abandon();
            }
        }
        result.with_context(|| format!("failed to process {}", path.display()))
    }

    fn classify(&self, path: &Path) -> Option<Media> {
        let photo_err = match self.decoder.decode_photo(path) {
            Ok(img) => {
                debug!("{} opened as photo", path.display());
                return Some(Media::Photo(img));
            }
            Err(e) => e,
        };

        match self.decoder.open_video(path) {
            Ok(frames) => {
                debug!("{} opened as video", path.display());
                Some(Media::Video(frames))
            }
            Err(video_err) => {
                debug!(
                    "{}: not a photo ({:#}), not a video ({:#})",
                    path.display(),
                    photo_err,
                    video_err
                );
                None
            }
        }
    }

    fn run_photo(&mut self, path: &Path, img: DynamicImage) -> Result<FileOutcome> {
        info!("Processing photo {}", path.display());
        let mut context = frame_context(path, MediaKind::Photo, 0, &img)?;
        drop(img);
        self.run_chain(&mut context)?;
        let artifacts = self.run_completed(&context)?;

        Ok(FileOutcome::Completed(FileSummary {
            kind: MediaKind::Photo,
            frames: 1,
            artifacts,
        }))
    }

    fn run_video(&mut self, path: &Path, frames: FrameStream) -> Result<FileOutcome> {
        info!("Processing video {}", path.display());
        let mut last = None;
        let mut count = 0;

        for (index, frame) in frames.enumerate() {
            let img = frame.map_err(|source| MediaError::Frame { frame: index, source })?;
            let mut context = frame_context(path, MediaKind::Video, index, &img)?;
            drop(img);
            self.run_chain(&mut context)?;
            count = index + 1;
            last = Some(context);
        }

        let Some(last) = last else {
            warn!("Ignoring {}: video has no frames", path.display());
            return Ok(FileOutcome::Skipped);
        };

        // The last frame's context tells stateful stages the stream has ended
        let artifacts = self.run_completed(&last)?;
        info!("Processed {} frames of {}", count, path.display());

        Ok(FileOutcome::Completed(FileSummary {
            kind: MediaKind::Video,
            frames: count,
            artifacts,
        }))
    }

    /// Run every stage in declaration order, installing each output under
    /// the stage's name as soon as it returns, then drop the pixel buffers.
    fn run_chain(&mut self, context: &mut FrameContext) -> Result<()> {
        for stage in &mut self.stages {
            debug!("Executing {} on {} frame {}", stage.name(), context.file.display(), context.frame);
            let output = stage
                .execute(context, &self.input_root, &self.output_root)
                .with_context(|| format!("stage '{}' failed on frame {}", stage.name(), context.frame))?;
            context.install(stage.name(), output);
        }

        context.release_images();
        Ok(())
    }

    fn run_completed(&mut self, context: &FrameContext) -> Result<IndexMap<String, StageOutput>> {
        let mut artifacts = IndexMap::new();
        for stage in &mut self.stages {
            let output = stage
                .completed(context, &self.input_root, &self.output_root)
                .with_context(|| format!("stage '{}' failed to complete", stage.name()))?;
            if output != StageOutput::default() {
                artifacts.insert(stage.name().to_string(), output);
            }
        }
        Ok(artifacts)
    }
}

fn frame_context(path: &Path, kind: MediaKind, index: usize, img: &DynamicImage) -> Result<FrameContext, MediaError> {
    let (rgb, gray) = normalize(img)?;
    Ok(FrameContext::new(path, kind, index, rgb, gray))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use image::{GrayAlphaImage, LumaA, Rgb, RgbImage};
    use std::sync::{Arc, Mutex};

    /// Records every call it gets into a shared log
    struct Probe {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Stage for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        fn execute(&mut self, context: &FrameContext, _: &Path, _: &Path) -> Result<StageOutput> {
            let seen: Vec<_> = context.outputs.keys().cloned().collect();
            self.log.lock().unwrap().push(format!(
                "{} exec {} sees [{}] image={}",
                self.name,
                context.frame,
                seen.join(","),
                context.image.is_some()
            ));
            Ok(StageOutput::reports(Vec::new()))
        }

        fn completed(&mut self, context: &FrameContext, _: &Path, _: &Path) -> Result<StageOutput> {
            self.log.lock().unwrap().push(format!(
                "{} completed {} image={}",
                self.name,
                context.frame,
                context.image.is_some()
            ));
            Ok(StageOutput::default())
        }

        fn abandon(&mut self) {
            self.log.lock().unwrap().push(format!("{} abandon", self.name));
        }
    }

    /// Serves canned media instead of reading files
    struct CannedDecoder {
        photo: Option<DynamicImage>,
        video: Option<Vec<DynamicImage>>,
    }

    impl MediaDecoder for CannedDecoder {
        fn decode_photo(&self, _: &Path) -> Result<DynamicImage> {
            match &self.photo {
                Some(img) => Ok(img.clone()),
                None => bail!("not a photo"),
            }
        }

        fn open_video(&self, _: &Path) -> Result<FrameStream> {
            match &self.video {
                Some(frames) => Ok(Box::new(frames.clone().into_iter().map(Ok::<_, image::ImageError>))),
                None => bail!("not a video"),
            }
        }
    }

    fn rgb(shade: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([shade, shade, shade])))
    }

    fn pipeline(decoder: CannedDecoder) -> (Pipeline, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Box<dyn Stage>> = ["a", "b"]
            .iter()
            .map(|n| {
                Box::new(Probe {
                    name: n.to_string(),
                    log: log.clone(),
                }) as Box<dyn Stage>
            })
            .collect();
        (Pipeline::new(stages, "/in", "/out").with_decoder(decoder), log)
    }

    #[test]
    fn photo_runs_chain_once_then_completes() {
        let (mut p, log) = pipeline(CannedDecoder {
            photo: Some(rgb(10)),
            video: None,
        });
        let outcome = p.process_file(Path::new("/in/x.png")).unwrap();
        assert!(matches!(outcome, FileOutcome::Completed(FileSummary { kind: MediaKind::Photo, frames: 1, .. })));
        assert_eq!(
            *log.lock().unwrap(),
            [
                "a exec 0 sees [] image=true",
                "b exec 0 sees [a] image=true",
                "a completed 0 image=false",
                "b completed 0 image=false",
            ]
        );
    }

    #[test]
    fn video_completes_once_with_last_frame() {
        let (mut p, log) = pipeline(CannedDecoder {
            photo: None,
            video: Some(vec![rgb(1), rgb(2), rgb(3)]),
        });
        let outcome = p.process_file(Path::new("/in/x.gif")).unwrap();
        assert!(matches!(outcome, FileOutcome::Completed(FileSummary { kind: MediaKind::Video, frames: 3, .. })));

        let log = log.lock().unwrap();
        let completions: Vec<_> = log.iter().filter(|l| l.contains("completed")).collect();
        assert_eq!(completions, ["a completed 2 image=false", "b completed 2 image=false"]);
        assert_eq!(log.iter().filter(|l| l.starts_with("a exec")).count(), 3);
    }

    #[test]
    fn unclassifiable_file_is_skipped() {
        let (mut p, log) = pipeline(CannedDecoder { photo: None, video: None });
        assert_eq!(p.process_file(Path::new("/in/notes.txt")).unwrap(), FileOutcome::Skipped);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_video_is_skipped() {
        let (mut p, log) = pipeline(CannedDecoder {
            photo: None,
            video: Some(Vec::new()),
        });
        assert_eq!(p.process_file(Path::new("/in/empty.gif")).unwrap(), FileOutcome::Skipped);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn unsupported_channels_fail_the_file_and_abandon_stages() {
        let two_channel = DynamicImage::ImageLumaA8(GrayAlphaImage::from_pixel(3, 3, LumaA([1, 255])));
        let (mut p, log) = pipeline(CannedDecoder {
            photo: None,
            video: Some(vec![rgb(1), two_channel]),
        });
        let err = p.process_file(Path::new("/in/bad.gif")).unwrap_err();
        assert!(format!("{:#}", err).contains("2 channels"));

        let log = log.lock().unwrap();
        assert!(log.iter().all(|l| !l.contains("completed")));
        assert_eq!(&log[log.len() - 2..], ["a abandon", "b abandon"]);
    }
}
