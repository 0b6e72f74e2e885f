pub mod config;
pub mod detection;
pub mod distributor;
pub mod error;
pub mod media;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod registry;

pub use config::PipelineConfig;
pub use distributor::{InProcessLauncher, ProcessLauncher, RunSummary, WorkDistributor};
pub use error::{ConfigError, DistributorError, MediaError};
pub use models::{FileReport, FrameReport, Label, MediaKind, Rect, Region, StageOutput};
pub use orchestrator::{FileOutcome, FileSummary, Pipeline};
pub use pipeline::{Detector, DetectorStage, FrameContext, Stage};
pub use registry::StageRegistry;
