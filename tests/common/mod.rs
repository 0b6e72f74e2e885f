mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from mediaminer for tests
pub use mediaminer::{
    FileOutcome, FileReport, FileSummary, MediaKind, Pipeline, PipelineConfig, Rect, Region, RunSummary,
    StageRegistry,
};
