//! 文档分析：数据类型、步骤追踪、工作单元、流水线与控制器

pub mod controller;
pub mod fallback;
pub mod pipeline;
pub mod steps;
pub mod types;
pub mod work;

pub use controller::{AnalysisController, RunHandle, RunId};
pub use fallback::fallback_result;
pub use pipeline::{Pipeline, PipelineStep, StepKind};
pub use steps::{StepId, StepStatus, StepTracker, ThinkingStep};
pub use types::{AnalysisResult, Clause, ClauseRegion, DocumentFile, KeyDate, Signature};
pub use work::{
    GenerateSummary, InitializeRecord, RunContext, SimulatedDelay, StepOutcome, StepWork,
    UploadToStorage,
};
