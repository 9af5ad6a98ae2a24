//! 分析流水线：固定顺序的六个步骤及其工作单元
//!
//! 步骤顺序与描述固定；每步的工作单元可替换（with_work），阶段归属由 StepKind::phase 决定。

use std::sync::Arc;

use crate::analysis::work::{
    GenerateSummary, InitializeRecord, SimulatedDelay, StepWork, UploadToStorage,
};
use crate::backend::BackendGateway;
use crate::config::SimulationSection;
use crate::core::AnalysisStatus;

/// 流水线步骤种类（按执行顺序）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepKind {
    Upload,
    Initialize,
    ExamineStructure,
    IdentifyParties,
    ExtractDates,
    GenerateSummary,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::Upload,
        StepKind::Initialize,
        StepKind::ExamineStructure,
        StepKind::IdentifyParties,
        StepKind::ExtractDates,
        StepKind::GenerateSummary,
    ];

    pub fn description(self) -> &'static str {
        match self {
            Self::Upload => "Uploading document to secure storage",
            Self::Initialize => "Initializing document analysis",
            Self::ExamineStructure => "Examining document structure",
            Self::IdentifyParties => "Identifying parties and signatories",
            Self::ExtractDates => "Extracting dates and key clauses",
            Self::GenerateSummary => "Generating summary and analysis",
        }
    }

    /// 该步骤运行时工作流所处阶段
    pub fn phase(self) -> AnalysisStatus {
        match self {
            Self::Upload => AnalysisStatus::Uploading,
            Self::Initialize | Self::ExamineStructure | Self::IdentifyParties | Self::ExtractDates => {
                AnalysisStatus::Thinking
            }
            Self::GenerateSummary => AnalysisStatus::Analyzing,
        }
    }
}

pub struct PipelineStep {
    pub kind: StepKind,
    pub work: Arc<dyn StepWork>,
}

pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// 标准流水线：上传 / 建记录 / 结果生成走网关，其余三步为模拟耗时
    pub fn standard(gateway: Arc<BackendGateway>, sim: &SimulationSection) -> Self {
        let steps = StepKind::ALL
            .into_iter()
            .map(|kind| {
                let delay = sim.delay_for(kind);
                let work: Arc<dyn StepWork> = match kind {
                    StepKind::Upload => Arc::new(UploadToStorage::new(gateway.clone(), delay)),
                    StepKind::Initialize => Arc::new(InitializeRecord::new(gateway.clone(), delay)),
                    StepKind::GenerateSummary => {
                        Arc::new(GenerateSummary::new(gateway.clone(), delay))
                    }
                    _ => Arc::new(SimulatedDelay::new(delay)),
                };
                PipelineStep { kind, work }
            })
            .collect();
        Self { steps }
    }

    /// 替换某一步骤的工作单元
    pub fn with_work(mut self, kind: StepKind, work: Arc<dyn StepWork>) -> Self {
        if let Some(step) = self.steps.iter_mut().find(|s| s.kind == kind) {
            step.work = work;
        }
        self
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
