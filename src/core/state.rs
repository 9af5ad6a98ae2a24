//! 工作流状态：AnalysisStatus 状态机阶段与 AnalysisState 快照
//!
//! AnalysisState 是单次运行的唯一事实来源，由控制器独占修改，并通过 watch 通道投影给观察者。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::analysis::{AnalysisResult, DocumentFile, StepStatus, ThinkingStep};

/// 工作流阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Idle,
    Uploading,
    Thinking,
    Analyzing,
    Complete,
    Error,
}

impl AnalysisStatus {
    /// 运行中（uploading / thinking / analyzing），此时不接受新的提交
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Uploading | Self::Thinking | Self::Analyzing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// 是否允许 submit
    pub fn accepts_submission(self) -> bool {
        !self.is_busy()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Thinking => "thinking",
            Self::Analyzing => "analyzing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次运行的完整状态
///
/// 不变量：`result.is_some()` 当且仅当 `status == Complete`；
/// `error.is_some()` 当且仅当 `status == Error`。
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisState {
    pub status: AnalysisStatus,
    pub file: Option<Arc<DocumentFile>>,
    pub thinking_steps: Vec<ThinkingStep>,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self {
            status: AnalysisStatus::Idle,
            file: None,
            thinking_steps: Vec::new(),
            result: None,
            error: None,
        }
    }
}

impl AnalysisState {
    pub fn is_idle(&self) -> bool {
        self.status == AnalysisStatus::Idle
            && self.file.is_none()
            && self.thinking_steps.is_empty()
            && self.result.is_none()
            && self.error.is_none()
    }

    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }

    /// 已完成步骤数
    pub fn completed_steps(&self) -> usize {
        self.thinking_steps
            .iter()
            .filter(|s| s.status == StepStatus::Complete)
            .count()
    }

    /// 进度百分比（0-100），无步骤时为 0
    pub fn progress(&self) -> f64 {
        if self.thinking_steps.is_empty() {
            return 0.0;
        }
        self.completed_steps() as f64 / self.thinking_steps.len() as f64 * 100.0
    }

    /// 检查 result / error 与 status 的一致性（测试与调试断言用）
    pub fn is_consistent(&self) -> bool {
        let result_ok = self.result.is_some() == (self.status == AnalysisStatus::Complete);
        let error_ok = self.error.is_some() == (self.status == AnalysisStatus::Error);
        result_ok && error_ok
    }
}
