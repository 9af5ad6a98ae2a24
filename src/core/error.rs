//! 工作流错误类型
//!
//! BackendError 只在网关内部流转（被降级吸收，不会升级为工作流错误）；
//! AnalysisError 是控制器对外暴露的错误，只有 StepFailed 会让状态机进入 Error。

use thiserror::Error;

use crate::analysis::{StepId, StepStatus};
use crate::core::AnalysisStatus;

/// 分析运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// 已有运行在进行中，调用方必须等待 complete / error 或先 reset
    #[error("An analysis run is already in progress (status: {status})")]
    RunInProgress { status: AnalysisStatus },

    /// 某个步骤的工作单元出现未归类故障（终止本次运行）
    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// 工作单元内部 panic（不变量被破坏等），同样终止本次运行
    #[error("Step '{step}' panicked: {message}")]
    StepPanicked { step: String, message: String },

    #[error("Invalid step transition for step {id}: {from} -> {to}")]
    InvalidStepTransition {
        id: StepId,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("Step not found: {0}")]
    StepNotFound(StepId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    pub fn step_failed(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StepFailed {
            step: step.into(),
            reason: reason.into(),
        }
    }
}

/// 远端存储 / 记录库错误；网关遇到任何一种都会切换到降级模式
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    /// 远端返回的结果不满足 AnalysisResult 的约束
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}
