//! 步骤追踪：有序的 ThinkingStep 日志
//!
//! 步骤只追加不删除（reset 时整体清空）；状态单调前进 pending → in-progress → complete，
//! 或从任意非终态直接进入 error。终态（complete / error）不再变化。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::AnalysisError;

/// 步骤 ID（同一 tracker 内不重复）
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
pub struct StepId(u64);

impl StepId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step-{}", self.0)
    }
}

/// 步骤状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Complete,
    Error,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Complete | Self::Error => 2,
        }
    }

    /// 是否允许从 self 迁移到 next
    pub fn can_advance_to(self, next: StepStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Error || next.rank() > self.rank()
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// 单个处理步骤
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingStep {
    pub id: StepId,
    pub description: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// 有序步骤日志
#[derive(Clone, Debug, Default)]
pub struct StepTracker {
    steps: Vec<ThinkingStep>,
    next_id: u64,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个 pending 步骤并返回其 ID
    pub fn add_step(&mut self, description: impl Into<String>) -> StepId {
        let id = StepId(self.next_id);
        self.next_id += 1;
        self.steps.push(ThinkingStep {
            id,
            description: description.into(),
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
        });
        id
    }

    /// 推进步骤状态；回退或修改终态会被拒绝
    pub fn advance(&mut self, id: StepId, status: StepStatus) -> Result<(), AnalysisError> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(AnalysisError::StepNotFound(id))?;

        if !step.status.can_advance_to(status) {
            return Err(AnalysisError::InvalidStepTransition {
                id,
                from: step.status,
                to: status,
            });
        }

        let now = Utc::now();
        if status == StepStatus::InProgress {
            step.started_at = Some(now);
        }
        if status.is_terminal() {
            step.started_at.get_or_insert(now);
            step.finished_at = Some(now);
        }
        step.status = status;
        Ok(())
    }

    pub fn get(&self, id: StepId) -> Option<&ThinkingStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn steps(&self) -> &[ThinkingStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Complete)
            .count()
    }

    /// 进度百分比（0-100）
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.completed() as f64 / self.steps.len() as f64 * 100.0
    }

    /// 清空全部步骤（仅在工作流 reset / 新运行时调用）
    pub fn clear(&mut self) {
        self.steps.clear();
    }
}
