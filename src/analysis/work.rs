//! 步骤工作单元
//!
//! 每个步骤绑定一个 StepWork：读取当前运行上下文，执行（远端调用或模拟耗时），返回 StepOutcome。
//! 控制器只负责排序与状态推进，替换工作单元即可接入真实处理逻辑。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::analysis::controller::RunId;
use crate::analysis::fallback::fallback_result;
use crate::analysis::types::{AnalysisResult, DocumentFile};
use crate::backend::{BackendGateway, RecordId, StoredObject};
use crate::core::AnalysisError;

/// 工作单元的产出，由控制器合并进 RunContext
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Done,
    Stored(StoredObject),
    Recorded(RecordId),
    Analyzed(AnalysisResult),
}

/// 单次运行内在步骤间传递的数据
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub file: Arc<DocumentFile>,
    pub stored: StoredObject,
    pub record: Option<RecordId>,
    pub result: Option<AnalysisResult>,
}

impl RunContext {
    pub fn new(run_id: RunId, file: Arc<DocumentFile>) -> Self {
        Self {
            run_id,
            file,
            stored: StoredObject::Local,
            record: None,
            result: None,
        }
    }

    pub fn apply(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Done => {}
            StepOutcome::Stored(stored) => self.stored = stored,
            StepOutcome::Recorded(record) => self.record = Some(record),
            StepOutcome::Analyzed(result) => self.result = Some(result),
        }
    }
}

/// 步骤工作单元 trait
#[async_trait]
pub trait StepWork: Send + Sync {
    /// 返回 Err 表示未归类故障，运行进入 error 状态（远端故障应在内部吸收）
    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, AnalysisError>;
}

/// 纯模拟：固定等待
pub struct SimulatedDelay {
    delay: Duration,
}

impl SimulatedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl StepWork for SimulatedDelay {
    async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, AnalysisError> {
        tokio::time::sleep(self.delay).await;
        Ok(StepOutcome::Done)
    }
}

/// 上传到远端存储；未上传（本地 / 降级）时以模拟耗时代替
pub struct UploadToStorage {
    gateway: Arc<BackendGateway>,
    delay: Duration,
}

impl UploadToStorage {
    pub fn new(gateway: Arc<BackendGateway>, delay: Duration) -> Self {
        Self { gateway, delay }
    }
}

#[async_trait]
impl StepWork for UploadToStorage {
    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, AnalysisError> {
        let stored = self.gateway.store(&ctx.file).await;
        if !stored.is_remote() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(StepOutcome::Stored(stored))
    }
}

/// 创建追踪记录（远端或本地 ID）
pub struct InitializeRecord {
    gateway: Arc<BackendGateway>,
    delay: Duration,
}

impl InitializeRecord {
    pub fn new(gateway: Arc<BackendGateway>, delay: Duration) -> Self {
        Self { gateway, delay }
    }
}

#[async_trait]
impl StepWork for InitializeRecord {
    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, AnalysisError> {
        let record = self.gateway.create_record(&ctx.file, &ctx.stored).await;
        tokio::time::sleep(self.delay).await;
        Ok(StepOutcome::Recorded(record))
    }
}

/// 生成最终结果：优先远端已计算结果，否则使用本地确定性载荷；并回写记录
pub struct GenerateSummary {
    gateway: Arc<BackendGateway>,
    delay: Duration,
}

impl GenerateSummary {
    pub fn new(gateway: Arc<BackendGateway>, delay: Duration) -> Self {
        Self { gateway, delay }
    }
}

#[async_trait]
impl StepWork for GenerateSummary {
    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, AnalysisError> {
        tokio::time::sleep(self.delay).await;

        let remote = match &ctx.record {
            Some(record) => self.gateway.fetch_result(record).await,
            None => None,
        };
        let result = match remote {
            Some(result) => {
                tracing::debug!("Using remote analysis result for run {}", ctx.run_id);
                result
            }
            None => fallback_result(),
        };

        if let Some(record) = &ctx.record {
            self.gateway.finish_record(record, &result).await;
        }
        Ok(StepOutcome::Analyzed(result))
    }
}
