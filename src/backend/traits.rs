//! 远端后端抽象
//!
//! 所有远端实现（HTTP / 内存）实现 RemoteBackend：对象上传、记录创建、记录更新、结果回读。
//! 这里的错误会原样返回，由 BackendGateway 决定降级。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::{AnalysisResult, DocumentFile};
use crate::core::BackendError;

/// 记录处理状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Processing,
    Complete,
}

/// 新建追踪记录时写入的元数据
#[derive(Clone, Debug, Serialize)]
pub struct RecordMetadata {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    /// 远端存储路径；本地降级时为 None
    pub storage_path: Option<String>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

impl RecordMetadata {
    pub fn processing(file: &DocumentFile, storage_path: Option<String>) -> Self {
        Self {
            name: file.name.clone(),
            size: file.size,
            content_type: file.content_type.clone(),
            storage_path,
            status: RecordStatus::Processing,
            created_at: Utc::now(),
        }
    }
}

/// 运行结束时回写的记录内容
#[derive(Clone, Debug, Serialize)]
pub struct RecordUpdate {
    pub status: RecordStatus,
    pub analysis: Option<AnalysisResult>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecordUpdate {
    pub fn complete(result: &AnalysisResult) -> Self {
        Self {
            status: RecordStatus::Complete,
            analysis: Some(result.clone()),
            completed_at: Some(Utc::now()),
        }
    }
}

/// 远端对象存储 + 记录库
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// 上传文档内容到 path
    async fn upload_object(&self, path: &str, file: &DocumentFile) -> Result<(), BackendError>;

    /// 创建追踪记录，返回远端 ID
    async fn insert_record(&self, metadata: &RecordMetadata) -> Result<String, BackendError>;

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), BackendError>;

    /// 回读已计算的结果；未找到或尚未计算时返回 None
    async fn fetch_result(&self, id: &str) -> Result<Option<AnalysisResult>, BackendError>;

    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "remote"
    }
}
