//! 后端网关：远端优先，故障即降级
//!
//! 网关从不把远端故障抛给工作流：任何 BackendError 都会翻转注入的 DegradedMode（单调，只会 false → true），
//! 之后所有操作直接走本地路径。未配置远端时同样走本地路径，但不算降级。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::analysis::{AnalysisResult, DocumentFile};
use crate::backend::http::HttpBackend;
use crate::backend::traits::{RecordMetadata, RecordUpdate, RemoteBackend};
use crate::config::BackendSection;
use crate::core::BackendError;

/// 降级（演示）模式标志：构造时注入，可在多个网关间共享
#[derive(Clone, Debug, Default)]
pub struct DegradedMode(Arc<AtomicBool>);

impl DegradedMode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_degraded(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 置为降级；返回 true 表示本次调用完成了翻转
    pub fn trip(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// 上传结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredObject {
    Remote { path: String },
    /// 使用本地文件，不经过远端存储
    Local,
}

impl StoredObject {
    pub fn remote_path(&self) -> Option<&str> {
        match self {
            Self::Remote { path } => Some(path),
            Self::Local => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// 追踪记录 ID
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordId {
    Remote(String),
    /// 本地生成（uuid v4）
    Local(String),
}

impl RecordId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Remote(id) | Self::Local(id) => id,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// 远端存储路径：`{毫秒时间戳}_{清洗后的文件名}`
pub fn storage_path_for(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", Utc::now().timestamp_millis(), sanitized)
}

pub struct BackendGateway {
    backend: Option<Arc<dyn RemoteBackend>>,
    degraded: DegradedMode,
}

impl BackendGateway {
    pub fn new(backend: Option<Arc<dyn RemoteBackend>>, degraded: DegradedMode) -> Self {
        Self { backend, degraded }
    }

    /// 仅本地模拟
    pub fn local() -> Self {
        Self::new(None, DegradedMode::new())
    }

    pub fn with_backend(backend: Arc<dyn RemoteBackend>) -> Self {
        Self::new(Some(backend), DegradedMode::new())
    }

    /// 根据 [backend] 配置选择：url 与 api_key 都存在时使用 HTTP 后端，否则仅本地
    pub fn from_config(cfg: &BackendSection, degraded: DegradedMode) -> Self {
        match HttpBackend::from_config(cfg) {
            Some(Ok(http)) => {
                tracing::info!("Using remote backend ({})", cfg.url.as_deref().unwrap_or_default());
                Self::new(Some(Arc::new(http)), degraded)
            }
            Some(Err(e)) => {
                tracing::warn!("Remote backend init failed ({}), running in demo mode", e);
                degraded.trip();
                Self::new(None, degraded)
            }
            None => {
                tracing::info!("No backend credentials configured, using local simulation");
                Self::new(None, degraded)
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_degraded()
    }

    pub fn degraded_mode(&self) -> DegradedMode {
        self.degraded.clone()
    }

    /// 可用的远端（已配置且未降级）
    fn remote(&self) -> Option<&Arc<dyn RemoteBackend>> {
        if self.degraded.is_degraded() {
            return None;
        }
        self.backend.as_ref()
    }

    fn degrade(&self, op: &str, err: &BackendError) {
        if self.degraded.trip() {
            tracing::warn!("Backend {} failed ({}), switching to demo mode", op, err);
        } else {
            tracing::debug!("Backend {} failed after degradation: {}", op, err);
        }
    }

    /// 上传文档；失败时降级并返回 Local
    pub async fn store(&self, file: &DocumentFile) -> StoredObject {
        let Some(backend) = self.remote() else {
            return StoredObject::Local;
        };
        let path = storage_path_for(&file.name);
        match backend.upload_object(&path, file).await {
            Ok(()) => {
                tracing::debug!("Stored {} at {} ({})", file.name, path, backend.name());
                StoredObject::Remote { path }
            }
            Err(e) => {
                self.degrade("upload", &e);
                StoredObject::Local
            }
        }
    }

    /// 创建追踪记录；失败或本地模式时返回本地生成的 ID
    pub async fn create_record(&self, file: &DocumentFile, stored: &StoredObject) -> RecordId {
        if let Some(backend) = self.remote() {
            let metadata =
                RecordMetadata::processing(file, stored.remote_path().map(str::to_string));
            match backend.insert_record(&metadata).await {
                Ok(id) => return RecordId::Remote(id),
                Err(e) => self.degrade("insert_record", &e),
            }
        }
        RecordId::Local(uuid::Uuid::new_v4().to_string())
    }

    /// 回读远端结果；降级、本地记录、未找到或载荷不合法时返回 None
    pub async fn fetch_result(&self, record: &RecordId) -> Option<AnalysisResult> {
        let RecordId::Remote(id) = record else {
            return None;
        };
        let backend = self.remote()?;
        match backend.fetch_result(id).await {
            Ok(Some(result)) => match result.validate() {
                Ok(()) => Some(result),
                Err(reason) => {
                    self.degrade("fetch_result", &BackendError::InvalidPayload(reason));
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.degrade("fetch_result", &e);
                None
            }
        }
    }

    /// 运行结束时回写记录状态与结果（尽力而为）
    pub async fn finish_record(&self, record: &RecordId, result: &AnalysisResult) {
        let RecordId::Remote(id) = record else {
            return;
        };
        let Some(backend) = self.remote() else {
            return;
        };
        if let Err(e) = backend.update_record(id, &RecordUpdate::complete(result)).await {
            self.degrade("update_record", &e);
        }
    }
}
