//! 内存后端（用于测试与离线演示，无需网络）
//!
//! 可通过 set_failing 模拟远端故障；seed_result 让新记录自带一份已计算结果。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::analysis::{AnalysisResult, DocumentFile};
use crate::backend::traits::{RecordMetadata, RecordStatus, RecordUpdate, RemoteBackend};
use crate::core::BackendError;

/// 内存中的一条记录
#[derive(Clone, Debug)]
pub struct StoredRecord {
    pub metadata: RecordMetadata,
    pub status: RecordStatus,
    pub analysis: Option<AnalysisResult>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    objects: Mutex<HashMap<String, u64>>,
    records: Mutex<HashMap<String, StoredRecord>>,
    seeded: Mutex<Option<AnalysisResult>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有调用都失败的后端
    pub fn failing() -> Self {
        let backend = Self::default();
        backend.set_failing(true);
        backend
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 之后创建的记录都带有该结果（模拟远端已完成计算）
    pub async fn seed_result(&self, result: AnalysisResult) {
        *self.seeded.lock().await = Some(result);
    }

    /// 收到的调用总数（包括失败的调用）
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn record(&self, id: &str) -> Option<StoredRecord> {
        self.records.lock().await.get(id).cloned()
    }

    fn enter(&self, op: &str) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(format!("{op}: simulated outage")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for InMemoryBackend {
    async fn upload_object(&self, path: &str, file: &DocumentFile) -> Result<(), BackendError> {
        self.enter("upload_object")?;
        self.objects.lock().await.insert(path.to_string(), file.size);
        Ok(())
    }

    async fn insert_record(&self, metadata: &RecordMetadata) -> Result<String, BackendError> {
        self.enter("insert_record")?;
        let id = uuid::Uuid::new_v4().to_string();
        let analysis = self.seeded.lock().await.clone();
        self.records.lock().await.insert(
            id.clone(),
            StoredRecord {
                metadata: metadata.clone(),
                status: metadata.status,
                analysis,
            },
        );
        Ok(id)
    }

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), BackendError> {
        self.enter("update_record")?;
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| BackendError::Status {
                status: 404,
                body: format!("record {id} not found"),
            })?;
        record.status = update.status;
        if update.analysis.is_some() {
            record.analysis = update.analysis.clone();
        }
        Ok(())
    }

    async fn fetch_result(&self, id: &str) -> Result<Option<AnalysisResult>, BackendError> {
        self.enter("fetch_result")?;
        Ok(self
            .records
            .lock()
            .await
            .get(id)
            .and_then(|r| r.analysis.clone()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
