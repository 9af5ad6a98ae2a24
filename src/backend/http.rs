//! HTTP 后端：Supabase 风格的 Storage + REST 接口
//!
//! - 上传：POST {url}/storage/v1/object/{bucket}/{path}
//! - 记录：POST / PATCH / GET {url}/rest/v1/{table}
//!
//! 每个请求都带 `apikey` 头与 Bearer 认证，超时由配置决定。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;

use crate::analysis::{AnalysisResult, DocumentFile};
use crate::backend::traits::{RecordMetadata, RecordUpdate, RemoteBackend};
use crate::config::BackendSection;
use crate::core::BackendError;

/// 插入记录后返回的行（仅关心 id，可能是数字或字符串）
#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnalysisRow {
    analysis: Option<AnalysisResult>,
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
    table: String,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        api_key: &str,
        bucket: &str,
        table: &str,
        timeout_secs: u64,
    ) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|e| BackendError::Unavailable(format!("invalid api key header: {e}")))?;
        headers.insert("apikey", key);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
            table: table.to_string(),
        })
    }

    /// 由 [backend] 配置段构建；url 或 api_key 缺失时返回 None（不是错误，只是选择本地模式）
    pub fn from_config(cfg: &BackendSection) -> Option<Result<Self, BackendError>> {
        let (url, key) = cfg.credentials()?;
        Some(Self::new(url, key, &cfg.bucket, &cfg.table, cfg.timeout_secs))
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.api_key)
    }

    async fn check(resp: Response) -> Result<Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn upload_object(&self, path: &str, file: &DocumentFile) -> Result<(), BackendError> {
        let resp = self
            .authed(self.client.post(self.object_url(path)))
            .header(CONTENT_TYPE, file.content_type.as_str())
            .body(file.content.clone())
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn insert_record(&self, metadata: &RecordMetadata) -> Result<String, BackendError> {
        let resp = self
            .authed(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(metadata)
            .send()
            .await?;
        let rows: Vec<InsertedRow> = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        match rows.into_iter().next().map(|r| r.id) {
            Some(serde_json::Value::String(id)) => Ok(id),
            Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(BackendError::Decode(format!("unexpected id: {other}"))),
            None => Err(BackendError::Decode("insert returned no rows".to_string())),
        }
    }

    async fn update_record(&self, id: &str, update: &RecordUpdate) -> Result<(), BackendError> {
        let resp = self
            .authed(self.client.patch(self.table_url()))
            .query(&[("id", format!("eq.{id}"))])
            .json(update)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn fetch_result(&self, id: &str) -> Result<Option<AnalysisResult>, BackendError> {
        let resp = self
            .authed(self.client.get(self.table_url()))
            .query(&[("id", format!("eq.{id}")), ("select", "analysis".to_string())])
            .send()
            .await?;
        let rows: Vec<AnalysisRow> = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(rows.into_iter().next().and_then(|r| r.analysis))
    }

    fn name(&self) -> &str {
        "http"
    }
}
