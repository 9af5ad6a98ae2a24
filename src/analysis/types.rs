//! 分析数据类型：输入文档与最终结果
//!
//! AnalysisResult 一旦产出即不可变；字段名按 camelCase 序列化（keyDates 等），与远端记录格式一致。

use std::path::Path;

use serde::{Deserialize, Serialize};

/// 用户提交的文档（名称、大小、内容）
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFile {
    pub name: String,
    pub size: u64,
    pub content_type: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = content_type_for(&name).to_string();
        Self {
            size: content.len() as u64,
            name,
            content_type,
            content,
        }
    }

    /// 从磁盘读取文档；文件名取路径最后一段
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self::new(name, content))
    }
}

/// 按扩展名推断 MIME 类型
fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// 关键日期（保持插入顺序，不做时间排序）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyDate {
    pub description: String,
    pub date: String,
}

/// 条款在页面上的高亮区域，单位为页面百分比（0-100）
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClauseRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ClauseRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 矩形完全落在页面内
    pub fn is_within_page(&self) -> bool {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        in_range(self.x)
            && in_range(self.y)
            && self.width >= 0.0
            && self.height >= 0.0
            && self.x + self.width <= 100.0
            && self.y + self.height <= 100.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub id: String,
    pub title: String,
    pub content: String,
    /// 页码，从 1 开始
    pub page: u32,
    pub position: ClauseRegion,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub role: String,
    pub page: u32,
}

/// 分析结果（终态载荷）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// 顺序有意义：第一个为 First Party
    pub parties: Vec<String>,
    pub key_dates: Vec<KeyDate>,
    pub clauses: Vec<Clause>,
    pub signatures: Vec<Signature>,
    pub summary: String,
}

impl AnalysisResult {
    pub fn first_party(&self) -> Option<&str> {
        self.parties.first().map(String::as_str)
    }

    /// 结构校验：参与方与摘要非空、页码从 1 开始、高亮区域在页面内
    pub fn validate(&self) -> Result<(), String> {
        if self.parties.is_empty() {
            return Err("no parties".to_string());
        }
        if self.summary.trim().is_empty() {
            return Err("empty summary".to_string());
        }
        for clause in &self.clauses {
            if clause.page == 0 {
                return Err(format!("clause '{}' has page 0", clause.id));
            }
            if !clause.position.is_within_page() {
                return Err(format!("clause '{}' highlight is outside the page", clause.id));
            }
        }
        if let Some(sig) = self.signatures.iter().find(|s| s.page == 0) {
            return Err(format!("signature '{}' has page 0", sig.name));
        }
        Ok(())
    }
}
