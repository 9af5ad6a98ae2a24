//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DOCSENSE__*` 覆盖（双下划线表示嵌套，如 `DOCSENSE__BACKEND__URL=...`）。
//! 远端后端只由 `backend.url` 与 `backend.api_key` 是否同时存在决定，缺失不是错误。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::analysis::StepKind;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub backend: BackendSection,
    pub simulation: SimulationSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [backend] 段：远端存储与记录库
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// 存储桶
    pub bucket: String,
    /// 记录表
    pub table: String,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            bucket: "documents".to_string(),
            table: "documents".to_string(),
            timeout_secs: 30,
        }
    }
}

impl BackendSection {
    /// (url, api_key)，两者都非空时才返回
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let url = self.url.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let key = self.api_key.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((url, key))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

/// [simulation] 段：各步骤的模拟耗时（毫秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    pub upload_ms: u64,
    pub initialize_ms: u64,
    pub structure_ms: u64,
    pub parties_ms: u64,
    pub extraction_ms: u64,
    pub summary_ms: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            upload_ms: 1000,
            initialize_ms: 800,
            structure_ms: 1500,
            parties_ms: 1200,
            extraction_ms: 1400,
            summary_ms: 1600,
        }
    }
}

impl SimulationSection {
    /// 全部为 0（测试用）
    pub fn instant() -> Self {
        Self {
            upload_ms: 0,
            initialize_ms: 0,
            structure_ms: 0,
            parties_ms: 0,
            extraction_ms: 0,
            summary_ms: 0,
        }
    }

    pub fn delay_for(&self, kind: StepKind) -> Duration {
        let ms = match kind {
            StepKind::Upload => self.upload_ms,
            StepKind::Initialize => self.initialize_ms,
            StepKind::ExamineStructure => self.structure_ms,
            StepKind::IdentifyParties => self.parties_ms,
            StepKind::ExtractDates => self.extraction_ms,
            StepKind::GenerateSummary => self.summary_ms,
        };
        Duration::from_millis(ms)
    }
}

/// 从 config 目录加载配置，环境变量 DOCSENSE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DOCSENSE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DOCSENSE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
