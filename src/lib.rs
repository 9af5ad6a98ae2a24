//! Docsense - 文档分析工作流引擎
//!
//! 模块划分：
//! - **analysis**: 分析状态机控制器、步骤追踪、工作单元与流水线、结果类型
//! - **backend**: 远端对象存储 + 记录库（HTTP / 内存），故障时降级到本地模拟
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与工作流状态
//! - **observability**: 日志初始化

pub mod analysis;
pub mod backend;
pub mod config;
pub mod core;
pub mod observability;

pub use analysis::{AnalysisController, AnalysisResult, DocumentFile};
pub use core::{AnalysisError, AnalysisState, AnalysisStatus};
