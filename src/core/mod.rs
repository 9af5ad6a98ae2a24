//! 核心层：错误类型与工作流状态

pub mod error;
pub mod state;

pub use error::{AnalysisError, BackendError};
pub use state::{AnalysisState, AnalysisStatus};
