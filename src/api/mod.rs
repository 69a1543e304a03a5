// ==========================================
// 库存缓冲补货系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口, 供 CLI 与上层控制面调用
// ==========================================

pub mod dbm_api;
pub mod error;

// 重导出核心类型
pub use dbm_api::DbmApi;
pub use error::{ApiError, ApiResult};
