// ==========================================
// 库存缓冲补货系统 - 配置层
// ==========================================
// 职责: 系统配置管理 (config_kv 表) + 强类型参数快照
// ==========================================

pub mod config_manager;
pub mod dbm_config;
pub mod dbm_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use dbm_config::{ApprovalPolicy, DbmConfig, SizingMode};
pub use dbm_config_trait::{ConfigResult, DbmConfigReader};
