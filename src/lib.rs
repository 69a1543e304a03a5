// ==========================================
// 库存缓冲补货系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 动态缓冲管理 (DBM) 计算引擎, 由批任务或上层控制面触发
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AdcTrend, AdjustmentDecision, ApprovalStatus, BufferZone, OrderStatus, QueueStatus,
    ReasonCode, RecommendedAction,
};

// 领域实体
pub use domain::{
    BufferAdjustmentLog, ConsumptionProfile, ConsumptionRecord, InventoryBuffer,
    ReplenishmentOrder, ReplenishmentQueueItem, ZoneThresholds,
};

// 引擎
pub use engine::{
    BufferAdjustmentEngine, BufferUpdater, BufferZoneClassifier, ConsumptionSignalCalculator,
    DbmOrchestrator, ReplenishmentOrderConsumer, ReplenishmentQueueGenerator,
};

// API
pub use api::DbmApi;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "库存缓冲补货系统";
