// ==========================================
// 库存缓冲补货系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod adjustment;
pub mod buffer;
pub mod consumption;
pub mod master;
pub mod replenishment;
pub mod types;

// 重导出核心类型
pub use adjustment::BufferAdjustmentLog;
pub use buffer::{InventoryBuffer, ZoneThresholds};
pub use consumption::{ConsumptionProfile, ConsumptionRecord};
pub use master::{LeadTime, LocationInfo, ProductInfo, SeasonalityAdjustment, SpecialEvent};
pub use replenishment::{ReplenishmentOrder, ReplenishmentQueueItem};
pub use types::{
    AdcTrend, AdjustmentDecision, ApprovalStatus, BufferZone, OrderStatus, QueueStatus,
    ReasonCode, RecommendedAction,
};
