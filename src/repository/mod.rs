// ==========================================
// 库存缓冲补货系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 以 SQLite 实现 engine::ports 中的读写接口
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod adjustment_log_repo;
pub mod buffer_repo;
pub mod consumption_repo;
pub mod demand_factor_repo;
pub mod error;
pub mod master_data_repo;
pub mod order_repo;
pub mod queue_repo;
pub(crate) mod row_codec;

// 重导出核心仓储
pub use adjustment_log_repo::AdjustmentLogRepository;
pub use buffer_repo::InventoryBufferRepository;
pub use consumption_repo::ConsumptionRepository;
pub use demand_factor_repo::DemandFactorRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use master_data_repo::MasterDataRepository;
pub use order_repo::ReplenishmentOrderRepository;
pub use queue_repo::ReplenishmentQueueRepository;
