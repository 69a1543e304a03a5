// ==========================================
// 库存缓冲补货系统 - 引擎层
// ==========================================
// 职责: 实现 DBM 业务规则, 不拼 SQL
// 红线: Engine 只依赖 ports 中的 trait; 缓冲写入只走 BufferUpdater
// ==========================================

pub mod buffer_adjustment;
pub mod buffer_scan;
pub mod buffer_updater;
pub mod consumption_signal;
pub mod demand_factors;
pub mod job;
pub mod orchestrator;
pub mod order_consumer;
pub mod ports;
pub mod profile_recompute;
pub mod replenishment_queue;
pub mod repositories;
pub mod zone_classifier;

// 重导出核心引擎
pub use buffer_adjustment::{AdjustmentProposal, BufferAdjustmentEngine, ReviewResult};
pub use buffer_updater::{apply_mutations, BufferMutation, BufferUpdater, NewBuffer, RetryPolicy};
pub use consumption_signal::{ConsumptionSignal, ConsumptionSignalCalculator, TrendThresholds};
pub use demand_factors::{DemandFactors, SeasonalityAndEventAdjuster};
pub use job::{
    CancellationFlag, JobContext, JobError, JobKind, JobResult, JobScope, JobSummary, SkipReason,
    UnitOutcome,
};
pub use orchestrator::{DbmOrchestrator, PERIODIC_JOBS};
pub use order_consumer::ReplenishmentOrderConsumer;
pub use ports::{
    AdjustmentLogStore, BufferStore, ConsumptionHistoryReader, EventReader, LeadTimeReader,
    LocationReader, OrderStore, ProductReader, ProfileStore, QueueStore, SeasonalityReader,
};
pub use profile_recompute::ProfileRecomputeJob;
pub use replenishment_queue::{QueueRecommendation, ReplenishmentQueueGenerator};
pub use repositories::DbmRepositories;
pub use zone_classifier::{BufferZoneClassifier, ZoneClassification};
