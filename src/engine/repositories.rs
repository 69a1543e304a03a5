// ==========================================
// 库存缓冲补货系统 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合 DBM 引擎所需的全部协作接口
// 目标: 各作业只接收一个参数, 测试时可整体替换为内存实现
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::engine::ports::{
    AdjustmentLogStore, BufferStore, ConsumptionHistoryReader, EventReader, LeadTimeReader,
    LocationReader, OrderStore, ProductReader, ProfileStore, QueueStore, SeasonalityReader,
};
use crate::repository::{
    AdjustmentLogRepository, ConsumptionRepository, DemandFactorRepository,
    InventoryBufferRepository, MasterDataRepository, ReplenishmentOrderRepository,
    ReplenishmentQueueRepository,
};

/// DBM 仓储集合
///
/// # 包含的接口
/// - `history` / `profiles`: 消耗流水与消耗画像
/// - `lead_times` / `products` / `locations`: 主数据 (只读)
/// - `seasonality` / `events`: 需求因子 (只读)
/// - `buffers`: 库存缓冲 (唯一共享可变资源)
/// - `queue` / `orders` / `adjustment_logs`: 作业产出
#[derive(Clone)]
pub struct DbmRepositories {
    pub history: Arc<dyn ConsumptionHistoryReader>,
    pub profiles: Arc<dyn ProfileStore>,
    pub lead_times: Arc<dyn LeadTimeReader>,
    pub products: Arc<dyn ProductReader>,
    pub locations: Arc<dyn LocationReader>,
    pub seasonality: Arc<dyn SeasonalityReader>,
    pub events: Arc<dyn EventReader>,
    pub buffers: Arc<dyn BufferStore>,
    pub queue: Arc<dyn QueueStore>,
    pub orders: Arc<dyn OrderStore>,
    pub adjustment_logs: Arc<dyn AdjustmentLogStore>,
}

impl DbmRepositories {
    /// 基于同一个 SQLite 连接构建全部仓储
    pub fn sqlite(conn: Arc<Mutex<Connection>>) -> Self {
        let consumption = Arc::new(ConsumptionRepository::from_connection(conn.clone()));
        let master = Arc::new(MasterDataRepository::from_connection(conn.clone()));
        let factors = Arc::new(DemandFactorRepository::from_connection(conn.clone()));

        Self {
            history: consumption.clone(),
            profiles: consumption,
            lead_times: master.clone(),
            products: master.clone(),
            locations: master,
            seasonality: factors.clone(),
            events: factors,
            buffers: Arc::new(InventoryBufferRepository::from_connection(conn.clone())),
            queue: Arc::new(ReplenishmentQueueRepository::from_connection(conn.clone())),
            orders: Arc::new(ReplenishmentOrderRepository::from_connection(conn.clone())),
            adjustment_logs: Arc::new(AdjustmentLogRepository::from_connection(conn)),
        }
    }
}
