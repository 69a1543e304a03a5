// ==========================================
// 库存缓冲补货系统 - 引擎层协作接口
// ==========================================
// 职责: 定义引擎依赖的数据读写 trait，实现依赖倒置
// 说明: Engine 层定义 trait，Repository 层实现 (SQLite)
// 约束: 所有接口按 (product_id, location_id) 或 id 定位
// ==========================================

use crate::domain::adjustment::BufferAdjustmentLog;
use crate::domain::buffer::InventoryBuffer;
use crate::domain::consumption::{ConsumptionProfile, ConsumptionRecord};
use crate::domain::master::{LeadTime, LocationInfo, ProductInfo, SpecialEvent};
use crate::domain::replenishment::{ReplenishmentOrder, ReplenishmentQueueItem};
use crate::domain::types::{ApprovalStatus, OrderStatus, QueueStatus};
use crate::repository::error::RepositoryResult;
use chrono::{NaiveDate, NaiveDateTime};

// ==========================================
// 消耗数据
// ==========================================

/// 消耗流水读取 (按日期升序)
pub trait ConsumptionHistoryReader: Send + Sync {
    fn read_history(
        &self,
        product_id: &str,
        location_id: &str,
        since: NaiveDate,
    ) -> RepositoryResult<Vec<ConsumptionRecord>>;
}

/// 消耗画像存取 (UPSERT 语义)
pub trait ProfileStore: Send + Sync {
    fn upsert_profile(&self, profile: &ConsumptionProfile) -> RepositoryResult<()>;

    fn find_profile(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<ConsumptionProfile>>;
}

// ==========================================
// 主数据 (只读)
// ==========================================

/// 提前期读取 (仅有效记录)
pub trait LeadTimeReader: Send + Sync {
    fn find_active_lead_time(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<LeadTime>>;
}

pub trait ProductReader: Send + Sync {
    fn find_product(&self, product_id: &str) -> RepositoryResult<Option<ProductInfo>>;
}

pub trait LocationReader: Send + Sync {
    fn find_location(&self, location_id: &str) -> RepositoryResult<Option<LocationInfo>>;
}

/// 季节因子读取
///
/// # 返回
/// - Ok(Some(f)): 命中季节性记录 (先产品, 后品类)
/// - Ok(None): 无调整
/// - Err: 查询失败 (与"无调整"区分)
pub trait SeasonalityReader: Send + Sync {
    fn find_seasonality_factor(
        &self,
        product_id: &str,
        category: Option<&str>,
        location_id: &str,
        month: u32,
    ) -> RepositoryResult<Option<f64>>;
}

/// 活动读取: 返回覆盖指定日期的有效活动
pub trait EventReader: Send + Sync {
    fn find_active_events(
        &self,
        product_id: &str,
        location_id: &str,
        date: NaiveDate,
    ) -> RepositoryResult<Vec<SpecialEvent>>;
}

// ==========================================
// 缓冲
// ==========================================

/// 缓冲存取
///
/// 写入统一走 revision 乐观锁; 分页一律按 buffer_id 键集分页,
/// 批处理过程中修改缓冲不会导致漏页/重页
pub trait BufferStore: Send + Sync {
    fn find_by_id(&self, buffer_id: &str) -> RepositoryResult<Option<InventoryBuffer>>;

    fn find_by_pair(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<InventoryBuffer>>;

    fn insert(&self, buffer: &InventoryBuffer) -> RepositoryResult<()>;

    /// 按 revision 条件更新; 当前 revision 不等于 expected_revision 时返回
    /// OptimisticLockFailure
    fn update_with_revision(
        &self,
        buffer: &InventoryBuffer,
        expected_revision: i32,
    ) -> RepositoryResult<()>;

    /// 有效缓冲分页 (buffer_id > after)
    fn list_active_page(
        &self,
        after_buffer_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<InventoryBuffer>>;

    /// 已到评审日 (next_review_due ≤ as_of 或为空) 的有效缓冲分页
    fn list_review_due_page(
        &self,
        as_of: NaiveDate,
        after_buffer_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<InventoryBuffer>>;
}

// ==========================================
// 补货队列 / 订单 / 调整日志
// ==========================================

pub trait QueueStore: Send + Sync {
    fn append_item(&self, item: &ReplenishmentQueueItem) -> RepositoryResult<()>;

    fn find_item(&self, queue_item_id: &str) -> RepositoryResult<Option<ReplenishmentQueueItem>>;

    /// 按状态分页, priority_score 降序, generated_at 降序
    fn list_by_status_page(
        &self,
        status: QueueStatus,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<Vec<ReplenishmentQueueItem>>;

    /// 指定缓冲最新生成的队列项 (任意状态)
    fn find_latest_for_buffer(
        &self,
        buffer_id: &str,
    ) -> RepositoryResult<Option<ReplenishmentQueueItem>>;

    /// 条件状态迁移 (from → to); 当前状态不符时返回 InvalidStateTransition
    fn transition_status(
        &self,
        queue_item_id: &str,
        from: QueueStatus,
        to: QueueStatus,
        at: NaiveDateTime,
    ) -> RepositoryResult<()>;
}

pub trait OrderStore: Send + Sync {
    fn insert_order(&self, order: &ReplenishmentOrder) -> RepositoryResult<()>;

    fn find_order(&self, order_id: &str) -> RepositoryResult<Option<ReplenishmentOrder>>;

    fn transition_status(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: NaiveDateTime,
    ) -> RepositoryResult<()>;
}

/// 调整日志: 只追加, 唯一允许的修改是记录审批结果
pub trait AdjustmentLogStore: Send + Sync {
    fn append_log(&self, log: &BufferAdjustmentLog) -> RepositoryResult<()>;

    fn find_log(&self, log_id: &str) -> RepositoryResult<Option<BufferAdjustmentLog>>;

    fn list_by_buffer(&self, buffer_id: &str) -> RepositoryResult<Vec<BufferAdjustmentLog>>;

    /// 仅允许 PENDING → APPROVED / REJECTED
    fn record_approval(
        &self,
        log_id: &str,
        status: ApprovalStatus,
        approved_by: &str,
        at: NaiveDateTime,
    ) -> RepositoryResult<()>;
}
