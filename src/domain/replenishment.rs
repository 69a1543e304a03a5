// ==========================================
// 库存缓冲补货系统 - 补货队列与补货订单领域模型
// ==========================================
// 职责: ReplenishmentQueueItem (每轮生成的只追加快照)
//       ReplenishmentOrder (由队列消费者生成)
// ==========================================

use crate::domain::types::{BufferZone, OrderStatus, QueueStatus, ReasonCode, RecommendedAction};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// ReplenishmentQueueItem - 补货队列项
// ==========================================
// 状态流转: PENDING → PROCESSED (已转订单) / CANCELED (订单取消或被新快照替代)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplenishmentQueueItem {
    // ===== 主键与关联 =====
    pub queue_item_id: String,
    pub generation_id: String, // 生成批次 (run_id)
    pub buffer_id: String,
    pub product_id: String,
    pub location_id: String,

    // ===== 计算快照 =====
    pub zone: BufferZone,
    pub buffer_units: f64,
    pub net_available_qty: f64,
    pub buffer_gap: f64,
    pub days_of_supply: f64,
    pub lead_time_days: f64,
    pub moq: f64,

    // ===== 建议 =====
    pub recommended_action: RecommendedAction,
    pub recommended_qty: f64,
    pub priority_score: f64,
    pub reason_codes: Vec<ReasonCode>,

    // ===== 状态 =====
    pub status: QueueStatus,
    pub generated_at: NaiveDateTime,
    pub status_updated_at: Option<NaiveDateTime>,
}

// ==========================================
// ReplenishmentOrder - 补货订单
// ==========================================
// 创建时增加缓冲在途量; 取消时对称扣减; 到货时在途转在库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplenishmentOrder {
    pub order_id: String,
    pub queue_item_id: String,
    pub buffer_id: String,
    pub product_id: String,
    pub location_id: String,
    pub action: RecommendedAction,
    pub quantity: f64,
    pub status: OrderStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
