// ==========================================
// 库存缓冲补货系统 - 库存缓冲领域模型
// ==========================================
// 职责: InventoryBuffer (产品×库位的目标库存) + 分区阈值
// 红线: current_zone / buffer_consumed_pct 只由分区判定函数写入
// ==========================================

use crate::domain::types::BufferZone;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// ZoneThresholds - 分区阈值 (百分比)
// ==========================================
// 口径: 按"消耗百分比"切线解释
// - consumed ≤ 100 - green  → GREEN
// - consumed ≤ 100 - yellow → YELLOW
// - consumed ≤ 100 - red    → RED
// - 其他                    → CRITICAL
// 三个值之和不要求等于 100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneThresholds {
    pub green_pct: f64,
    pub yellow_pct: f64,
    pub red_pct: f64,
}

impl ZoneThresholds {
    pub fn new(green_pct: f64, yellow_pct: f64, red_pct: f64) -> Self {
        Self {
            green_pct,
            yellow_pct,
            red_pct,
        }
    }

    /// 阈值是否在 [0,100] 且满足 green ≥ yellow ≥ red
    ///
    /// 不满足单调时分区仍可计算 (按 GREEN→YELLOW→RED 顺序取首个命中),
    /// 但某些分区将不可达
    pub fn is_monotone(&self) -> bool {
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        in_range(self.green_pct)
            && in_range(self.yellow_pct)
            && in_range(self.red_pct)
            && self.green_pct >= self.yellow_pct
            && self.yellow_pct >= self.red_pct
    }
}

// ==========================================
// InventoryBuffer - 库存缓冲
// ==========================================
// 主键: buffer_id; 唯一键: (product_id, location_id)
// 并发: revision 乐观锁,每次写入 +1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryBuffer {
    // ===== 主键 =====
    pub buffer_id: String,
    pub product_id: String,
    pub location_id: String,

    // ===== 目标缓冲 =====
    pub buffer_units: f64,
    pub buffer_days: i32,
    pub thresholds: ZoneThresholds,

    // ===== 库存位置 =====
    pub current_inventory: f64,
    pub in_pipeline_qty: f64,
    pub net_available_qty: f64,                 // 在库 + 在途, 或外部给定; ≥ 0
    pub net_available_override: Option<f64>,    // 外部给定的净可用 (为空则按求和)

    // ===== 分区结果 =====
    pub buffer_consumed_pct: f64, // [0,100]
    pub current_zone: BufferZone,
    pub zone_entered_on: NaiveDate,
    pub consecutive_zone_days: i32,

    // ===== DBM 评审 =====
    pub adjustment_threshold_days: i32,
    pub last_review_date: Option<NaiveDate>,
    pub next_review_due: Option<NaiveDate>,

    // ===== 状态与审计 =====
    pub is_active: bool,
    pub revision: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl InventoryBuffer {
    /// 按当前库存字段计算净可用量 (外部给定优先, 下限 0)
    pub fn derived_net_available(&self) -> f64 {
        let raw = self
            .net_available_override
            .unwrap_or(self.current_inventory + self.in_pipeline_qty);
        if raw.is_finite() {
            raw.max(0.0)
        } else {
            0.0
        }
    }

    /// 当前缺口 max(0, buffer_units - net_available)
    pub fn buffer_gap(&self) -> f64 {
        (self.buffer_units - self.net_available_qty).max(0.0)
    }

    /// 是否处于调整锁定期
    ///
    /// 锁定期 = last_review_date + review_period_days × lock_cycles
    pub fn is_locked(&self, today: NaiveDate, review_period_days: i32, lock_cycles: i32) -> bool {
        match self.lock_until(review_period_days, lock_cycles) {
            Some(until) => today < until,
            None => false,
        }
    }

    /// 锁定期截止日 (无评审记录时为 None)
    pub fn lock_until(&self, review_period_days: i32, lock_cycles: i32) -> Option<NaiveDate> {
        let span = i64::from(review_period_days.max(0)) * i64::from(lock_cycles.max(0));
        self.last_review_date
            .map(|d| d + chrono::Duration::days(span))
    }
}
