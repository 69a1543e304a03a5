// ==========================================
// 库存缓冲补货系统 - 缓冲调整审计日志
// ==========================================
// 红线: 只追加; 唯一允许的修改是记录审批/驳回结果
// ==========================================

use crate::domain::types::{AdjustmentDecision, ApprovalStatus, BufferZone};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// BufferAdjustmentLog - 缓冲调整日志
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferAdjustmentLog {
    // ===== 主键与关联 =====
    pub log_id: String,
    pub buffer_id: String,
    pub product_id: String,
    pub location_id: String,

    // ===== 调整前后快照 =====
    pub decision: AdjustmentDecision,
    pub old_buffer_units: f64,
    pub new_buffer_units: f64,
    pub old_buffer_days: i32,
    pub new_buffer_days: i32,
    pub change_percentage: f64,
    pub adjustment_factor: f64,

    // ===== 触发信息 =====
    pub trigger_reason: String,
    pub consecutive_days_in_zone: i32,
    pub zone_when_triggered: BufferZone,
    pub system_recommended: bool,

    // ===== 审批 =====
    pub requires_approval: bool,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,
}
