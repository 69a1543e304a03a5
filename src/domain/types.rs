// ==========================================
// 库存缓冲补货系统 - 领域类型定义
// ==========================================
// 依据: DBM 动态缓冲管理 - 分区 / 趋势 / 补货动作 / 审批状态
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 缓冲分区 (Buffer Zone)
// ==========================================
// 红线: 分区只能由分区判定函数计算得出,不允许独立赋值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BufferZone {
    Green,    // 健康
    Yellow,   // 关注
    Red,      // 危险
    Critical, // 击穿
    Unknown,  // 缓冲未定义
}

impl BufferZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferZone::Green => "GREEN",
            BufferZone::Yellow => "YELLOW",
            BufferZone::Red => "RED",
            BufferZone::Critical => "CRITICAL",
            BufferZone::Unknown => "UNKNOWN",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "GREEN" => BufferZone::Green,
            "YELLOW" => BufferZone::Yellow,
            "RED" => BufferZone::Red,
            "CRITICAL" => BufferZone::Critical,
            _ => BufferZone::Unknown,
        }
    }

    /// RED 或更严重 (CRITICAL)
    pub fn is_red_or_worse(&self) -> bool {
        matches!(self, BufferZone::Red | BufferZone::Critical)
    }
}

impl fmt::Display for BufferZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 消耗趋势 (ADC Trend)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdcTrend {
    Increasing, // 上升
    Decreasing, // 下降
    Stable,     // 平稳
    Volatile,   // 波动
}

impl AdcTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdcTrend::Increasing => "INCREASING",
            AdcTrend::Decreasing => "DECREASING",
            AdcTrend::Stable => "STABLE",
            AdcTrend::Volatile => "VOLATILE",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "INCREASING" => AdcTrend::Increasing,
            "DECREASING" => AdcTrend::Decreasing,
            "VOLATILE" => AdcTrend::Volatile,
            _ => AdcTrend::Stable,
        }
    }
}

impl fmt::Display for AdcTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 补货建议动作 (Recommended Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    Monitor,  // 观察
    Order,    // 下单
    Expedite, // 加急
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Monitor => "MONITOR",
            RecommendedAction::Order => "ORDER",
            RecommendedAction::Expedite => "EXPEDITE",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "ORDER" => RecommendedAction::Order,
            "EXPEDITE" => RecommendedAction::Expedite,
            _ => RecommendedAction::Monitor,
        }
    }

    /// 是否需要生成补货订单
    pub fn requires_order(&self) -> bool {
        !matches!(self, RecommendedAction::Monitor)
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 补货原因码 (Reason Code)
// ==========================================
// 顺序即输出顺序: 分区 → 供应天数 → 缺口 → 例行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    RedZone,
    YellowZone,
    LowDaysOfSupply,
    BufferDeficit,
    RoutineReview,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::RedZone => "RED_ZONE",
            ReasonCode::YellowZone => "YELLOW_ZONE",
            ReasonCode::LowDaysOfSupply => "LOW_DAYS_OF_SUPPLY",
            ReasonCode::BufferDeficit => "BUFFER_DEFICIT",
            ReasonCode::RoutineReview => "ROUTINE_REVIEW",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 补货队列状态 (Queue Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,   // 待处理
    Processed, // 已转订单
    Canceled,  // 已取消
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Processed => "PROCESSED",
            QueueStatus::Canceled => "CANCELED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "PROCESSED" => QueueStatus::Processed,
            "CANCELED" => QueueStatus::Canceled,
            _ => QueueStatus::Pending,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 补货订单状态 (Order Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,     // 在途
    Received, // 已到货
    Canceled, // 已取消
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Received => "RECEIVED",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "RECEIVED" => OrderStatus::Received,
            "CANCELED" => OrderStatus::Canceled,
            _ => OrderStatus::Open,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 缓冲调整审批状态 (Approval Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,      // 待审批
    Approved,     // 已批准
    Rejected,     // 已驳回
    AutoApproved, // 自动批准
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
            ApprovalStatus::AutoApproved => "AUTO_APPROVED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "APPROVED" => ApprovalStatus::Approved,
            "REJECTED" => ApprovalStatus::Rejected,
            "AUTO_APPROVED" => ApprovalStatus::AutoApproved,
            _ => ApprovalStatus::Pending,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 缓冲调整决策 (Adjustment Decision)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentDecision {
    Maintain,       // 维持
    IncreaseBuffer, // 扩大缓冲
    DecreaseBuffer, // 缩小缓冲
}

impl AdjustmentDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentDecision::Maintain => "MAINTAIN",
            AdjustmentDecision::IncreaseBuffer => "INCREASE_BUFFER",
            AdjustmentDecision::DecreaseBuffer => "DECREASE_BUFFER",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "INCREASE_BUFFER" => AdjustmentDecision::IncreaseBuffer,
            "DECREASE_BUFFER" => AdjustmentDecision::DecreaseBuffer,
            _ => AdjustmentDecision::Maintain,
        }
    }
}

impl fmt::Display for AdjustmentDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
