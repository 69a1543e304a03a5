// ==========================================
// 库存缓冲补货系统 - DBM 参数快照
// ==========================================
// 职责: 引擎使用的强类型参数集合 (由 ConfigManager 组装)
// 红线: 默认阈值只在这里定义一次,不允许在引擎里写死
// ==========================================

use crate::domain::buffer::ZoneThresholds;
use crate::domain::types::BufferZone;
use serde::{Deserialize, Serialize};

// ==========================================
// ApprovalPolicy - 调整审批策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalPolicy {
    /// |变化率| > threshold_pct 需要审批,否则自动批准
    Threshold,
    /// 扩大一律需要审批,缩小一律自动批准
    ZoneBased,
}

impl ApprovalPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "THRESHOLD" => Some(ApprovalPolicy::Threshold),
            "ZONE_BASED" => Some(ApprovalPolicy::ZoneBased),
            _ => None,
        }
    }
}

// ==========================================
// SizingMode - 新缓冲计算口径
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizingMode {
    /// factor = 1 ± pct
    Fixed,
    /// factor = (1 ± pct) × 季节因子 × 活动因子
    DemandAdjusted,
}

impl SizingMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "FIXED" => Some(SizingMode::Fixed),
            "DEMAND_ADJUSTED" => Some(SizingMode::DemandAdjusted),
            _ => None,
        }
    }
}

// ==========================================
// DbmConfig - 参数快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbmConfig {
    // ===== 分区 =====
    pub default_thresholds: ZoneThresholds,
    pub empty_buffer_zone: BufferZone,

    // ===== DBM 评审 =====
    pub review_period_days: i32,
    pub lock_cycles: i32,
    pub default_adjustment_threshold_days: i32,
    pub increase_pct: f64,
    pub decrease_pct: f64,
    pub sizing_mode: SizingMode,
    pub approval_policy: ApprovalPolicy,
    pub approval_threshold_pct: f64,

    // ===== 补货队列 =====
    pub page_size: usize,
    pub default_lead_time_days: f64,
    pub default_moq: f64,
    pub zone_weight_red: f64,
    pub zone_weight_yellow: f64,
    pub zone_weight_green: f64,

    // ===== 消耗画像 =====
    pub history_window_days: i64,
    pub trend_short_pct: f64,
    pub trend_long_pct: f64,
    pub trend_volatile_pct: f64,

    // ===== 持久化重试 =====
    pub max_persist_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for DbmConfig {
    fn default() -> Self {
        Self {
            default_thresholds: ZoneThresholds::new(80.0, 50.0, 20.0),
            empty_buffer_zone: BufferZone::Unknown,
            review_period_days: 7,
            lock_cycles: 6,
            default_adjustment_threshold_days: 7,
            increase_pct: 33.0,
            decrease_pct: 33.0,
            sizing_mode: SizingMode::Fixed,
            approval_policy: ApprovalPolicy::Threshold,
            approval_threshold_pct: 20.0,
            page_size: 500,
            default_lead_time_days: 7.0,
            default_moq: 1.0,
            zone_weight_red: 100.0,
            zone_weight_yellow: 50.0,
            zone_weight_green: 10.0,
            history_window_days: 60,
            trend_short_pct: 10.0,
            trend_long_pct: 5.0,
            trend_volatile_pct: 20.0,
            max_persist_retries: 3,
            retry_backoff_ms: 25,
        }
    }
}

impl DbmConfig {
    /// 校验参数合法性
    ///
    /// # 返回
    /// - Ok(()): 参数可用
    /// - Err(String): 第一条违规原因
    pub fn validate(&self) -> Result<(), String> {
        if !self.default_thresholds.is_monotone() {
            return Err(format!(
                "默认分区阈值必须在[0,100]且 green ≥ yellow ≥ red: {:?}",
                self.default_thresholds
            ));
        }
        if self.review_period_days <= 0 {
            return Err(format!("评审周期必须为正: {}", self.review_period_days));
        }
        if self.lock_cycles < 0 {
            return Err(format!("锁定周期数不能为负: {}", self.lock_cycles));
        }
        if self.page_size == 0 {
            return Err("分页大小必须为正".to_string());
        }
        if !(0.0..100.0).contains(&self.decrease_pct) {
            return Err(format!("缩小比例必须在[0,100): {}", self.decrease_pct));
        }
        if self.increase_pct < 0.0 {
            return Err(format!("扩大比例不能为负: {}", self.increase_pct));
        }
        if !matches!(self.empty_buffer_zone, BufferZone::Unknown | BufferZone::Green) {
            return Err(format!(
                "空缓冲分区只允许 UNKNOWN 或 GREEN: {}",
                self.empty_buffer_zone
            ));
        }
        Ok(())
    }

    /// 扩大系数 (1 + pct)
    pub fn increase_factor(&self) -> f64 {
        1.0 + self.increase_pct / 100.0
    }

    /// 缩小系数 (1 - pct)
    pub fn decrease_factor(&self) -> f64 {
        1.0 - self.decrease_pct / 100.0
    }
}
