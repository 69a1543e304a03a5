// ==========================================
// 库存缓冲补货系统 - 消耗领域模型
// ==========================================
// 职责: 消耗流水 + 消耗画像 (ConsumptionProfile)
// 红线: 画像每次整体重算,不做增量修补
// ==========================================

use crate::domain::types::AdcTrend;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// ConsumptionRecord - 消耗流水
// ==========================================
// 用途: 外部消耗明细 (日期 + 数量),同一天可有多条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub consumption_date: NaiveDate,
    pub quantity: f64,
}

impl ConsumptionRecord {
    pub fn new(consumption_date: NaiveDate, quantity: f64) -> Self {
        Self {
            consumption_date,
            quantity,
        }
    }
}

// ==========================================
// ConsumptionProfile - 消耗画像
// ==========================================
// 主键: (product_id, location_id),UPSERT 语义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionProfile {
    // ===== 主键 =====
    pub product_id: String,
    pub location_id: String,

    // ===== 多窗口 ADC =====
    pub adc_7d: f64,
    pub adc_14d: f64,
    pub adc_30d: f64,
    pub adc_60d: f64,

    // ===== 归一化 ADC (ADC30 × 季节因子 × 活动因子) =====
    pub adc_normalized: f64,
    pub seasonality_factor: f64,
    pub event_factor: f64,

    // ===== 趋势 =====
    pub adc_trend: AdcTrend,
    pub trend_confidence: f64, // [0,1]

    // ===== 波动 (30 天窗口, n-1 样本口径) =====
    pub coefficient_of_variation: f64,
    pub std_deviation: f64,

    // ===== 数据覆盖 =====
    pub data_points_used: i32,
    pub last_consumption_date: Option<NaiveDate>,

    // ===== 审计 =====
    pub calculation_date: NaiveDateTime,
}
