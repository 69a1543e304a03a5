// ==========================================
// 库存缓冲补货系统 - 主数据视图
// ==========================================
// 说明: 主数据 CRUD 不在本系统内,这里只定义引擎读取的只读视图
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 提前期 (仅取有效记录)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTime {
    pub product_id: String,
    pub location_id: String,
    pub order_lead_time: Option<f64>,
    pub manufacturing_time: Option<f64>,
    pub transport_time: Option<f64>,
    pub moq: Option<f64>,
}

impl LeadTime {
    /// 总提前期 = 制造 + 下单 + 运输 (缺失分量按 0)
    pub fn total_days(&self) -> f64 {
        self.manufacturing_time.unwrap_or(0.0)
            + self.order_lead_time.unwrap_or(0.0)
            + self.transport_time.unwrap_or(0.0)
    }
}

/// 产品主数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_id: String,
    pub name: String,
    pub category: Option<String>,
    pub moq: Option<f64>,
    pub is_active: bool,
}

/// 库位主数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub location_id: String,
    pub name: String,
    pub parent_location_id: Option<String>,
}

/// 季节性调整 (按 产品|品类 × 库位 × 月份)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalityAdjustment {
    pub product_id: Option<String>,
    pub category: Option<String>,
    pub location_id: String,
    pub month: u32,
    pub factor: f64,
}

/// 促销/特殊活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialEvent {
    pub event_id: String,
    pub product_id: String,
    pub location_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub change_factor: f64,
    pub is_active: bool,
}

impl SpecialEvent {
    /// 活动是否覆盖指定日期 (闭区间)
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.is_active && self.start_date <= date && date <= self.end_date
    }
}
