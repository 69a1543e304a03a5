// ==========================================
// 库存缓冲补货系统 - 缓冲分区判定引擎
// ==========================================
// 红线: 分区是"等级制",只由 (buffer_units, net_available, 阈值) 决定
// ==========================================
// 职责: 计算消耗百分比 + 判定分区
// 输入: buffer_units + net_available_qty + ZoneThresholds
// 输出: ZoneClassification (zone, consumed_pct)
// ==========================================

use crate::domain::buffer::ZoneThresholds;
use crate::domain::types::BufferZone;
use serde::{Deserialize, Serialize};

/// 分区判定结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneClassification {
    pub zone: BufferZone,
    /// 消耗百分比, 已截断到 [0,100]
    pub consumed_pct: f64,
}

// ==========================================
// BufferZoneClassifier - 分区判定引擎
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct BufferZoneClassifier {
    /// buffer_units ≤ 0 时使用的分区 (UNKNOWN 或 GREEN)
    empty_buffer_zone: BufferZone,
}

impl Default for BufferZoneClassifier {
    fn default() -> Self {
        Self::new(BufferZone::Unknown)
    }
}

impl BufferZoneClassifier {
    pub fn new(empty_buffer_zone: BufferZone) -> Self {
        Self { empty_buffer_zone }
    }

    /// 判定分区
    ///
    /// 规则 (顺序执行, 命中即返回):
    /// 1) buffer_units ≤ 0 (或非有限值) → empty_buffer_zone, consumed=0
    /// 2) consumed = clamp(100 × (1 - net/units), 0, 100)
    /// 3) consumed ≤ 100 - green  → GREEN
    /// 4) consumed ≤ 100 - yellow → YELLOW
    /// 5) consumed ≤ 100 - red    → RED
    /// 6) 其他                    → CRITICAL
    ///
    /// 阈值不单调时仍按上述顺序取首个命中
    pub fn classify(
        &self,
        buffer_units: f64,
        net_available: f64,
        thresholds: &ZoneThresholds,
    ) -> ZoneClassification {
        if !buffer_units.is_finite() || buffer_units <= 0.0 {
            return ZoneClassification {
                zone: self.empty_buffer_zone,
                consumed_pct: 0.0,
            };
        }

        let net = if net_available.is_finite() {
            net_available.max(0.0)
        } else {
            0.0
        };
        let consumed_pct = consumed_pct(buffer_units, net);

        let zone = if consumed_pct <= 100.0 - thresholds.green_pct {
            BufferZone::Green
        } else if consumed_pct <= 100.0 - thresholds.yellow_pct {
            BufferZone::Yellow
        } else if consumed_pct <= 100.0 - thresholds.red_pct {
            BufferZone::Red
        } else {
            BufferZone::Critical
        };

        ZoneClassification { zone, consumed_pct }
    }
}

/// 消耗百分比 = clamp(100 × (1 - net/units), 0, 100)
///
/// net ≥ units 时为 0 (超储也算满缓冲)
pub fn consumed_pct(buffer_units: f64, net_available: f64) -> f64 {
    if buffer_units <= 0.0 {
        return 0.0;
    }
    (100.0 * (1.0 - net_available / buffer_units)).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_thresholds() -> ZoneThresholds {
        ZoneThresholds::new(80.0, 50.0, 20.0)
    }

    #[test]
    fn test_full_buffer_is_green() {
        let c = BufferZoneClassifier::default();
        let r = c.classify(100.0, 100.0, &default_thresholds());
        assert_eq!(r.zone, BufferZone::Green);
        assert_eq!(r.consumed_pct, 0.0);
    }

    #[test]
    fn test_overstock_clamps_to_zero() {
        let c = BufferZoneClassifier::default();
        let r = c.classify(100.0, 250.0, &default_thresholds());
        assert_eq!(r.consumed_pct, 0.0);
        assert_eq!(r.zone, BufferZone::Green);
    }

    #[test]
    fn test_bands_with_default_thresholds() {
        let c = BufferZoneClassifier::default();
        let t = default_thresholds();
        // consumed 20 → GREEN 边界 (≤ 20)
        assert_eq!(c.classify(100.0, 80.0, &t).zone, BufferZone::Green);
        // consumed 30 → YELLOW
        assert_eq!(c.classify(100.0, 70.0, &t).zone, BufferZone::Yellow);
        // consumed 50 → YELLOW 边界 (≤ 50)
        assert_eq!(c.classify(100.0, 50.0, &t).zone, BufferZone::Yellow);
        // consumed 60 → RED
        assert_eq!(c.classify(100.0, 40.0, &t).zone, BufferZone::Red);
        // consumed 90 → CRITICAL
        assert_eq!(c.classify(100.0, 10.0, &t).zone, BufferZone::Critical);
        // consumed 100 → CRITICAL
        assert_eq!(c.classify(100.0, 0.0, &t).zone, BufferZone::Critical);
    }

    #[test]
    fn test_equal_thresholds_first_match_wins() {
        let c = BufferZoneClassifier::default();
        let t = ZoneThresholds::new(33.0, 33.0, 33.0);
        let r = c.classify(100.0, 80.0, &t);
        assert!((r.consumed_pct - 20.0).abs() < 1e-9);
        assert_eq!(r.zone, BufferZone::Green);
        // consumed 70 > 67 → 三档都不命中
        assert_eq!(c.classify(100.0, 30.0, &t).zone, BufferZone::Critical);
    }

    #[test]
    fn test_empty_buffer_policy() {
        let t = default_thresholds();
        let unknown = BufferZoneClassifier::new(BufferZone::Unknown).classify(0.0, 10.0, &t);
        assert_eq!(unknown.zone, BufferZone::Unknown);
        assert_eq!(unknown.consumed_pct, 0.0);

        let green = BufferZoneClassifier::new(BufferZone::Green).classify(-5.0, 10.0, &t);
        assert_eq!(green.zone, BufferZone::Green);
    }

    #[test]
    fn test_negative_or_nan_net_treated_as_empty_stock() {
        let c = BufferZoneClassifier::default();
        let t = default_thresholds();
        assert_eq!(c.classify(100.0, -20.0, &t).consumed_pct, 100.0);
        assert_eq!(c.classify(100.0, f64::NAN, &t).zone, BufferZone::Critical);
    }
}
