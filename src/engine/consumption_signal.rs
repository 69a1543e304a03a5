// ==========================================
// 库存缓冲补货系统 - 消耗信号计算引擎
// ==========================================
// 职责: 由消耗流水计算多窗口 ADC / 趋势 / 波动
// 输入: 消耗流水 (任意顺序, 同日可多条) + as_of 日期
// 输出: ConsumptionSignal (纯计算, 不落库)
// 红线: 空窗口 ADC 返回 0, 除零一律回落到 STABLE / 0
// ==========================================

use crate::config::DbmConfig;
use crate::domain::consumption::{ConsumptionProfile, ConsumptionRecord};
use crate::domain::types::AdcTrend;
use crate::engine::demand_factors::DemandFactors;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// 标准 ADC 窗口 (天)
pub const ADC_WINDOWS: [i64; 4] = [7, 14, 30, 60];

/// 波动统计窗口 (天)
const VARIABILITY_WINDOW_DAYS: i64 = 30;

// ==========================================
// TrendThresholds - 趋势判定阈值 (百分比)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendThresholds {
    pub short_pct: f64,
    pub long_pct: f64,
    pub volatile_pct: f64,
}

impl Default for TrendThresholds {
    fn default() -> Self {
        Self {
            short_pct: 10.0,
            long_pct: 5.0,
            volatile_pct: 20.0,
        }
    }
}

impl From<&DbmConfig> for TrendThresholds {
    fn from(config: &DbmConfig) -> Self {
        Self {
            short_pct: config.trend_short_pct,
            long_pct: config.trend_long_pct,
            volatile_pct: config.trend_volatile_pct,
        }
    }
}

// ==========================================
// ConsumptionSignal - 计算结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionSignal {
    pub adc_7d: f64,
    pub adc_14d: f64,
    pub adc_30d: f64,
    pub adc_60d: f64,
    pub adc_trend: AdcTrend,
    pub trend_confidence: f64,
    pub std_deviation: f64,
    pub coefficient_of_variation: f64,
    pub data_points_used: i32,
    pub last_consumption_date: Option<NaiveDate>,
}

// ==========================================
// ConsumptionSignalCalculator
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConsumptionSignalCalculator {
    thresholds: TrendThresholds,
}

impl ConsumptionSignalCalculator {
    pub fn new(thresholds: TrendThresholds) -> Self {
        Self { thresholds }
    }

    /// 计算完整消耗信号
    ///
    /// as_of 之后的流水不计入任何窗口
    pub fn compute(&self, records: &[ConsumptionRecord], as_of: NaiveDate) -> ConsumptionSignal {
        let daily = daily_totals(records, as_of);

        let adc_7d = adc(&daily, as_of, 7);
        let adc_14d = adc(&daily, as_of, 14);
        let adc_30d = adc(&daily, as_of, 30);
        let adc_60d = adc(&daily, as_of, 60);

        let (adc_trend, trend_confidence) = self.classify_trend(adc_7d, adc_14d, adc_30d);
        let (std_deviation, coefficient_of_variation) =
            variability(&daily, as_of, VARIABILITY_WINDOW_DAYS);

        let data_points_used = window_values(&daily, as_of, 60).len() as i32;
        let last_consumption_date = daily.keys().next_back().copied();

        ConsumptionSignal {
            adc_7d,
            adc_14d,
            adc_30d,
            adc_60d,
            adc_trend,
            trend_confidence,
            std_deviation,
            coefficient_of_variation,
            data_points_used,
            last_consumption_date,
        }
    }

    /// 趋势判定
    ///
    /// short = (ADC7 - ADC14) / ADC14 × 100
    /// long  = (ADC14 - ADC30) / ADC30 × 100
    ///
    /// 规则 (顺序执行):
    /// 1) ADC14 或 ADC30 ≤ 0 → (STABLE, 0)
    /// 2) short > s 且 long > l → INCREASING
    /// 3) short < -s 且 long < -l → DECREASING
    /// 4) |short| > v → VOLATILE
    /// 5) 其他 → STABLE
    pub fn classify_trend(&self, adc_7d: f64, adc_14d: f64, adc_30d: f64) -> (AdcTrend, f64) {
        if adc_14d <= 0.0 || adc_30d <= 0.0 {
            return (AdcTrend::Stable, 0.0);
        }

        let short_term = (adc_7d - adc_14d) / adc_14d * 100.0;
        let long_term = (adc_14d - adc_30d) / adc_30d * 100.0;
        let t = &self.thresholds;

        let trend = if short_term > t.short_pct && long_term > t.long_pct {
            AdcTrend::Increasing
        } else if short_term < -t.short_pct && long_term < -t.long_pct {
            AdcTrend::Decreasing
        } else if short_term.abs() > t.volatile_pct {
            AdcTrend::Volatile
        } else {
            AdcTrend::Stable
        };

        (trend, trend_confidence(adc_7d, adc_14d, adc_30d))
    }

    /// 由信号 + 需求因子组装画像 (整体重算)
    pub fn build_profile(
        &self,
        product_id: &str,
        location_id: &str,
        signal: &ConsumptionSignal,
        factors: &DemandFactors,
        calculated_at: NaiveDateTime,
    ) -> ConsumptionProfile {
        let seasonality_factor = factors.seasonality_or_default();
        let event_factor = factors.event_or_default();

        ConsumptionProfile {
            product_id: product_id.to_string(),
            location_id: location_id.to_string(),
            adc_7d: signal.adc_7d,
            adc_14d: signal.adc_14d,
            adc_30d: signal.adc_30d,
            adc_60d: signal.adc_60d,
            adc_normalized: signal.adc_30d * seasonality_factor * event_factor,
            seasonality_factor,
            event_factor,
            adc_trend: signal.adc_trend,
            trend_confidence: signal.trend_confidence,
            coefficient_of_variation: signal.coefficient_of_variation,
            std_deviation: signal.std_deviation,
            data_points_used: signal.data_points_used,
            last_consumption_date: signal.last_consumption_date,
            calculation_date: calculated_at,
        }
    }
}

// ==========================================
// 纯函数
// ==========================================

/// 按日汇总 (丢弃 as_of 之后与非有限数量的流水)
pub fn daily_totals(records: &[ConsumptionRecord], as_of: NaiveDate) -> BTreeMap<NaiveDate, f64> {
    let mut daily = BTreeMap::new();
    for r in records {
        if r.consumption_date > as_of || !r.quantity.is_finite() {
            continue;
        }
        *daily.entry(r.consumption_date).or_insert(0.0) += r.quantity;
    }
    daily
}

/// 窗口内的日汇总值: as_of - window < date ≤ as_of
fn window_values(daily: &BTreeMap<NaiveDate, f64>, as_of: NaiveDate, window_days: i64) -> Vec<f64> {
    let start = as_of - Duration::days(window_days - 1);
    daily.range(start..=as_of).map(|(_, q)| *q).collect()
}

/// ADC = 窗口内总量 / 有记录的天数; 无记录返回 0
pub fn adc(daily: &BTreeMap<NaiveDate, f64>, as_of: NaiveDate, window_days: i64) -> f64 {
    let values = window_values(daily, as_of, window_days);
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 趋势置信度 = clamp(1 - variance / maxVariance, 0, 1)
///
/// variance = (ADC7 - ADC30)² + (ADC14 - ADC30)², maxVariance = 2 × ADC30²
pub fn trend_confidence(adc_7d: f64, adc_14d: f64, adc_30d: f64) -> f64 {
    let max_variance = 2.0 * adc_30d * adc_30d;
    if max_variance <= 0.0 {
        return 0.0;
    }
    let variance = (adc_7d - adc_30d).powi(2) + (adc_14d - adc_30d).powi(2);
    (1.0 - variance / max_variance).clamp(0.0, 1.0)
}

/// 样本标准差 (n-1) 与变异系数; 少于 2 个数据点返回 (0, 0)
pub fn variability(
    daily: &BTreeMap<NaiveDate, f64>,
    as_of: NaiveDate,
    window_days: i64,
) -> (f64, f64) {
    let values = window_values(daily, as_of, window_days);
    let n = values.len();
    if n < 2 {
        return (0.0, 0.0);
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    let std_dev = (sum_sq / (n - 1) as f64).sqrt();
    let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };
    (std_dev, cv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_adc_empty_window_is_zero() {
        let daily = BTreeMap::new();
        assert_eq!(adc(&daily, d(2024, 3, 31), 7), 0.0);
    }

    #[test]
    fn test_adc_divides_by_days_with_records() {
        let as_of = d(2024, 3, 31);
        let records = vec![
            ConsumptionRecord::new(d(2024, 3, 31), 6.0),
            ConsumptionRecord::new(d(2024, 3, 31), 4.0),
            ConsumptionRecord::new(d(2024, 3, 29), 20.0),
            // 窗口外 (as_of - 7)
            ConsumptionRecord::new(d(2024, 3, 24), 100.0),
            // as_of 之后
            ConsumptionRecord::new(d(2024, 4, 1), 100.0),
        ];
        let daily = daily_totals(&records, as_of);
        // (10 + 20) / 2 天
        assert_eq!(adc(&daily, as_of, 7), 15.0);
        // 14 天窗口包含 3/24
        assert!((adc(&daily, as_of, 14) - 130.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_variability_uses_sample_formula() {
        let as_of = d(2024, 3, 31);
        let records = vec![
            ConsumptionRecord::new(d(2024, 3, 30), 2.0),
            ConsumptionRecord::new(d(2024, 3, 31), 4.0),
        ];
        let daily = daily_totals(&records, as_of);
        let (std_dev, cv) = variability(&daily, as_of, 30);
        // mean=3, sum_sq=2, n-1=1 → std=√2
        assert!((std_dev - 2f64.sqrt()).abs() < 1e-9);
        assert!((cv - 2f64.sqrt() / 3.0).abs() < 1e-9);

        let single = daily_totals(&records[..1], as_of);
        assert_eq!(variability(&single, as_of, 30), (0.0, 0.0));
    }

    #[test]
    fn test_trend_division_by_zero_is_stable() {
        let calc = ConsumptionSignalCalculator::default();
        assert_eq!(calc.classify_trend(5.0, 0.0, 3.0), (AdcTrend::Stable, 0.0));
        assert_eq!(calc.classify_trend(5.0, 3.0, 0.0), (AdcTrend::Stable, 0.0));
    }

    #[test]
    fn test_trend_is_sign_symmetric() {
        let calc = ConsumptionSignalCalculator::default();
        // short = +20%, long = +10%
        let (up, _) = calc.classify_trend(120.0, 100.0, 100.0 / 1.1);
        assert_eq!(up, AdcTrend::Increasing);
        // short = -20%, long = -10%
        let (down, _) = calc.classify_trend(80.0, 100.0, 100.0 / 0.9);
        assert_eq!(down, AdcTrend::Decreasing);
    }

    #[test]
    fn test_trend_volatile_and_stable() {
        let calc = ConsumptionSignalCalculator::default();
        // short = +30%, long = -10% → 不满足同向, |short| > 20
        let (t, _) = calc.classify_trend(130.0, 100.0, 100.0 / 0.9);
        assert_eq!(t, AdcTrend::Volatile);
        // short = +5%
        let (t, c) = calc.classify_trend(105.0, 100.0, 100.0);
        assert_eq!(t, AdcTrend::Stable);
        assert!(c > 0.99);
    }

    #[test]
    fn test_trend_confidence_bounds() {
        assert_eq!(trend_confidence(10.0, 10.0, 10.0), 1.0);
        assert_eq!(trend_confidence(100.0, 100.0, 1.0), 0.0);
        assert_eq!(trend_confidence(1.0, 1.0, 0.0), 0.0);
    }

    #[test]
    fn test_compute_and_build_profile_with_default_factors() {
        let as_of = d(2024, 3, 31);
        let records: Vec<_> = (0..60)
            .map(|i| ConsumptionRecord::new(as_of - Duration::days(i), 10.0))
            .collect();
        let calc = ConsumptionSignalCalculator::default();
        let signal = calc.compute(&records, as_of);

        assert_eq!(signal.adc_7d, 10.0);
        assert_eq!(signal.adc_60d, 10.0);
        assert_eq!(signal.adc_trend, AdcTrend::Stable);
        assert_eq!(signal.trend_confidence, 1.0);
        assert_eq!(signal.std_deviation, 0.0);
        assert_eq!(signal.data_points_used, 60);
        assert_eq!(signal.last_consumption_date, Some(as_of));

        let profile = calc.build_profile(
            "P1",
            "L1",
            &signal,
            &DemandFactors::default(),
            as_of.and_hms_opt(2, 0, 0).unwrap(),
        );
        assert_eq!(profile.adc_normalized, profile.adc_30d);
        assert_eq!(profile.seasonality_factor, 1.0);
        assert_eq!(profile.event_factor, 1.0);
    }

    #[test]
    fn test_build_profile_applies_factors() {
        let calc = ConsumptionSignalCalculator::default();
        let signal = calc.compute(&[ConsumptionRecord::new(d(2024, 3, 31), 10.0)], d(2024, 3, 31));
        let factors = DemandFactors {
            seasonality: Some(1.2),
            event: Some(1.5),
        };
        let profile = calc.build_profile(
            "P1",
            "L1",
            &signal,
            &factors,
            d(2024, 3, 31).and_hms_opt(0, 0, 0).unwrap(),
        );
        assert!((profile.adc_normalized - 18.0).abs() < 1e-9);
    }
}
