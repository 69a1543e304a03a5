// ==========================================
// 库存缓冲补货系统 - 季节/活动因子查询
// ==========================================
// 职责: 查询季节因子 (产品 → 品类 → 无) 与活动因子 (覆盖日期的最大值)
// 红线: 查询失败与"无调整"必须区分; 无状态, 只做查询
// ==========================================

use crate::domain::master::SpecialEvent;
use crate::engine::ports::{EventReader, SeasonalityReader};
use crate::repository::error::RepositoryResult;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

/// 需求调整因子; None 表示"无调整"
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DemandFactors {
    pub seasonality: Option<f64>,
    pub event: Option<f64>,
}

impl DemandFactors {
    pub fn seasonality_or_default(&self) -> f64 {
        self.seasonality.unwrap_or(1.0)
    }

    pub fn event_or_default(&self) -> f64 {
        self.event.unwrap_or(1.0)
    }

    /// 季节 × 活动
    pub fn combined(&self) -> f64 {
        self.seasonality_or_default() * self.event_or_default()
    }
}

// ==========================================
// SeasonalityAndEventAdjuster
// ==========================================
#[derive(Clone)]
pub struct SeasonalityAndEventAdjuster {
    seasonality_reader: Arc<dyn SeasonalityReader>,
    event_reader: Arc<dyn EventReader>,
}

impl SeasonalityAndEventAdjuster {
    pub fn new(
        seasonality_reader: Arc<dyn SeasonalityReader>,
        event_reader: Arc<dyn EventReader>,
    ) -> Self {
        Self {
            seasonality_reader,
            event_reader,
        }
    }

    /// 季节因子; 非正或非有限的配置值视为无调整
    pub fn seasonality_factor(
        &self,
        product_id: &str,
        category: Option<&str>,
        location_id: &str,
        month: u32,
    ) -> RepositoryResult<Option<f64>> {
        let factor = self
            .seasonality_reader
            .find_seasonality_factor(product_id, category, location_id, month)?;

        Ok(factor.filter(|f| {
            let valid = is_valid_factor(*f);
            if !valid {
                tracing::warn!(
                    product_id,
                    location_id,
                    month,
                    factor = *f,
                    "季节因子非法, 按无调整处理"
                );
            }
            valid
        }))
    }

    /// 活动因子: 覆盖 date 的有效活动中 change_factor 最大者
    pub fn event_factor(
        &self,
        product_id: &str,
        location_id: &str,
        date: NaiveDate,
    ) -> RepositoryResult<Option<f64>> {
        let events = self
            .event_reader
            .find_active_events(product_id, location_id, date)?;
        Ok(max_event_factor(&events, date))
    }

    /// 一次性查询两个因子 (月份取 date 所在月)
    pub fn factors(
        &self,
        product_id: &str,
        category: Option<&str>,
        location_id: &str,
        date: NaiveDate,
    ) -> RepositoryResult<DemandFactors> {
        Ok(DemandFactors {
            seasonality: self.seasonality_factor(product_id, category, location_id, date.month())?,
            event: self.event_factor(product_id, location_id, date)?,
        })
    }
}

fn is_valid_factor(f: f64) -> bool {
    f.is_finite() && f > 0.0
}

/// 覆盖日期的活动取最大 change_factor; 没有则 None
pub fn max_event_factor(events: &[SpecialEvent], date: NaiveDate) -> Option<f64> {
    events
        .iter()
        .filter(|e| e.covers(date) && is_valid_factor(e.change_factor))
        .map(|e| e.change_factor)
        .max_by(|a, b| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::error::RepositoryError;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn event(id: &str, start: NaiveDate, end: NaiveDate, factor: f64) -> SpecialEvent {
        SpecialEvent {
            event_id: id.to_string(),
            product_id: "P1".to_string(),
            location_id: "L1".to_string(),
            start_date: start,
            end_date: end,
            change_factor: factor,
            is_active: true,
        }
    }

    struct FixedSeasonality(Option<f64>);

    impl SeasonalityReader for FixedSeasonality {
        fn find_seasonality_factor(
            &self,
            _product_id: &str,
            _category: Option<&str>,
            _location_id: &str,
            _month: u32,
        ) -> RepositoryResult<Option<f64>> {
            Ok(self.0)
        }
    }

    struct FailingEvents;

    impl EventReader for FailingEvents {
        fn find_active_events(
            &self,
            _product_id: &str,
            _location_id: &str,
            _date: NaiveDate,
        ) -> RepositoryResult<Vec<SpecialEvent>> {
            Err(RepositoryError::DatabaseQueryError("offline".to_string()))
        }
    }

    struct StaticEvents(Vec<SpecialEvent>);

    impl EventReader for StaticEvents {
        fn find_active_events(
            &self,
            _product_id: &str,
            _location_id: &str,
            _date: NaiveDate,
        ) -> RepositoryResult<Vec<SpecialEvent>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_max_event_factor_picks_highest_overlap() {
        let events = vec![
            event("E1", d(3, 1), d(3, 31), 1.2),
            event("E2", d(3, 10), d(3, 20), 1.8),
            event("E3", d(4, 1), d(4, 30), 3.0),
        ];
        assert_eq!(max_event_factor(&events, d(3, 15)), Some(1.8));
        assert_eq!(max_event_factor(&events, d(3, 25)), Some(1.2));
        assert_eq!(max_event_factor(&events, d(5, 1)), None);
    }

    #[test]
    fn test_inactive_event_ignored() {
        let mut e = event("E1", d(3, 1), d(3, 31), 2.0);
        e.is_active = false;
        assert_eq!(max_event_factor(&[e], d(3, 15)), None);
    }

    #[test]
    fn test_factors_distinguish_missing_from_failure() {
        let adjuster = SeasonalityAndEventAdjuster::new(
            Arc::new(FixedSeasonality(None)),
            Arc::new(StaticEvents(vec![])),
        );
        let f = adjuster.factors("P1", None, "L1", d(3, 15)).unwrap();
        assert_eq!(f, DemandFactors::default());
        assert_eq!(f.combined(), 1.0);

        let failing = SeasonalityAndEventAdjuster::new(
            Arc::new(FixedSeasonality(Some(1.1))),
            Arc::new(FailingEvents),
        );
        assert!(failing.factors("P1", None, "L1", d(3, 15)).is_err());
    }

    #[test]
    fn test_invalid_seasonality_factor_treated_as_missing() {
        let adjuster = SeasonalityAndEventAdjuster::new(
            Arc::new(FixedSeasonality(Some(0.0))),
            Arc::new(StaticEvents(vec![event("E1", d(3, 1), d(3, 31), 1.5)])),
        );
        let f = adjuster.factors("P1", None, "L1", d(3, 15)).unwrap();
        assert_eq!(f.seasonality, None);
        assert_eq!(f.event, Some(1.5));
        assert!((f.combined() - 1.5).abs() < 1e-9);
    }
}
