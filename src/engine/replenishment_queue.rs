// ==========================================
// 库存缓冲补货系统 - 补货队列生成引擎
// ==========================================
// 职责: 由缓冲分区 + 库存位置生成带优先级与原因码的补货建议
// 输入: InventoryBuffer + ConsumptionProfile + LeadTime + ProductInfo
// 输出: replenishment_queue (PENDING, 只追加)
// 红线: 生成器不创建订单; 缺画像/缺产品 → skip, 不中断批处理
// ==========================================

use crate::config::DbmConfig;
use crate::domain::buffer::InventoryBuffer;
use crate::domain::master::{LeadTime, ProductInfo};
use crate::domain::replenishment::ReplenishmentQueueItem;
use crate::domain::types::{BufferZone, QueueStatus, ReasonCode, RecommendedAction};
use crate::engine::buffer_scan::{scan_buffers, ScanMode};
use crate::engine::job::{
    JobContext, JobError, JobKind, JobResult, JobScope, JobSummary, SkipReason, UnitOutcome,
};
use crate::engine::repositories::DbmRepositories;
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

/// 单个缓冲的补货建议 (纯计算结果)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecommendation {
    pub buffer_gap: f64,
    pub days_of_supply: f64,
    pub lead_time_days: f64,
    pub moq: f64,
    pub recommended_action: RecommendedAction,
    pub recommended_qty: f64,
    pub priority_score: f64,
    pub reason_codes: Vec<ReasonCode>,
}

// ==========================================
// ReplenishmentQueueGenerator
// ==========================================
pub struct ReplenishmentQueueGenerator {
    repos: DbmRepositories,
    config: DbmConfig,
}

impl ReplenishmentQueueGenerator {
    pub fn new(repos: DbmRepositories, config: DbmConfig) -> Self {
        Self { repos, config }
    }

    // ==========================================
    // 核心计算
    // ==========================================

    /// 计算补货建议
    ///
    /// 步骤:
    /// 1) gap = max(0, units - net)
    /// 2) dos = net / adc_normalized (adc ≤ 0 → 0)
    /// 3) lead = 制造 + 下单 + 运输 (无记录 → 默认提前期)
    /// 4) action: gap=0 → MONITOR; RED/CRITICAL 且 dos < lead/2 → EXPEDITE; 否则 ORDER
    /// 5) qty: MONITOR → 0; 否则 max(MOQ, gap)
    /// 6) score = 分区权重 + gap/units×100
    /// 7) reason: 分区 → 低天数 → 缺口; 都不命中 → ROUTINE_REVIEW
    pub fn evaluate(
        &self,
        buffer: &InventoryBuffer,
        adc_normalized: f64,
        lead_time: Option<&LeadTime>,
        product: &ProductInfo,
    ) -> QueueRecommendation {
        let net = buffer.net_available_qty.max(0.0);
        let buffer_gap = buffer.buffer_gap();

        let days_of_supply = if adc_normalized.is_finite() && adc_normalized > 0.0 {
            net / adc_normalized
        } else {
            0.0
        };

        let lead_time_days = lead_time
            .map(|lt| lt.total_days())
            .unwrap_or(self.config.default_lead_time_days);

        let moq = resolve_moq(lead_time, product, self.config.default_moq);

        let zone = buffer.current_zone;
        let recommended_action = if buffer_gap <= 0.0 {
            RecommendedAction::Monitor
        } else if zone.is_red_or_worse() && days_of_supply < lead_time_days / 2.0 {
            RecommendedAction::Expedite
        } else {
            RecommendedAction::Order
        };

        let recommended_qty = if recommended_action.requires_order() {
            buffer_gap.max(moq)
        } else {
            0.0
        };

        let penetration = if buffer.buffer_units > 0.0 {
            buffer_gap / buffer.buffer_units * 100.0
        } else {
            0.0
        };
        let priority_score = self.zone_weight(zone) + penetration;

        let mut reason_codes = Vec::new();
        if zone.is_red_or_worse() {
            reason_codes.push(ReasonCode::RedZone);
        } else if zone == BufferZone::Yellow {
            reason_codes.push(ReasonCode::YellowZone);
        }
        if days_of_supply < lead_time_days {
            reason_codes.push(ReasonCode::LowDaysOfSupply);
        }
        if buffer_gap > 0.0 {
            reason_codes.push(ReasonCode::BufferDeficit);
        }
        if reason_codes.is_empty() {
            reason_codes.push(ReasonCode::RoutineReview);
        }

        QueueRecommendation {
            buffer_gap,
            days_of_supply,
            lead_time_days,
            moq,
            recommended_action,
            recommended_qty,
            priority_score,
            reason_codes,
        }
    }

    fn zone_weight(&self, zone: BufferZone) -> f64 {
        match zone {
            BufferZone::Red | BufferZone::Critical => self.config.zone_weight_red,
            BufferZone::Yellow => self.config.zone_weight_yellow,
            BufferZone::Green | BufferZone::Unknown => self.config.zone_weight_green,
        }
    }

    /// 组装队列项 (PENDING)
    pub fn build_item(
        &self,
        buffer: &InventoryBuffer,
        rec: QueueRecommendation,
        generation_id: &str,
        generated_at: NaiveDateTime,
    ) -> ReplenishmentQueueItem {
        ReplenishmentQueueItem {
            queue_item_id: Uuid::new_v4().to_string(),
            generation_id: generation_id.to_string(),
            buffer_id: buffer.buffer_id.clone(),
            product_id: buffer.product_id.clone(),
            location_id: buffer.location_id.clone(),
            zone: buffer.current_zone,
            buffer_units: buffer.buffer_units,
            net_available_qty: buffer.net_available_qty,
            buffer_gap: rec.buffer_gap,
            days_of_supply: rec.days_of_supply,
            lead_time_days: rec.lead_time_days,
            moq: rec.moq,
            recommended_action: rec.recommended_action,
            recommended_qty: rec.recommended_qty,
            priority_score: rec.priority_score,
            reason_codes: rec.reason_codes,
            status: QueueStatus::Pending,
            generated_at,
            status_updated_at: None,
        }
    }

    // ==========================================
    // 批处理
    // ==========================================

    /// 执行一轮队列生成
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub fn run(&self, ctx: &JobContext, scope: &JobScope) -> JobResult {
        let mut summary = JobSummary::new(JobKind::QueueGeneration, ctx.run_id.clone());

        let scanned = scan_buffers(
            self.repos.buffers.as_ref(),
            scope,
            ScanMode::Active,
            self.config.page_size,
            ctx,
            &mut summary,
            |buffer| match self.generate_for(buffer, ctx) {
                Ok(outcome) => outcome,
                Err(e) => UnitOutcome::Failed(e),
            },
        );
        if let Err(e) = scanned {
            return Err(JobError::fatal(summary, &e));
        }

        tracing::info!(
            run_id = %summary.run_id,
            processed = summary.processed,
            created = summary.created,
            skipped = summary.skipped,
            errors = summary.errors,
            "补货队列生成完成"
        );
        Ok(summary)
    }

    fn generate_for(&self, buffer: &InventoryBuffer, ctx: &JobContext) -> RepositoryResult<UnitOutcome> {
        let profile = match self
            .repos
            .profiles
            .find_profile(&buffer.product_id, &buffer.location_id)?
        {
            Some(p) => p,
            None => return Ok(UnitOutcome::Skipped(SkipReason::MissingProfile)),
        };

        let product = match self.repos.products.find_product(&buffer.product_id)? {
            Some(p) if p.is_active => p,
            Some(_) => return Ok(UnitOutcome::Skipped(SkipReason::InactiveProduct)),
            None => return Ok(UnitOutcome::Skipped(SkipReason::MissingProduct)),
        };

        let lead_time = self
            .repos
            .lead_times
            .find_active_lead_time(&buffer.product_id, &buffer.location_id)?;
        if lead_time.is_none() {
            tracing::debug!(
                buffer_id = %buffer.buffer_id,
                default_days = self.config.default_lead_time_days,
                "缺少提前期记录, 使用默认提前期"
            );
        }

        let rec = self.evaluate(buffer, profile.adc_normalized, lead_time.as_ref(), &product);
        let item = self.build_item(buffer, rec, &ctx.run_id, ctx.as_of);
        self.repos.queue.append_item(&item)?;

        tracing::debug!(
            buffer_id = %item.buffer_id,
            action = %item.recommended_action,
            qty = item.recommended_qty,
            priority = item.priority_score,
            "补货队列项已生成"
        );
        Ok(UnitOutcome::Created)
    }
}

/// MOQ 取值: 提前期记录 → 产品主数据 → 默认值 (非正值视为缺失)
pub fn resolve_moq(lead_time: Option<&LeadTime>, product: &ProductInfo, default_moq: f64) -> f64 {
    lead_time
        .and_then(|lt| lt.moq)
        .filter(|m| m.is_finite() && *m > 0.0)
        .or(product.moq.filter(|m| m.is_finite() && *m > 0.0))
        .unwrap_or(default_moq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::buffer::ZoneThresholds;
    use crate::engine::repositories::DbmRepositories;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn generator() -> ReplenishmentQueueGenerator {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let repos = DbmRepositories::sqlite(Arc::new(Mutex::new(conn)));
        ReplenishmentQueueGenerator::new(repos, DbmConfig::default())
    }

    fn buffer(units: f64, net: f64, zone: BufferZone) -> InventoryBuffer {
        let t = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        InventoryBuffer {
            buffer_id: "B1".to_string(),
            product_id: "P1".to_string(),
            location_id: "L1".to_string(),
            buffer_units: units,
            buffer_days: 10,
            thresholds: ZoneThresholds::new(80.0, 50.0, 20.0),
            current_inventory: net,
            in_pipeline_qty: 0.0,
            net_available_qty: net,
            net_available_override: None,
            buffer_consumed_pct: 0.0,
            current_zone: zone,
            zone_entered_on: t.date(),
            consecutive_zone_days: 0,
            adjustment_threshold_days: 7,
            last_review_date: None,
            next_review_due: None,
            is_active: true,
            revision: 1,
            created_at: t,
            updated_at: t,
        }
    }

    fn product(moq: Option<f64>) -> ProductInfo {
        ProductInfo {
            product_id: "P1".to_string(),
            name: "Widget".to_string(),
            category: None,
            moq,
            is_active: true,
        }
    }

    fn lead_time(days: f64, moq: Option<f64>) -> LeadTime {
        LeadTime {
            product_id: "P1".to_string(),
            location_id: "L1".to_string(),
            order_lead_time: Some(days),
            manufacturing_time: None,
            transport_time: None,
            moq,
        }
    }

    #[test]
    fn test_gap_above_moq_orders_gap() {
        let g = generator();
        let rec = g.evaluate(
            &buffer(100.0, 60.0, BufferZone::Yellow),
            10.0,
            Some(&lead_time(3.0, None)),
            &product(Some(25.0)),
        );
        assert_eq!(rec.buffer_gap, 40.0);
        assert_eq!(rec.recommended_action, RecommendedAction::Order);
        assert_eq!(rec.recommended_qty, 40.0);
    }

    #[test]
    fn test_gap_below_moq_rounds_up_to_moq() {
        let g = generator();
        let rec = g.evaluate(
            &buffer(100.0, 90.0, BufferZone::Green),
            10.0,
            Some(&lead_time(3.0, None)),
            &product(Some(25.0)),
        );
        assert_eq!(rec.buffer_gap, 10.0);
        assert_eq!(rec.recommended_qty, 25.0);
    }

    #[test]
    fn test_red_zone_short_supply_expedites() {
        let g = generator();
        // net 20, adc 10 → dos 2; lead 6 → 2 < 3
        let rec = g.evaluate(
            &buffer(100.0, 20.0, BufferZone::Red),
            10.0,
            Some(&lead_time(6.0, None)),
            &product(None),
        );
        assert_eq!(rec.days_of_supply, 2.0);
        assert_eq!(rec.recommended_action, RecommendedAction::Expedite);
        assert_eq!(
            rec.reason_codes,
            vec![
                ReasonCode::RedZone,
                ReasonCode::LowDaysOfSupply,
                ReasonCode::BufferDeficit
            ]
        );
        assert_eq!(rec.priority_score, 180.0);
    }

    #[test]
    fn test_full_buffer_monitors_with_routine_review() {
        let g = generator();
        let rec = g.evaluate(
            &buffer(100.0, 120.0, BufferZone::Green),
            10.0,
            Some(&lead_time(5.0, None)),
            &product(None),
        );
        assert_eq!(rec.recommended_action, RecommendedAction::Monitor);
        assert_eq!(rec.recommended_qty, 0.0);
        assert_eq!(rec.reason_codes, vec![ReasonCode::RoutineReview]);
        assert_eq!(rec.priority_score, 10.0);
    }

    #[test]
    fn test_missing_lead_time_uses_default_and_zero_adc() {
        let g = generator();
        let rec = g.evaluate(&buffer(100.0, 70.0, BufferZone::Yellow), 0.0, None, &product(None));
        assert_eq!(rec.lead_time_days, 7.0);
        assert_eq!(rec.days_of_supply, 0.0);
        assert_eq!(rec.moq, 1.0);
        assert_eq!(rec.priority_score, 80.0);
    }

    #[test]
    fn test_moq_precedence() {
        let lt = lead_time(1.0, Some(40.0));
        assert_eq!(resolve_moq(Some(&lt), &product(Some(25.0)), 1.0), 40.0);
        assert_eq!(resolve_moq(None, &product(Some(25.0)), 1.0), 25.0);
        assert_eq!(resolve_moq(None, &product(Some(0.0)), 1.0), 1.0);
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let g = generator();
        let b = buffer(100.0, 35.0, BufferZone::Red);
        let a = g.evaluate(&b, 4.0, None, &product(None));
        let c = g.evaluate(&b, 4.0, None, &product(None));
        assert_eq!(a, c);
    }
}
