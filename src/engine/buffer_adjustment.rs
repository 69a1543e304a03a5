// ==========================================
// 库存缓冲补货系统 - 缓冲动态调整引擎 (DBM)
// ==========================================
// 职责: 按持续在区天数判定缓冲扩大/缩小/维持, 生成审计日志, 处理审批
// 输入: InventoryBuffer + ConsumptionProfile + 季节/活动因子
// 输出: 缓冲尺寸变更 (经 BufferUpdater) + buffer_adjustment_log
// 红线: 未达门槛或处于锁定期一律 MAINTAIN; 需审批的尺寸在批准前不生效
// ==========================================

use crate::config::{ApprovalPolicy, DbmConfig, SizingMode};
use crate::domain::adjustment::BufferAdjustmentLog;
use crate::domain::buffer::InventoryBuffer;
use crate::domain::consumption::ConsumptionProfile;
use crate::domain::types::{AdjustmentDecision, ApprovalStatus, BufferZone};
use crate::engine::buffer_scan::{scan_buffers, ScanMode};
use crate::engine::buffer_updater::{apply_mutations, compensate, BufferMutation, BufferUpdater};
use crate::engine::demand_factors::{DemandFactors, SeasonalityAndEventAdjuster};
use crate::engine::job::{JobContext, JobError, JobKind, JobResult, JobScope, JobSummary, UnitOutcome};
use crate::engine::repositories::DbmRepositories;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

/// 自动批准时记录的审批人
pub const SYSTEM_APPROVER: &str = "SYSTEM";

// ==========================================
// AdjustmentProposal - 评审结论 (纯计算结果)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentProposal {
    pub decision: AdjustmentDecision,
    /// MAINTAIN 的原因 (门槛/锁定/分区); 调整时为触发原因
    pub reason: String,
    pub adjustment_factor: f64,
    pub old_buffer_units: f64,
    pub new_buffer_units: f64,
    pub old_buffer_days: i32,
    pub new_buffer_days: i32,
    pub change_percentage: f64,
    pub requires_approval: bool,
}

impl AdjustmentProposal {
    fn maintain(buffer: &InventoryBuffer, reason: String) -> Self {
        Self {
            decision: AdjustmentDecision::Maintain,
            reason,
            adjustment_factor: 1.0,
            old_buffer_units: buffer.buffer_units,
            new_buffer_units: buffer.buffer_units,
            old_buffer_days: buffer.buffer_days,
            new_buffer_days: buffer.buffer_days,
            change_percentage: 0.0,
            requires_approval: false,
        }
    }

    pub fn is_change(&self) -> bool {
        self.decision != AdjustmentDecision::Maintain
    }
}

/// 单个缓冲评审的落库结果
#[derive(Debug, Clone)]
pub struct ReviewResult {
    pub proposal: AdjustmentProposal,
    pub buffer: InventoryBuffer,
    pub log: Option<BufferAdjustmentLog>,
}

// ==========================================
// BufferAdjustmentEngine
// ==========================================
pub struct BufferAdjustmentEngine {
    repos: DbmRepositories,
    updater: BufferUpdater,
    adjuster: SeasonalityAndEventAdjuster,
    config: DbmConfig,
}

impl BufferAdjustmentEngine {
    pub fn new(repos: DbmRepositories, config: DbmConfig) -> Self {
        let updater = BufferUpdater::from_config(repos.buffers.clone(), &config);
        let adjuster =
            SeasonalityAndEventAdjuster::new(repos.seasonality.clone(), repos.events.clone());
        Self {
            repos,
            updater,
            adjuster,
            config,
        }
    }

    // ==========================================
    // 核心判定
    // ==========================================

    /// 评审判定
    ///
    /// 规则 (顺序执行, 命中即返回):
    /// 1) buffer_units ≤ 0 → MAINTAIN
    /// 2) 在区天数 < 门槛 → MAINTAIN
    /// 3) 处于锁定期 (last_review + 周期 × lock_cycles) → MAINTAIN
    /// 4) RED/CRITICAL → INCREASE; GREEN → DECREASE; 其他 → MAINTAIN
    ///
    /// 新尺寸 = round(units × factor); 新天数 = ceil(新尺寸 / adc_normalized)
    pub fn evaluate(
        &self,
        buffer: &InventoryBuffer,
        profile: Option<&ConsumptionProfile>,
        factors: &DemandFactors,
        today: NaiveDate,
    ) -> AdjustmentProposal {
        if buffer.buffer_units <= 0.0 {
            return AdjustmentProposal::maintain(buffer, "EMPTY_BUFFER".to_string());
        }
        if buffer.consecutive_zone_days < buffer.adjustment_threshold_days {
            return AdjustmentProposal::maintain(
                buffer,
                format!(
                    "BELOW_THRESHOLD_DAYS: consecutive_days={}, threshold={}",
                    buffer.consecutive_zone_days, buffer.adjustment_threshold_days
                ),
            );
        }
        if buffer.is_locked(today, self.config.review_period_days, self.config.lock_cycles) {
            let until = buffer
                .lock_until(self.config.review_period_days, self.config.lock_cycles)
                .map(|d| d.to_string())
                .unwrap_or_default();
            return AdjustmentProposal::maintain(buffer, format!("LOCKED_UNTIL: {}", until));
        }

        let (decision, base_factor) = match buffer.current_zone {
            BufferZone::Red | BufferZone::Critical => {
                (AdjustmentDecision::IncreaseBuffer, self.config.increase_factor())
            }
            BufferZone::Green => (AdjustmentDecision::DecreaseBuffer, self.config.decrease_factor()),
            BufferZone::Yellow | BufferZone::Unknown => {
                return AdjustmentProposal::maintain(
                    buffer,
                    format!("ZONE_NEUTRAL: {}", buffer.current_zone),
                );
            }
        };

        let adjustment_factor = match self.config.sizing_mode {
            SizingMode::Fixed => base_factor,
            SizingMode::DemandAdjusted => base_factor * factors.combined(),
        };

        let old_units = buffer.buffer_units;
        let new_units = (old_units * adjustment_factor).round().max(0.0);
        if (new_units - old_units).abs() < f64::EPSILON {
            return AdjustmentProposal::maintain(buffer, "NO_EFFECTIVE_CHANGE".to_string());
        }

        let new_days = match profile.map(|p| p.adc_normalized) {
            Some(adc) if adc.is_finite() && adc > 0.0 => (new_units / adc).ceil() as i32,
            _ => buffer.buffer_days,
        };
        let change_percentage = (new_units - old_units) / old_units * 100.0;

        let requires_approval = match self.config.approval_policy {
            ApprovalPolicy::Threshold => change_percentage.abs() > self.config.approval_threshold_pct,
            ApprovalPolicy::ZoneBased => decision == AdjustmentDecision::IncreaseBuffer,
        };

        AdjustmentProposal {
            decision,
            reason: format!(
                "SUSTAINED_{}_ZONE: consecutive_days={}, threshold={}",
                buffer.current_zone, buffer.consecutive_zone_days, buffer.adjustment_threshold_days
            ),
            adjustment_factor,
            old_buffer_units: old_units,
            new_buffer_units: new_units,
            old_buffer_days: buffer.buffer_days,
            new_buffer_days: new_days,
            change_percentage,
            requires_approval,
        }
    }

    // ==========================================
    // 批处理
    // ==========================================

    /// 评审所有到期缓冲
    ///
    /// 计数口径: 自动生效 → updated; 待审批 → created (仅日志); MAINTAIN → 不计
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub fn run_review(&self, ctx: &JobContext, scope: &JobScope) -> JobResult {
        let mut summary = JobSummary::new(JobKind::BufferReview, ctx.run_id.clone());

        let scanned = scan_buffers(
            self.repos.buffers.as_ref(),
            scope,
            ScanMode::ReviewDue,
            self.config.page_size,
            ctx,
            &mut summary,
            |buffer| match self.review(buffer, ctx.as_of) {
                Ok(r) if !r.proposal.is_change() => UnitOutcome::Unchanged,
                Ok(r) if r.proposal.requires_approval => UnitOutcome::Created,
                Ok(_) => UnitOutcome::Updated,
                Err(e) => UnitOutcome::Failed(e),
            },
        );
        if let Err(e) = scanned {
            return Err(JobError::fatal(summary, &e));
        }

        tracing::info!(
            run_id = %summary.run_id,
            processed = summary.processed,
            updated = summary.updated,
            pending_approval = summary.created,
            errors = summary.errors,
            "缓冲评审完成"
        );
        Ok(summary)
    }

    /// 评审指定缓冲 (不检查评审到期日)
    pub fn adjust_buffer(&self, buffer_id: &str, now: NaiveDateTime) -> RepositoryResult<ReviewResult> {
        let buffer = self
            .repos
            .buffers
            .find_by_id(buffer_id)?
            .ok_or_else(|| RepositoryError::not_found("InventoryBuffer", buffer_id))?;
        self.review(&buffer, now)
    }

    fn review(&self, buffer: &InventoryBuffer, now: NaiveDateTime) -> RepositoryResult<ReviewResult> {
        let today = now.date();

        // 先刷新在区天数, 再判定
        let current = apply_mutations(
            buffer,
            &[BufferMutation::RefreshOccupancy],
            self.updater.classifier(),
            now,
        )?;

        let profile = self
            .repos
            .profiles
            .find_profile(&current.product_id, &current.location_id)?;
        let factors = match self.config.sizing_mode {
            SizingMode::Fixed => DemandFactors::default(),
            SizingMode::DemandAdjusted => {
                let category = self
                    .repos
                    .products
                    .find_product(&current.product_id)?
                    .and_then(|p| p.category);
                self.adjuster.factors(
                    &current.product_id,
                    category.as_deref(),
                    &current.location_id,
                    today,
                )?
            }
        };

        let proposal = self.evaluate(&current, profile.as_ref(), &factors, today);
        let next_review_due = today + Duration::days(i64::from(self.config.review_period_days));

        if !proposal.is_change() {
            let updated = self.updater.apply(
                &buffer.buffer_id,
                &[BufferMutation::ScheduleReview(next_review_due)],
                now,
            )?;
            tracing::debug!(buffer_id = %buffer.buffer_id, reason = %proposal.reason, "评审结论: MAINTAIN");
            return Ok(ReviewResult {
                proposal,
                buffer: updated,
                log: None,
            });
        }

        let mut mutations = Vec::with_capacity(2);
        if !proposal.requires_approval {
            mutations.push(BufferMutation::Resize {
                buffer_units: proposal.new_buffer_units,
                buffer_days: proposal.new_buffer_days,
                expected_units: Some(proposal.old_buffer_units),
            });
        }
        mutations.push(BufferMutation::CompleteReview {
            reviewed_on: today,
            next_review_due,
            reset_zone_days: true,
        });
        let updated = self.updater.apply(&buffer.buffer_id, &mutations, now)?;

        // 日志写入失败时撤销本次评审, 缓冲回到评审前 (仍到期, 下轮重评)
        let log = self.build_log(&current, &proposal, now);
        if let Err(e) = self.repos.adjustment_logs.append_log(&log) {
            return Err(compensate(e, "append_adjustment_log", || {
                self.updater
                    .apply(&buffer.buffer_id, &revert_review(&current, &proposal), now)
                    .map(|_| ())
            }));
        }

        tracing::info!(
            buffer_id = %log.buffer_id,
            decision = %log.decision,
            old_units = log.old_buffer_units,
            new_units = log.new_buffer_units,
            approval = %log.approval_status,
            "缓冲调整已记录"
        );

        Ok(ReviewResult {
            proposal,
            buffer: updated,
            log: Some(log),
        })
    }

    fn build_log(
        &self,
        buffer: &InventoryBuffer,
        proposal: &AdjustmentProposal,
        now: NaiveDateTime,
    ) -> BufferAdjustmentLog {
        let (approval_status, approved_by, approved_at) = if proposal.requires_approval {
            (ApprovalStatus::Pending, None, None)
        } else {
            (ApprovalStatus::AutoApproved, Some(SYSTEM_APPROVER.to_string()), Some(now))
        };

        BufferAdjustmentLog {
            log_id: Uuid::new_v4().to_string(),
            buffer_id: buffer.buffer_id.clone(),
            product_id: buffer.product_id.clone(),
            location_id: buffer.location_id.clone(),
            decision: proposal.decision,
            old_buffer_units: proposal.old_buffer_units,
            new_buffer_units: proposal.new_buffer_units,
            old_buffer_days: proposal.old_buffer_days,
            new_buffer_days: proposal.new_buffer_days,
            change_percentage: proposal.change_percentage,
            adjustment_factor: proposal.adjustment_factor,
            trigger_reason: proposal.reason.clone(),
            consecutive_days_in_zone: buffer.consecutive_zone_days,
            zone_when_triggered: buffer.current_zone,
            system_recommended: true,
            requires_approval: proposal.requires_approval,
            approval_status,
            approved_by,
            approved_at,
            created_at: now,
        }
    }

    // ==========================================
    // 审批
    // ==========================================

    /// 批准待审批调整: 应用新尺寸 (要求缓冲尺寸未漂移), 记录审批结果
    #[instrument(skip(self), fields(log_id = %log_id))]
    pub fn approve_adjustment(
        &self,
        log_id: &str,
        approver: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<(BufferAdjustmentLog, InventoryBuffer)> {
        let log = self.pending_log(log_id, ApprovalStatus::Approved)?;

        let buffer = self.updater.apply(
            &log.buffer_id,
            &[BufferMutation::Resize {
                buffer_units: log.new_buffer_units,
                buffer_days: log.new_buffer_days,
                expected_units: Some(log.old_buffer_units),
            }],
            now,
        )?;
        // 审批结果未落库时恢复原尺寸, 日志保持 PENDING 可再次审批
        if let Err(e) = self
            .repos
            .adjustment_logs
            .record_approval(log_id, ApprovalStatus::Approved, approver, now)
        {
            return Err(compensate(e, "record_approval", || {
                self.updater
                    .apply(
                        &log.buffer_id,
                        &[BufferMutation::Resize {
                            buffer_units: log.old_buffer_units,
                            buffer_days: log.old_buffer_days,
                            expected_units: Some(log.new_buffer_units),
                        }],
                        now,
                    )
                    .map(|_| ())
            }));
        }

        let log = BufferAdjustmentLog {
            approval_status: ApprovalStatus::Approved,
            approved_by: Some(approver.to_string()),
            approved_at: Some(now),
            ..log
        };
        tracing::info!(log_id, approver, buffer_id = %buffer.buffer_id, "缓冲调整已批准并生效");
        Ok((log, buffer))
    }

    /// 驳回待审批调整 (缓冲尺寸不变)
    #[instrument(skip(self), fields(log_id = %log_id))]
    pub fn reject_adjustment(
        &self,
        log_id: &str,
        approver: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<BufferAdjustmentLog> {
        let log = self.pending_log(log_id, ApprovalStatus::Rejected)?;
        self.repos
            .adjustment_logs
            .record_approval(log_id, ApprovalStatus::Rejected, approver, now)?;

        tracing::info!(log_id, approver, "缓冲调整已驳回");
        Ok(BufferAdjustmentLog {
            approval_status: ApprovalStatus::Rejected,
            approved_by: Some(approver.to_string()),
            approved_at: Some(now),
            ..log
        })
    }

    fn pending_log(&self, log_id: &str, to: ApprovalStatus) -> RepositoryResult<BufferAdjustmentLog> {
        let log = self
            .repos
            .adjustment_logs
            .find_log(log_id)?
            .ok_or_else(|| RepositoryError::not_found("BufferAdjustmentLog", log_id))?;
        if log.approval_status != ApprovalStatus::Pending {
            return Err(RepositoryError::InvalidStateTransition {
                from: log.approval_status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(log)
    }
}

/// 评审落库的逆操作: 恢复尺寸 (若已生效) 与评审记账
fn revert_review(before: &InventoryBuffer, proposal: &AdjustmentProposal) -> Vec<BufferMutation> {
    let mut mutations = Vec::with_capacity(2);
    if !proposal.requires_approval {
        mutations.push(BufferMutation::Resize {
            buffer_units: proposal.old_buffer_units,
            buffer_days: proposal.old_buffer_days,
            expected_units: Some(proposal.new_buffer_units),
        });
    }
    mutations.push(BufferMutation::RevertReview {
        last_review_date: before.last_review_date,
        next_review_due: before.next_review_due,
        current_zone: before.current_zone,
        zone_entered_on: before.zone_entered_on,
    });
    mutations
}
