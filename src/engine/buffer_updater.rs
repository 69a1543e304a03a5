// ==========================================
// 库存缓冲补货系统 - 缓冲统一变更入口
// ==========================================
// 职责: 所有缓冲写入的唯一入口 (apply-and-reclassify)
// 红线: 任何数量/尺寸变更都在同一次写入中重算 net / consumed% / zone
// 并发: revision 乐观锁, 冲突时重读重放, 有限重试 + 线性退避
// ==========================================

use crate::config::DbmConfig;
use crate::domain::buffer::{InventoryBuffer, ZoneThresholds};
use crate::domain::types::BufferZone;
use crate::engine::ports::BufferStore;
use crate::engine::zone_classifier::BufferZoneClassifier;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// 尺寸比较容差
const UNITS_EPSILON: f64 = 1e-6;

// ==========================================
// RetryPolicy - 持久化重试策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 25,
        }
    }
}

impl From<&DbmConfig> for RetryPolicy {
    fn from(config: &DbmConfig) -> Self {
        Self {
            max_retries: config.max_persist_retries,
            backoff_ms: config.retry_backoff_ms,
        }
    }
}

impl RetryPolicy {
    /// 执行 op; 仅对可重试错误 (乐观锁/锁等待) 重试
    pub fn run<T, F>(&self, entity_id: &str, mut op: F) -> RepositoryResult<T>
    where
        F: FnMut() -> RepositoryResult<T>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(entity_id, attempt, error = %e, "持久化冲突, 重试");
                    if self.backoff_ms > 0 {
                        std::thread::sleep(std::time::Duration::from_millis(
                            self.backoff_ms * u64::from(attempt),
                        ));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ==========================================
// BufferMutation - 缓冲变更指令
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BufferMutation {
    /// 设置在库/在途 (None 表示不改)
    SetStock {
        current_inventory: Option<f64>,
        in_pipeline_qty: Option<f64>,
    },
    /// 设置/清除外部给定的净可用量
    SetNetAvailableOverride(Option<f64>),
    /// 在途增减 (下限 0)
    AdjustPipeline(f64),
    /// 到货: 在途转在库
    ReceivePipeline(f64),
    /// 调整缓冲尺寸; expected_units 不为空时要求当前尺寸一致
    Resize {
        buffer_units: f64,
        buffer_days: i32,
        expected_units: Option<f64>,
    },
    /// 完成评审: 记录评审日、下次评审日, 可选重置在区天数
    CompleteReview {
        reviewed_on: NaiveDate,
        next_review_due: NaiveDate,
        reset_zone_days: bool,
    },
    /// 只顺延下次评审日 (评审结论为 MAINTAIN)
    ScheduleReview(NaiveDate),
    /// 撤销一次评审记账 (调整日志未能写入时)
    ///
    /// 恢复评审前的分区与进入日; 重算后分区仍一致时在区天数连续
    RevertReview {
        last_review_date: Option<NaiveDate>,
        next_review_due: Option<NaiveDate>,
        current_zone: BufferZone,
        zone_entered_on: NaiveDate,
    },
    /// 仅刷新分区与在区天数
    RefreshOccupancy,
}

// ==========================================
// NewBuffer - 新建缓冲参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBuffer {
    pub product_id: String,
    pub location_id: String,
    pub buffer_units: f64,
    pub buffer_days: i32,
    /// 为空时使用配置的默认阈值
    pub thresholds: Option<ZoneThresholds>,
    pub current_inventory: f64,
    pub in_pipeline_qty: f64,
    /// 为空时使用配置的默认门槛
    pub adjustment_threshold_days: Option<i32>,
}

// ==========================================
// BufferUpdater
// ==========================================
#[derive(Clone)]
pub struct BufferUpdater {
    store: Arc<dyn BufferStore>,
    classifier: BufferZoneClassifier,
    retry: RetryPolicy,
}

impl BufferUpdater {
    pub fn new(store: Arc<dyn BufferStore>, classifier: BufferZoneClassifier, retry: RetryPolicy) -> Self {
        Self {
            store,
            classifier,
            retry,
        }
    }

    pub fn from_config(store: Arc<dyn BufferStore>, config: &DbmConfig) -> Self {
        Self::new(
            store,
            BufferZoneClassifier::new(config.empty_buffer_zone),
            RetryPolicy::from(config),
        )
    }

    pub fn classifier(&self) -> &BufferZoneClassifier {
        &self.classifier
    }

    /// 读取-变更-条件写入; 冲突时重读重放
    ///
    /// # 错误
    /// - NotFound: 缓冲不存在
    /// - BusinessRuleViolation: Resize 的 expected_units 与当前尺寸不一致
    /// - OptimisticLockFailure: 重试耗尽
    #[instrument(skip(self, mutations), fields(buffer_id = %buffer_id, count = mutations.len()))]
    pub fn apply(
        &self,
        buffer_id: &str,
        mutations: &[BufferMutation],
        now: NaiveDateTime,
    ) -> RepositoryResult<InventoryBuffer> {
        self.retry.run(buffer_id, || {
            let current = self
                .store
                .find_by_id(buffer_id)?
                .ok_or_else(|| RepositoryError::not_found("InventoryBuffer", buffer_id))?;

            let next = apply_mutations(&current, mutations, &self.classifier, now)?;
            self.store.update_with_revision(&next, current.revision)?;
            Ok(next)
        })
    }

    /// 新建缓冲 (初始分区同样走统一判定)
    #[instrument(skip(self, req, config), fields(product_id = %req.product_id, location_id = %req.location_id))]
    pub fn create(
        &self,
        req: &NewBuffer,
        config: &DbmConfig,
        now: NaiveDateTime,
    ) -> RepositoryResult<InventoryBuffer> {
        if req.product_id.trim().is_empty() || req.location_id.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "product_id / location_id 不能为空".to_string(),
            ));
        }
        if !req.buffer_units.is_finite() || req.buffer_units < 0.0 {
            return Err(RepositoryError::FieldValueError {
                field: "buffer_units".to_string(),
                message: format!("必须为非负有限值: {}", req.buffer_units),
            });
        }
        if !req.current_inventory.is_finite() || !req.in_pipeline_qty.is_finite() {
            return Err(RepositoryError::ValidationError("库存数量必须为有限值".to_string()));
        }
        let thresholds = req.thresholds.unwrap_or(config.default_thresholds);
        if !thresholds.is_monotone() {
            return Err(RepositoryError::FieldValueError {
                field: "thresholds".to_string(),
                message: format!("阈值必须在[0,100]且 green ≥ yellow ≥ red: {:?}", thresholds),
            });
        }
        if self
            .store
            .find_by_pair(&req.product_id, &req.location_id)?
            .is_some()
        {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "缓冲已存在: product_id={}, location_id={}",
                req.product_id, req.location_id
            )));
        }

        let today = now.date();
        let mut buffer = InventoryBuffer {
            buffer_id: Uuid::new_v4().to_string(),
            product_id: req.product_id.clone(),
            location_id: req.location_id.clone(),
            buffer_units: req.buffer_units,
            buffer_days: req.buffer_days.max(0),
            thresholds,
            current_inventory: req.current_inventory,
            in_pipeline_qty: req.in_pipeline_qty.max(0.0),
            net_available_qty: 0.0,
            net_available_override: None,
            buffer_consumed_pct: 0.0,
            current_zone: config.empty_buffer_zone,
            zone_entered_on: today,
            consecutive_zone_days: 0,
            adjustment_threshold_days: req
                .adjustment_threshold_days
                .unwrap_or(config.default_adjustment_threshold_days),
            last_review_date: None,
            next_review_due: Some(today + Duration::days(i64::from(config.review_period_days))),
            is_active: true,
            revision: 1,
            created_at: now,
            updated_at: now,
        };
        reclassify(&mut buffer, &self.classifier, today);

        self.store.insert(&buffer)?;
        tracing::info!(
            buffer_id = %buffer.buffer_id,
            zone = %buffer.current_zone,
            "缓冲已创建"
        );
        Ok(buffer)
    }
}

// ==========================================
// 纯函数: 变更 + 重算
// ==========================================

/// 在内存中应用变更并重算分区 (revision +1)
pub fn apply_mutations(
    current: &InventoryBuffer,
    mutations: &[BufferMutation],
    classifier: &BufferZoneClassifier,
    now: NaiveDateTime,
) -> RepositoryResult<InventoryBuffer> {
    let today = now.date();
    let mut b = current.clone();

    for m in mutations {
        match m {
            BufferMutation::SetStock {
                current_inventory,
                in_pipeline_qty,
            } => {
                if let Some(inv) = current_inventory {
                    b.current_inventory = finite(*inv, "current_inventory")?;
                }
                if let Some(pipe) = in_pipeline_qty {
                    b.in_pipeline_qty = finite(*pipe, "in_pipeline_qty")?.max(0.0);
                }
            }
            BufferMutation::SetNetAvailableOverride(v) => {
                b.net_available_override = match v {
                    Some(x) => Some(finite(*x, "net_available_override")?),
                    None => None,
                };
            }
            BufferMutation::AdjustPipeline(delta) => {
                let delta = finite(*delta, "pipeline_delta")?;
                b.in_pipeline_qty = (b.in_pipeline_qty + delta).max(0.0);
            }
            BufferMutation::ReceivePipeline(qty) => {
                let qty = finite(*qty, "received_qty")?;
                if qty < 0.0 {
                    return Err(RepositoryError::FieldValueError {
                        field: "received_qty".to_string(),
                        message: format!("到货数量不能为负: {}", qty),
                    });
                }
                b.in_pipeline_qty = (b.in_pipeline_qty - qty).max(0.0);
                b.current_inventory += qty;
            }
            BufferMutation::Resize {
                buffer_units,
                buffer_days,
                expected_units,
            } => {
                if let Some(expected) = expected_units {
                    if (b.buffer_units - expected).abs() > UNITS_EPSILON {
                        return Err(RepositoryError::BusinessRuleViolation(format!(
                            "缓冲尺寸已变化: buffer_id={}, expected={}, actual={}",
                            b.buffer_id, expected, b.buffer_units
                        )));
                    }
                }
                let units = finite(*buffer_units, "buffer_units")?;
                if units < 0.0 {
                    return Err(RepositoryError::FieldValueError {
                        field: "buffer_units".to_string(),
                        message: format!("缓冲尺寸不能为负: {}", units),
                    });
                }
                b.buffer_units = units;
                b.buffer_days = (*buffer_days).max(0);
            }
            BufferMutation::CompleteReview {
                reviewed_on,
                next_review_due,
                reset_zone_days,
            } => {
                b.last_review_date = Some(*reviewed_on);
                b.next_review_due = Some(*next_review_due);
                if *reset_zone_days {
                    b.zone_entered_on = today;
                }
            }
            BufferMutation::ScheduleReview(next) => b.next_review_due = Some(*next),
            BufferMutation::RevertReview {
                last_review_date,
                next_review_due,
                current_zone,
                zone_entered_on,
            } => {
                b.last_review_date = *last_review_date;
                b.next_review_due = *next_review_due;
                b.current_zone = *current_zone;
                b.zone_entered_on = *zone_entered_on;
            }
            BufferMutation::RefreshOccupancy => {}
        }
    }

    reclassify(&mut b, classifier, today);
    b.revision = current.revision + 1;
    b.updated_at = now;
    Ok(b)
}

/// 多步写入的补偿
///
/// 后续步骤失败时执行 undo 撤销已完成的前序写入:
/// - undo 成功: 返回原错误 (可按原错误重试/分类)
/// - undo 失败: 返回 DatabaseTransactionError, 数据处于中间态需人工核对
pub fn compensate<F>(err: RepositoryError, step: &str, undo: F) -> RepositoryError
where
    F: FnOnce() -> RepositoryResult<()>,
{
    match undo() {
        Ok(()) => {
            tracing::warn!(step, error = %err, "写入失败, 已撤销前序步骤");
            err
        }
        Err(undo_err) => {
            tracing::error!(step, error = %err, undo_error = %undo_err, "写入失败且撤销失败");
            RepositoryError::DatabaseTransactionError(format!(
                "{} 失败: {}; 撤销失败: {}",
                step, err, undo_err
            ))
        }
    }
}

/// 重算 net / consumed% / zone / 在区天数
fn reclassify(b: &mut InventoryBuffer, classifier: &BufferZoneClassifier, today: NaiveDate) {
    b.net_available_qty = b.derived_net_available();
    let c = classifier.classify(b.buffer_units, b.net_available_qty, &b.thresholds);
    if c.zone != b.current_zone {
        b.current_zone = c.zone;
        b.zone_entered_on = today;
    }
    b.buffer_consumed_pct = c.consumed_pct;
    b.consecutive_zone_days = (today - b.zone_entered_on).num_days().max(0) as i32;
}

fn finite(v: f64, field: &str) -> RepositoryResult<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(RepositoryError::FieldValueError {
            field: field.to_string(),
            message: format!("非有限数值: {}", v),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    fn buffer() -> InventoryBuffer {
        InventoryBuffer {
            buffer_id: "B1".to_string(),
            product_id: "P1".to_string(),
            location_id: "L1".to_string(),
            buffer_units: 100.0,
            buffer_days: 10,
            thresholds: ZoneThresholds::new(80.0, 50.0, 20.0),
            current_inventory: 90.0,
            in_pipeline_qty: 0.0,
            net_available_qty: 90.0,
            net_available_override: None,
            buffer_consumed_pct: 10.0,
            current_zone: BufferZone::Green,
            zone_entered_on: at(1).date(),
            consecutive_zone_days: 0,
            adjustment_threshold_days: 7,
            last_review_date: None,
            next_review_due: None,
            is_active: true,
            revision: 3,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    #[test]
    fn test_stock_change_reclassifies_and_resets_zone_clock() {
        let c = BufferZoneClassifier::default();
        let b = apply_mutations(
            &buffer(),
            &[BufferMutation::SetStock {
                current_inventory: Some(30.0),
                in_pipeline_qty: None,
            }],
            &c,
            at(5),
        )
        .unwrap();

        assert_eq!(b.current_zone, BufferZone::Red);
        assert_eq!(b.net_available_qty, 30.0);
        assert_eq!(b.buffer_consumed_pct, 70.0);
        assert_eq!(b.zone_entered_on, at(5).date());
        assert_eq!(b.consecutive_zone_days, 0);
        assert_eq!(b.revision, 4);
    }

    #[test]
    fn test_same_zone_accumulates_days() {
        let c = BufferZoneClassifier::default();
        let b = apply_mutations(&buffer(), &[BufferMutation::RefreshOccupancy], &c, at(9)).unwrap();
        assert_eq!(b.current_zone, BufferZone::Green);
        assert_eq!(b.consecutive_zone_days, 8);
    }

    #[test]
    fn test_pipeline_floor_and_receive() {
        let c = BufferZoneClassifier::default();
        let b = apply_mutations(
            &buffer(),
            &[
                BufferMutation::AdjustPipeline(20.0),
                BufferMutation::AdjustPipeline(-50.0),
            ],
            &c,
            at(2),
        )
        .unwrap();
        assert_eq!(b.in_pipeline_qty, 0.0);

        let b = apply_mutations(
            &buffer(),
            &[
                BufferMutation::AdjustPipeline(20.0),
                BufferMutation::ReceivePipeline(15.0),
            ],
            &c,
            at(2),
        )
        .unwrap();
        assert_eq!(b.in_pipeline_qty, 5.0);
        assert_eq!(b.current_inventory, 105.0);
        assert_eq!(b.net_available_qty, 110.0);
    }

    #[test]
    fn test_override_takes_precedence_and_negative_floors() {
        let c = BufferZoneClassifier::default();
        let b = apply_mutations(
            &buffer(),
            &[BufferMutation::SetNetAvailableOverride(Some(-10.0))],
            &c,
            at(2),
        )
        .unwrap();
        assert_eq!(b.net_available_qty, 0.0);
        assert_eq!(b.current_zone, BufferZone::Critical);
    }

    #[test]
    fn test_resize_guard_rejects_drift() {
        let c = BufferZoneClassifier::default();
        let err = apply_mutations(
            &buffer(),
            &[BufferMutation::Resize {
                buffer_units: 133.0,
                buffer_days: 14,
                expected_units: Some(90.0),
            }],
            &c,
            at(2),
        )
        .unwrap_err();
        assert!(matches!(err, RepositoryError::BusinessRuleViolation(_)));
    }

    #[test]
    fn test_resize_to_zero_uses_empty_zone_policy() {
        let c = BufferZoneClassifier::new(BufferZone::Unknown);
        let b = apply_mutations(
            &buffer(),
            &[BufferMutation::Resize {
                buffer_units: 0.0,
                buffer_days: 0,
                expected_units: None,
            }],
            &c,
            at(2),
        )
        .unwrap();
        assert_eq!(b.current_zone, BufferZone::Unknown);
        assert_eq!(b.buffer_consumed_pct, 0.0);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let c = BufferZoneClassifier::default();
        let err = apply_mutations(&buffer(), &[BufferMutation::AdjustPipeline(f64::NAN)], &c, at(2));
        assert!(matches!(err, Err(RepositoryError::FieldValueError { .. })));
    }

    #[test]
    fn test_retry_policy_retries_only_transient_errors() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_ms: 0,
        };
        let mut calls = 0;
        let result: RepositoryResult<()> = policy.run("B1", || {
            calls += 1;
            Err(RepositoryError::LockError("busy".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);

        let mut calls = 0;
        let result: RepositoryResult<()> = policy.run("B1", || {
            calls += 1;
            Err(RepositoryError::not_found("InventoryBuffer", "B1"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_compensate_keeps_original_error_when_undo_succeeds() {
        let mut undone = false;
        let err = compensate(RepositoryError::LockError("busy".to_string()), "insert_order", || {
            undone = true;
            Ok(())
        });
        assert!(undone);
        assert!(err.is_retryable());

        let err = compensate(RepositoryError::LockError("busy".to_string()), "insert_order", || {
            Err(RepositoryError::not_found("ReplenishmentQueueItem", "Q1"))
        });
        assert!(matches!(err, RepositoryError::DatabaseTransactionError(_)));
        assert!(!err.is_retryable());
    }
}
