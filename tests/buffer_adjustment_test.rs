// ==========================================
// 缓冲动态调整集成测试
// ==========================================
// 测试目标: 持续在区 → 扩大/缩小, 门槛/锁定期 → 维持, 审批流
// ==========================================


use dbm_replenishment::api::ApiError;
use dbm_replenishment::config::{ApprovalPolicy, DbmConfig};
use dbm_replenishment::domain::types::{AdjustmentDecision, ApprovalStatus, BufferZone};
use dbm_replenishment::engine::{JobContext, JobScope};
use dbm_replenishment::logging;
use dbm_replenishment::repository::AdjustmentLogRepository;
use std::sync::Arc;
use test_helpers::{api_with, at, date, FailingLogStore, TestEnv};

fn failing_logs(env: &TestEnv, fail_append: bool, fail_approval: bool) -> Arc<FailingLogStore> {
    Arc::new(FailingLogStore {
        inner: AdjustmentLogRepository::from_connection(env.conn.clone()),
        fail_append,
        fail_approval,
    })
}

#[test]
fn test_sustained_red_needs_approval_then_applies() {
    logging::init_test();
    let env = TestEnv::new(DbmConfig::default());
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));
    env.seed_profile("P1", "L1", 10.0, at(2024, 3, 1));
    assert_eq!(buffer.current_zone, BufferZone::Red);

    // 第 9 天: 在区 9 天 ≥ 门槛 7, +33% 超过审批阈值 20%
    let result = env.api.adjust_buffer(&buffer.buffer_id, at(2024, 3, 10)).unwrap();
    assert_eq!(result.proposal.decision, AdjustmentDecision::IncreaseBuffer);
    assert_eq!(result.proposal.new_buffer_units, 133.0);
    assert_eq!(result.proposal.new_buffer_days, 14);
    assert!(result.proposal.requires_approval);

    // 审批前尺寸不变, 评审记账已生效
    assert_eq!(result.buffer.buffer_units, 100.0);
    assert_eq!(result.buffer.last_review_date, Some(date(2024, 3, 10)));
    assert_eq!(result.buffer.next_review_due, Some(date(2024, 3, 17)));
    assert_eq!(result.buffer.consecutive_zone_days, 0);

    let log = result.log.unwrap();
    assert_eq!(log.approval_status, ApprovalStatus::Pending);
    assert_eq!(log.consecutive_days_in_zone, 9);
    assert_eq!(log.zone_when_triggered, BufferZone::Red);

    let (approved, resized) = env
        .api
        .approve_adjustment(&log.log_id, "planner-01", at(2024, 3, 11))
        .unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert_eq!(approved.approved_by.as_deref(), Some("planner-01"));
    assert_eq!(resized.buffer_units, 133.0);
    assert_eq!(resized.buffer_days, 14);

    // 已审批的日志不能再次审批
    assert!(matches!(
        env.api.reject_adjustment(&log.log_id, "planner-02", at(2024, 3, 12)),
        Err(ApiError::InvalidStateTransition { .. })
    ));

    let history = env.api.list_adjustment_history(&buffer.buffer_id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].approval_status, ApprovalStatus::Approved);
}

#[test]
fn test_reject_keeps_size() {
    logging::init_test();
    let env = TestEnv::new(DbmConfig::default());
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));

    let result = env.api.adjust_buffer(&buffer.buffer_id, at(2024, 3, 10)).unwrap();
    let log = result.log.unwrap();
    // 无画像时天数不变
    assert_eq!(log.new_buffer_days, 10);

    let rejected = env
        .api
        .reject_adjustment(&log.log_id, "planner-01", at(2024, 3, 11))
        .unwrap();
    assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
    assert_eq!(env.api.get_buffer(&buffer.buffer_id).unwrap().buffer_units, 100.0);
}

#[test]
fn test_approval_fails_when_size_drifted() {
    logging::init_test();
    let env = TestEnv::new(DbmConfig::default());
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));
    let log = env
        .api
        .adjust_buffer(&buffer.buffer_id, at(2024, 3, 10))
        .unwrap()
        .log
        .unwrap();

    // 另一条已自动生效的调整改变了尺寸
    let auto = DbmConfig {
        approval_threshold_pct: 50.0,
        lock_cycles: 0,
        ..DbmConfig::default()
    };
    let env2 = TestEnv::with_conn(env.conn.clone(), auto);
    let result = env2.api.adjust_buffer(&buffer.buffer_id, at(2024, 3, 20)).unwrap();
    assert!(!result.proposal.requires_approval);
    assert_eq!(result.buffer.buffer_units, 133.0);

    assert!(matches!(
        env.api.approve_adjustment(&log.log_id, "planner-01", at(2024, 3, 21)),
        Err(ApiError::BusinessRuleViolation(_))
    ));
}

#[test]
fn test_sustained_green_auto_decrease() {
    logging::init_test();
    let config = DbmConfig {
        approval_threshold_pct: 40.0,
        ..DbmConfig::default()
    };
    let env = TestEnv::new(config);
    let buffer = env.seed_buffer("P1", "L1", 95.0, at(2024, 3, 1));
    env.seed_profile("P1", "L1", 5.0, at(2024, 3, 1));
    assert_eq!(buffer.current_zone, BufferZone::Green);

    let summary = env
        .api
        .run_buffer_review(&JobContext::new(at(2024, 3, 10)), &JobScope::All)
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.updated, 1);

    let after = env.api.get_buffer(&buffer.buffer_id).unwrap();
    assert_eq!(after.buffer_units, 67.0);
    assert_eq!(after.buffer_days, 14);

    let history = env.api.list_adjustment_history(&buffer.buffer_id).unwrap();
    assert_eq!(history[0].decision, AdjustmentDecision::DecreaseBuffer);
    assert_eq!(history[0].approval_status, ApprovalStatus::AutoApproved);
    assert_eq!(history[0].approved_by.as_deref(), Some("SYSTEM"));
}

#[test]
fn test_below_threshold_only_reschedules() {
    logging::init_test();
    let env = TestEnv::new(DbmConfig::default());
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));

    let result = env.api.adjust_buffer(&buffer.buffer_id, at(2024, 3, 4)).unwrap();
    assert_eq!(result.proposal.decision, AdjustmentDecision::Maintain);
    assert!(result.proposal.reason.starts_with("BELOW_THRESHOLD_DAYS"));
    assert!(result.log.is_none());
    assert_eq!(result.buffer.next_review_due, Some(date(2024, 3, 11)));
    assert_eq!(result.buffer.last_review_date, None);
    assert!(env.api.list_adjustment_history(&buffer.buffer_id).unwrap().is_empty());
}

#[test]
fn test_locked_after_adjustment() {
    logging::init_test();
    let config = DbmConfig {
        approval_policy: ApprovalPolicy::ZoneBased,
        ..DbmConfig::default()
    };
    let env = TestEnv::new(config);
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));
    env.api.adjust_buffer(&buffer.buffer_id, at(2024, 3, 10)).unwrap();

    // 锁定期 = 3/10 + 7 × 6 天
    let result = env.api.adjust_buffer(&buffer.buffer_id, at(2024, 4, 1)).unwrap();
    assert_eq!(result.proposal.decision, AdjustmentDecision::Maintain);
    assert_eq!(result.proposal.reason, "LOCKED_UNTIL: 2024-04-21");
}

#[test]
fn test_review_job_skips_buffers_not_due() {
    logging::init_test();
    let env = TestEnv::new(DbmConfig::default());
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));

    // next_review_due = 3/8
    let early = env
        .api
        .run_buffer_review(&JobContext::new(at(2024, 3, 5)), &JobScope::All)
        .unwrap();
    assert_eq!(early.processed, 0);

    let scoped = env
        .api
        .run_buffer_review(&JobContext::new(at(2024, 3, 5)), &JobScope::pair("P1", "L1"))
        .unwrap();
    assert_eq!(scoped.skipped, 1);
    assert_eq!(
        env.api.get_buffer(&buffer.buffer_id).unwrap().next_review_due,
        Some(date(2024, 3, 8))
    );
}

#[test]
fn test_log_failure_reverts_auto_applied_resize() {
    logging::init_test();
    let config = DbmConfig {
        approval_threshold_pct: 50.0,
        ..DbmConfig::default()
    };
    let env = TestEnv::new(config.clone());
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));
    env.seed_profile("P1", "L1", 10.0, at(2024, 3, 1));

    let broken = api_with(&env.conn, config, |repos| {
        repos.adjustment_logs = failing_logs(&env, true, false);
    });
    assert!(broken.adjust_buffer(&buffer.buffer_id, at(2024, 3, 10)).is_err());

    // 尺寸与评审记账都恢复, 在区天数连续
    let reverted = env.api.get_buffer(&buffer.buffer_id).unwrap();
    assert_eq!(reverted.buffer_units, 100.0);
    assert_eq!(reverted.buffer_days, 10);
    assert_eq!(reverted.current_zone, BufferZone::Red);
    assert_eq!(reverted.zone_entered_on, date(2024, 3, 1));
    assert_eq!(reverted.last_review_date, None);
    assert_eq!(reverted.next_review_due, Some(date(2024, 3, 8)));
    assert!(env.api.list_adjustment_history(&buffer.buffer_id).unwrap().is_empty());

    // 日志可写后重新评审, 尺寸与日志一并落库
    let result = env.api.adjust_buffer(&buffer.buffer_id, at(2024, 3, 10)).unwrap();
    assert_eq!(result.buffer.buffer_units, 133.0);
    assert_eq!(result.log.unwrap().approval_status, ApprovalStatus::AutoApproved);
    assert_eq!(env.api.list_adjustment_history(&buffer.buffer_id).unwrap().len(), 1);
}

#[test]
fn test_log_failure_does_not_lock_pending_proposal() {
    logging::init_test();
    let env = TestEnv::new(DbmConfig::default());
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));

    let broken = api_with(&env.conn, DbmConfig::default(), |repos| {
        repos.adjustment_logs = failing_logs(&env, true, false);
    });
    assert!(broken.adjust_buffer(&buffer.buffer_id, at(2024, 3, 10)).is_err());

    let reverted = env.api.get_buffer(&buffer.buffer_id).unwrap();
    assert_eq!(reverted.buffer_units, 100.0);
    assert_eq!(reverted.last_review_date, None);
    assert_eq!(reverted.consecutive_zone_days, 9);

    // 未进入锁定期: 下一次评审仍给出扩大提案
    let result = env.api.adjust_buffer(&buffer.buffer_id, at(2024, 3, 11)).unwrap();
    assert_eq!(result.proposal.decision, AdjustmentDecision::IncreaseBuffer);
    assert_eq!(result.log.unwrap().approval_status, ApprovalStatus::Pending);
}

#[test]
fn test_approval_record_failure_restores_size() {
    logging::init_test();
    let env = TestEnv::new(DbmConfig::default());
    let buffer = env.seed_buffer("P1", "L1", 25.0, at(2024, 3, 1));
    let log = env
        .api
        .adjust_buffer(&buffer.buffer_id, at(2024, 3, 10))
        .unwrap()
        .log
        .unwrap();

    let broken = api_with(&env.conn, DbmConfig::default(), |repos| {
        repos.adjustment_logs = failing_logs(&env, false, true);
    });
    assert!(broken
        .approve_adjustment(&log.log_id, "planner-01", at(2024, 3, 11))
        .is_err());
    assert_eq!(env.api.get_buffer(&buffer.buffer_id).unwrap().buffer_units, 100.0);
    let history = env.api.list_adjustment_history(&buffer.buffer_id).unwrap();
    assert_eq!(history[0].approval_status, ApprovalStatus::Pending);

    // 未被尺寸漂移校验卡住, 可再次批准
    let (approved, resized) = env
        .api
        .approve_adjustment(&log.log_id, "planner-01", at(2024, 3, 12))
        .unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert_eq!(resized.buffer_units, 133.0);
}
