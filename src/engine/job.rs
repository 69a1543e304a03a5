// ==========================================
// 库存缓冲补货系统 - 批处理作业控制
// ==========================================
// 职责: 作业上下文 (取消/截止时间) + 作用范围 + 汇总 + 单元结果分类
// 红线: 取消与截止只在页与页之间检查, 不打断单元处理
// ==========================================

use crate::repository::error::RepositoryError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

// ==========================================
// JobKind - 作业类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    ProfileRecompute,
    QueueGeneration,
    BufferReview,
    OrderConsumption,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ProfileRecompute => "PROFILE_RECOMPUTE",
            JobKind::QueueGeneration => "QUEUE_GENERATION",
            JobKind::BufferReview => "BUFFER_REVIEW",
            JobKind::OrderConsumption => "ORDER_CONSUMPTION",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// JobScope - 作用范围
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JobScope {
    #[default]
    All,
    Pair {
        product_id: String,
        location_id: String,
    },
}

impl JobScope {
    pub fn pair(product_id: impl Into<String>, location_id: impl Into<String>) -> Self {
        JobScope::Pair {
            product_id: product_id.into(),
            location_id: location_id.into(),
        }
    }
}

// ==========================================
// CancellationFlag - 协作式取消标志
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// JobContext - 作业上下文
// ==========================================
#[derive(Debug, Clone)]
pub struct JobContext {
    pub run_id: String,
    /// 业务时间 (ADC 窗口、评审日期、生成时间均以此为准)
    pub as_of: NaiveDateTime,
    pub cancel: CancellationFlag,
    pub deadline: Option<Instant>,
}

impl JobContext {
    pub fn new(as_of: NaiveDateTime) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            as_of,
            cancel: CancellationFlag::new(),
            deadline: None,
        }
    }

    /// 以当前本地时间为业务时间
    pub fn now() -> Self {
        Self::new(chrono::Local::now().naive_local())
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// 派生子作业上下文: 新 run_id, 共享业务时间、取消标志与截止时间
    pub fn child(&self) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.as_of.date()
    }

    /// 是否应在下一页之前停止
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

// ==========================================
// SkipReason / UnitOutcome - 单元结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    MissingProfile,
    MissingProduct,
    InactiveProduct,
    NotDueForReview,
    Superseded,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingProfile => "MISSING_PROFILE",
            SkipReason::MissingProduct => "MISSING_PRODUCT",
            SkipReason::InactiveProduct => "INACTIVE_PRODUCT",
            SkipReason::NotDueForReview => "NOT_DUE_FOR_REVIEW",
            SkipReason::Superseded => "SUPERSEDED",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 单个处理单元的结果
#[derive(Debug)]
pub enum UnitOutcome {
    /// 已有记录被更新 (画像 upsert / 缓冲调整 / 队列项状态变化)
    Updated,
    /// 新记录被创建 (队列项 / 订单 / 调整日志)
    Created,
    /// 未变更 (例如评审结论为 MAINTAIN、MONITOR 项保持待处理)
    Unchanged,
    Skipped(SkipReason),
    Failed(RepositoryError),
}

// ==========================================
// JobSummary - 作业汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job: JobKind,
    pub run_id: String,
    /// 已处理单元数 (含 skip 与 error)
    pub processed: usize,
    pub updated: usize,
    pub created: usize,
    pub skipped: usize,
    pub errors: usize,
    /// 是否因取消/截止时间提前结束
    pub interrupted: bool,
}

impl JobSummary {
    pub fn new(job: JobKind, run_id: impl Into<String>) -> Self {
        Self {
            job,
            run_id: run_id.into(),
            processed: 0,
            updated: 0,
            created: 0,
            skipped: 0,
            errors: 0,
            interrupted: false,
        }
    }

    /// 记录单元结果
    pub fn record(&mut self, outcome: &UnitOutcome) {
        self.processed += 1;
        match outcome {
            UnitOutcome::Updated => self.updated += 1,
            UnitOutcome::Created => self.created += 1,
            UnitOutcome::Unchanged => {}
            UnitOutcome::Skipped(_) => self.skipped += 1,
            UnitOutcome::Failed(_) => self.errors += 1,
        }
    }

    /// 成功单元数 (不含 skip / error)
    pub fn succeeded(&self) -> usize {
        self.processed - self.skipped - self.errors
    }
}

// ==========================================
// JobError - 作业级错误
// ==========================================
#[derive(Error, Debug)]
pub enum JobError {
    /// 作业无法继续 (例如分页读取失败); summary 为失败前的部分计数
    #[error("作业失败 ({}, run_id={}): {message}", .summary.job, .summary.run_id)]
    Fatal {
        summary: JobSummary,
        message: String,
    },
}

impl JobError {
    pub fn fatal(summary: JobSummary, err: &RepositoryError) -> Self {
        JobError::Fatal {
            summary,
            message: err.to_string(),
        }
    }

    pub fn summary(&self) -> &JobSummary {
        match self {
            JobError::Fatal { summary, .. } => summary,
        }
    }
}

pub type JobResult = Result<JobSummary, JobError>;

/// 记录单元结果并按类型打点
pub(crate) fn record_outcome(
    summary: &mut JobSummary,
    unit_key: &str,
    outcome: UnitOutcome,
) {
    match &outcome {
        UnitOutcome::Skipped(reason) => {
            tracing::info!(job = %summary.job, run_id = %summary.run_id, unit = unit_key, reason = %reason, "跳过处理单元");
        }
        UnitOutcome::Failed(err) => {
            tracing::error!(job = %summary.job, run_id = %summary.run_id, unit = unit_key, error = %err, "处理单元失败, 继续批处理");
        }
        _ => {}
    }
    summary.record(&outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_summary_counts() {
        let mut s = JobSummary::new(JobKind::QueueGeneration, "run-1");
        s.record(&UnitOutcome::Created);
        s.record(&UnitOutcome::Skipped(SkipReason::MissingProfile));
        s.record(&UnitOutcome::Failed(RepositoryError::LockError("busy".to_string())));
        s.record(&UnitOutcome::Unchanged);

        assert_eq!(s.processed, 4);
        assert_eq!(s.created, 1);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.errors, 1);
        assert_eq!(s.succeeded(), 2);
    }

    #[test]
    fn test_context_stops_on_cancel_or_deadline() {
        let as_of = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let flag = CancellationFlag::new();
        let ctx = JobContext::new(as_of).with_cancellation(flag.clone());
        assert!(!ctx.should_stop());
        flag.cancel();
        assert!(ctx.should_stop());

        let expired = JobContext::new(as_of).with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(expired.should_stop());
    }

    #[test]
    fn test_child_context_gets_new_run_id_and_shares_cancel() {
        let as_of = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let flag = CancellationFlag::new();
        let parent = JobContext::new(as_of).with_cancellation(flag.clone());
        let a = parent.child();
        let b = parent.child();
        assert_ne!(a.run_id, parent.run_id);
        assert_ne!(a.run_id, b.run_id);
        assert_eq!(a.as_of, parent.as_of);

        assert!(!a.should_stop());
        flag.cancel();
        assert!(a.should_stop());
        assert!(b.should_stop());
    }

    #[test]
    fn test_fatal_error_keeps_partial_counts() {
        let mut s = JobSummary::new(JobKind::BufferReview, "run-2");
        s.record(&UnitOutcome::Updated);
        let err = JobError::fatal(s, &RepositoryError::DatabaseConnectionError("down".to_string()));
        assert_eq!(err.summary().updated, 1);
        assert!(err.to_string().contains("BUFFER_REVIEW"));
    }
}
