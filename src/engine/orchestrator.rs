// ==========================================
// 库存缓冲补货系统 - 作业编排器
// ==========================================
// 用途: 组装三个周期作业 + 队列消费者, 对外提供可重复触发的入口
// 说明: 作业之间没有先后依赖, 允许一个周期的数据滞后
// ==========================================

use crate::config::DbmConfig;
use crate::engine::buffer_adjustment::BufferAdjustmentEngine;
use crate::engine::job::{JobContext, JobError, JobKind, JobResult, JobScope};
use crate::engine::order_consumer::ReplenishmentOrderConsumer;
use crate::engine::profile_recompute::ProfileRecomputeJob;
use crate::engine::replenishment_queue::ReplenishmentQueueGenerator;
use crate::engine::repositories::DbmRepositories;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

// ==========================================
// DbmOrchestrator - 作业编排器
// ==========================================
pub struct DbmOrchestrator {
    profiles: ProfileRecomputeJob,
    queue: ReplenishmentQueueGenerator,
    review: BufferAdjustmentEngine,
    consumer: ReplenishmentOrderConsumer,
}

impl DbmOrchestrator {
    pub fn new(repos: DbmRepositories, config: DbmConfig) -> Self {
        Self {
            profiles: ProfileRecomputeJob::new(repos.clone(), &config),
            queue: ReplenishmentQueueGenerator::new(repos.clone(), config.clone()),
            review: BufferAdjustmentEngine::new(repos.clone(), config.clone()),
            consumer: ReplenishmentOrderConsumer::new(repos, &config),
        }
    }

    // ===== 触发入口 =====

    /// 重算消耗画像
    pub fn recompute_consumption_profiles(&self, ctx: &JobContext, scope: &JobScope) -> JobResult {
        self.profiles.run(ctx, scope)
    }

    /// 生成补货队列
    pub fn generate_replenishment_queue(&self, ctx: &JobContext, scope: &JobScope) -> JobResult {
        self.queue.run(ctx, scope)
    }

    /// 执行缓冲评审
    pub fn run_buffer_review(&self, ctx: &JobContext, scope: &JobScope) -> JobResult {
        self.review.run_review(ctx, scope)
    }

    /// 消费补货队列
    pub fn process_replenishment_queue(&self, ctx: &JobContext) -> JobResult {
        self.consumer.run(ctx)
    }

    pub fn run_job(&self, job: JobKind, ctx: &JobContext, scope: &JobScope) -> JobResult {
        match job {
            JobKind::ProfileRecompute => self.recompute_consumption_profiles(ctx, scope),
            JobKind::QueueGeneration => self.generate_replenishment_queue(ctx, scope),
            JobKind::BufferReview => self.run_buffer_review(ctx, scope),
            JobKind::OrderConsumption => self.process_replenishment_queue(ctx),
        }
    }

    // ===== 组件访问 =====

    pub fn adjustment_engine(&self) -> &BufferAdjustmentEngine {
        &self.review
    }

    pub fn order_consumer(&self) -> &ReplenishmentOrderConsumer {
        &self.consumer
    }

    pub fn queue_generator(&self) -> &ReplenishmentQueueGenerator {
        &self.queue
    }

    pub fn profile_job(&self) -> &ProfileRecomputeJob {
        &self.profiles
    }

    /// 并发执行三个周期作业 (各自在阻塞线程上运行, 共享取消标志与截止时间)
    ///
    /// 每个作业使用独立 run_id; 返回顺序与 jobs 一致;
    /// 某个作业线程 panic 时对应位置为 Fatal
    pub async fn run_concurrently(
        self: Arc<Self>,
        jobs: &[JobKind],
        ctx: &JobContext,
        scope: &JobScope,
    ) -> Vec<JobResult> {
        let contexts: Vec<JobContext> = jobs.iter().map(|_| ctx.child()).collect();
        let handles = jobs.iter().zip(contexts.iter()).map(|(job, child)| {
            let this = Arc::clone(&self);
            let job = *job;
            let child = child.clone();
            let scope = scope.clone();
            tokio::task::spawn_blocking(move || this.run_job(job, &child, &scope))
        });

        let joined = join_all(handles).await;

        joined
            .into_iter()
            .zip(jobs.iter().zip(contexts))
            .map(|(res, (job, child))| match res {
                Ok(r) => r,
                Err(e) => {
                    warn!(job = %job, run_id = %child.run_id, error = %e, "作业线程异常退出");
                    Err(JobError::Fatal {
                        summary: crate::engine::job::JobSummary::new(*job, child.run_id),
                        message: e.to_string(),
                    })
                }
            })
            .inspect(|r| {
                if let Ok(s) = r {
                    info!(job = %s.job, processed = s.processed, errors = s.errors, "作业完成");
                }
            })
            .collect()
    }
}

/// 三个周期作业 (不含队列消费)
pub const PERIODIC_JOBS: [JobKind; 3] = [
    JobKind::ProfileRecompute,
    JobKind::QueueGeneration,
    JobKind::BufferReview,
];
