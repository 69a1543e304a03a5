// ==========================================
// 库存缓冲补货系统 - 消耗画像重算作业
// ==========================================
// 职责: 遍历有效缓冲的 (产品, 库位), 整体重算并 UPSERT 消耗画像
// 输入: 消耗流水 + 季节/活动因子 + 产品品类
// 输出: consumption_profile (幂等)
// ==========================================

use crate::config::DbmConfig;
use crate::domain::buffer::InventoryBuffer;
use crate::domain::consumption::ConsumptionProfile;
use crate::engine::buffer_scan::{scan_buffers, ScanMode};
use crate::engine::consumption_signal::{ConsumptionSignalCalculator, TrendThresholds};
use crate::engine::demand_factors::SeasonalityAndEventAdjuster;
use crate::engine::job::{JobContext, JobError, JobKind, JobResult, JobScope, JobSummary, UnitOutcome};
use crate::engine::repositories::DbmRepositories;
use crate::repository::error::RepositoryResult;
use chrono::{Duration, NaiveDateTime};
use tracing::instrument;

pub struct ProfileRecomputeJob {
    repos: DbmRepositories,
    calculator: ConsumptionSignalCalculator,
    adjuster: SeasonalityAndEventAdjuster,
    history_window_days: i64,
    page_size: usize,
}

impl ProfileRecomputeJob {
    pub fn new(repos: DbmRepositories, config: &DbmConfig) -> Self {
        let adjuster =
            SeasonalityAndEventAdjuster::new(repos.seasonality.clone(), repos.events.clone());
        Self {
            repos,
            calculator: ConsumptionSignalCalculator::new(TrendThresholds::from(config)),
            adjuster,
            history_window_days: config.history_window_days.max(60),
            page_size: config.page_size,
        }
    }

    /// 执行作业
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub fn run(&self, ctx: &JobContext, scope: &JobScope) -> JobResult {
        let mut summary = JobSummary::new(JobKind::ProfileRecompute, ctx.run_id.clone());

        let scanned = scan_buffers(
            self.repos.buffers.as_ref(),
            scope,
            ScanMode::Active,
            self.page_size,
            ctx,
            &mut summary,
            |buffer| match self.recompute_for(buffer, ctx.as_of) {
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
            errors = summary.errors,
            "消耗画像重算完成"
        );
        Ok(summary)
    }

    /// 重算单个 (产品, 库位) 的画像并落库
    pub fn recompute_for(
        &self,
        buffer: &InventoryBuffer,
        as_of: NaiveDateTime,
    ) -> RepositoryResult<ConsumptionProfile> {
        let today = as_of.date();
        let since = today - Duration::days(self.history_window_days - 1);

        let records = self
            .repos
            .history
            .read_history(&buffer.product_id, &buffer.location_id, since)?;
        let signal = self.calculator.compute(&records, today);

        let category = self
            .repos
            .products
            .find_product(&buffer.product_id)?
            .and_then(|p| p.category);
        let factors = self.adjuster.factors(
            &buffer.product_id,
            category.as_deref(),
            &buffer.location_id,
            today,
        )?;

        let profile = self.calculator.build_profile(
            &buffer.product_id,
            &buffer.location_id,
            &signal,
            &factors,
            as_of,
        );
        self.repos.profiles.upsert_profile(&profile)?;

        tracing::debug!(
            product_id = %profile.product_id,
            location_id = %profile.location_id,
            adc_normalized = profile.adc_normalized,
            trend = %profile.adc_trend,
            "消耗画像已更新"
        );
        Ok(profile)
    }
}
