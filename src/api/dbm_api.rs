// ==========================================
// 库存缓冲补货系统 - DBM 业务 API
// ==========================================
// 职责: 对外暴露三个周期作业触发入口 + 缓冲/订单/审批的直接操作
// 红线: API 只做参数校验与错误转换, 业务规则全部在 engine 层
// ==========================================

use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::config::DbmConfig;
use crate::domain::adjustment::BufferAdjustmentLog;
use crate::domain::buffer::InventoryBuffer;
use crate::domain::consumption::ConsumptionProfile;
use crate::domain::replenishment::{ReplenishmentOrder, ReplenishmentQueueItem};
use crate::domain::types::QueueStatus;
use crate::engine::buffer_adjustment::ReviewResult;
use crate::engine::buffer_updater::{BufferMutation, BufferUpdater, NewBuffer};
use crate::engine::job::{JobContext, JobKind, JobScope, JobSummary};
use crate::engine::orchestrator::{DbmOrchestrator, PERIODIC_JOBS};
use crate::engine::repositories::DbmRepositories;

// ==========================================
// DbmApi - DBM 业务 API
// ==========================================

/// DBM 业务API
///
/// 职责：
/// 1. 周期作业触发 (画像重算 / 队列生成 / 缓冲评审 / 队列消费)
/// 2. 缓冲建档与库存回写
/// 3. 单缓冲即时评审与调整审批
/// 4. 补货订单取消与到货
pub struct DbmApi {
    repos: DbmRepositories,
    config: DbmConfig,
    orchestrator: Arc<DbmOrchestrator>,
    updater: BufferUpdater,
}

impl DbmApi {
    pub fn new(repos: DbmRepositories, config: DbmConfig) -> Self {
        let updater = BufferUpdater::from_config(repos.buffers.clone(), &config);
        let orchestrator = Arc::new(DbmOrchestrator::new(repos.clone(), config.clone()));
        Self {
            repos,
            config,
            orchestrator,
            updater,
        }
    }

    pub fn config(&self) -> &DbmConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> Arc<DbmOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    // ==========================================
    // 作业触发
    // ==========================================

    /// 重算消耗画像
    pub fn recompute_consumption_profiles(
        &self,
        ctx: &JobContext,
        scope: &JobScope,
    ) -> ApiResult<JobSummary> {
        Ok(self.orchestrator.recompute_consumption_profiles(ctx, scope)?)
    }

    /// 生成补货队列
    pub fn generate_replenishment_queue(
        &self,
        ctx: &JobContext,
        scope: &JobScope,
    ) -> ApiResult<JobSummary> {
        Ok(self.orchestrator.generate_replenishment_queue(ctx, scope)?)
    }

    /// 执行缓冲评审
    pub fn run_buffer_review(&self, ctx: &JobContext, scope: &JobScope) -> ApiResult<JobSummary> {
        Ok(self.orchestrator.run_buffer_review(ctx, scope)?)
    }

    /// 消费补货队列 (生成订单)
    pub fn process_replenishment_queue(&self, ctx: &JobContext) -> ApiResult<JobSummary> {
        Ok(self.orchestrator.process_replenishment_queue(ctx)?)
    }

    /// 按作业类型触发
    pub fn run_job(&self, job: JobKind, ctx: &JobContext, scope: &JobScope) -> ApiResult<JobSummary> {
        Ok(self.orchestrator.run_job(job, ctx, scope)?)
    }

    /// 并发执行三个周期作业, 返回顺序与 PERIODIC_JOBS 一致
    pub async fn run_periodic_jobs(
        &self,
        ctx: &JobContext,
        scope: &JobScope,
    ) -> Vec<ApiResult<JobSummary>> {
        self.orchestrator()
            .run_concurrently(&PERIODIC_JOBS, ctx, scope)
            .await
            .into_iter()
            .map(|r| r.map_err(ApiError::from))
            .collect()
    }

    // ==========================================
    // 缓冲
    // ==========================================

    /// 新建缓冲
    ///
    /// # 返回
    /// - Err(NotFound): 产品或库位主数据不存在
    /// - Err(BusinessRuleViolation): 产品已停用或 (产品, 库位) 已有缓冲
    #[instrument(skip(self, req), fields(product_id = %req.product_id, location_id = %req.location_id))]
    pub fn create_buffer(&self, req: &NewBuffer, now: NaiveDateTime) -> ApiResult<InventoryBuffer> {
        if req.product_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("产品ID不能为空".to_string()));
        }
        if req.location_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("库位ID不能为空".to_string()));
        }

        let product = self
            .repos
            .products
            .find_product(&req.product_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Product(id={})不存在", req.product_id)))?;
        if !product.is_active {
            return Err(ApiError::BusinessRuleViolation(format!(
                "产品已停用: {}",
                req.product_id
            )));
        }
        if self.repos.locations.find_location(&req.location_id)?.is_none() {
            return Err(ApiError::NotFound(format!(
                "Location(id={})不存在",
                req.location_id
            )));
        }

        Ok(self.updater.create(req, &self.config, now)?)
    }

    pub fn get_buffer(&self, buffer_id: &str) -> ApiResult<InventoryBuffer> {
        if buffer_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("缓冲ID不能为空".to_string()));
        }
        self.repos
            .buffers
            .find_by_id(buffer_id)?
            .ok_or_else(|| ApiError::NotFound(format!("InventoryBuffer(id={})不存在", buffer_id)))
    }

    pub fn get_buffer_by_pair(&self, product_id: &str, location_id: &str) -> ApiResult<InventoryBuffer> {
        self.repos
            .buffers
            .find_by_pair(product_id, location_id)?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "InventoryBuffer(product_id={}, location_id={})不存在",
                    product_id, location_id
                ))
            })
    }

    /// 回写在库/在途 (None 表示不修改)
    pub fn update_stock(
        &self,
        buffer_id: &str,
        current_inventory: Option<f64>,
        in_pipeline_qty: Option<f64>,
        now: NaiveDateTime,
    ) -> ApiResult<InventoryBuffer> {
        if current_inventory.is_none() && in_pipeline_qty.is_none() {
            return Err(ApiError::InvalidInput("至少需要一个库存字段".to_string()));
        }
        Ok(self.updater.apply(
            buffer_id,
            &[BufferMutation::SetStock {
                current_inventory,
                in_pipeline_qty,
            }],
            now,
        )?)
    }

    /// 设置/清除外部净可用量
    pub fn set_net_available_override(
        &self,
        buffer_id: &str,
        net_available: Option<f64>,
        now: NaiveDateTime,
    ) -> ApiResult<InventoryBuffer> {
        Ok(self.updater.apply(
            buffer_id,
            &[BufferMutation::SetNetAvailableOverride(net_available)],
            now,
        )?)
    }

    pub fn get_consumption_profile(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> ApiResult<Option<ConsumptionProfile>> {
        Ok(self.repos.profiles.find_profile(product_id, location_id)?)
    }

    // ==========================================
    // 评审与审批
    // ==========================================

    /// 立即评审单个缓冲 (不看评审日)
    pub fn adjust_buffer(&self, buffer_id: &str, now: NaiveDateTime) -> ApiResult<ReviewResult> {
        if buffer_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("缓冲ID不能为空".to_string()));
        }
        Ok(self
            .orchestrator
            .adjustment_engine()
            .adjust_buffer(buffer_id, now)?)
    }

    pub fn approve_adjustment(
        &self,
        log_id: &str,
        approver: &str,
        now: NaiveDateTime,
    ) -> ApiResult<(BufferAdjustmentLog, InventoryBuffer)> {
        if approver.trim().is_empty() {
            return Err(ApiError::InvalidInput("审批人不能为空".to_string()));
        }
        Ok(self
            .orchestrator
            .adjustment_engine()
            .approve_adjustment(log_id, approver, now)?)
    }

    pub fn reject_adjustment(
        &self,
        log_id: &str,
        approver: &str,
        now: NaiveDateTime,
    ) -> ApiResult<BufferAdjustmentLog> {
        if approver.trim().is_empty() {
            return Err(ApiError::InvalidInput("审批人不能为空".to_string()));
        }
        Ok(self
            .orchestrator
            .adjustment_engine()
            .reject_adjustment(log_id, approver, now)?)
    }

    pub fn list_adjustment_history(&self, buffer_id: &str) -> ApiResult<Vec<BufferAdjustmentLog>> {
        Ok(self.repos.adjustment_logs.list_by_buffer(buffer_id)?)
    }

    // ==========================================
    // 队列与订单
    // ==========================================

    /// 待处理队列 (优先级降序)
    pub fn list_pending_queue(&self, limit: usize) -> ApiResult<Vec<ReplenishmentQueueItem>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        Ok(self
            .repos
            .queue
            .list_by_status_page(QueueStatus::Pending, 0, limit)?)
    }

    pub fn cancel_order(
        &self,
        order_id: &str,
        now: NaiveDateTime,
    ) -> ApiResult<(ReplenishmentOrder, InventoryBuffer)> {
        Ok(self.orchestrator.order_consumer().cancel_order(order_id, now)?)
    }

    pub fn receive_order(
        &self,
        order_id: &str,
        now: NaiveDateTime,
    ) -> ApiResult<(ReplenishmentOrder, InventoryBuffer)> {
        Ok(self.orchestrator.order_consumer().receive_order(order_id, now)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::master::{LocationInfo, ProductInfo};
    use crate::repository::MasterDataRepository;
    use chrono::NaiveDate;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn setup() -> (DbmApi, MasterDataRepository) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let api = DbmApi::new(DbmRepositories::sqlite(conn.clone()), DbmConfig::default());
        (api, MasterDataRepository::from_connection(conn))
    }

    fn new_buffer() -> NewBuffer {
        NewBuffer {
            product_id: "P1".to_string(),
            location_id: "L1".to_string(),
            buffer_units: 100.0,
            buffer_days: 10,
            thresholds: None,
            current_inventory: 90.0,
            in_pipeline_qty: 0.0,
            adjustment_threshold_days: None,
        }
    }

    #[test]
    fn test_create_buffer_requires_master_data() {
        let (api, master) = setup();
        assert!(matches!(
            api.create_buffer(&new_buffer(), now()),
            Err(ApiError::NotFound(_))
        ));

        master
            .upsert_product(&ProductInfo {
                product_id: "P1".to_string(),
                name: "Widget".to_string(),
                category: None,
                moq: None,
                is_active: true,
            })
            .unwrap();
        assert!(matches!(
            api.create_buffer(&new_buffer(), now()),
            Err(ApiError::NotFound(_))
        ));

        master
            .upsert_location(&LocationInfo {
                location_id: "L1".to_string(),
                name: "DC".to_string(),
                parent_location_id: None,
            })
            .unwrap();
        let buffer = api.create_buffer(&new_buffer(), now()).unwrap();
        assert_eq!(buffer.revision, 1);
        assert_eq!(api.get_buffer(&buffer.buffer_id).unwrap(), buffer);

        // 同一 (产品, 库位) 不允许重复建档
        assert!(matches!(
            api.create_buffer(&new_buffer(), now()),
            Err(ApiError::BusinessRuleViolation(_))
        ));
    }

    #[test]
    fn test_unknown_buffer_is_not_found() {
        let (api, _) = setup();
        assert!(matches!(api.get_buffer("nope"), Err(ApiError::NotFound(_))));
        assert!(matches!(api.adjust_buffer("nope", now()), Err(ApiError::NotFound(_))));
        assert!(matches!(api.adjust_buffer(" ", now()), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_stock_writeback_reclassifies() {
        let (api, master) = setup();
        master
            .upsert_product(&ProductInfo {
                product_id: "P1".to_string(),
                name: "Widget".to_string(),
                category: None,
                moq: None,
                is_active: true,
            })
            .unwrap();
        master
            .upsert_location(&LocationInfo {
                location_id: "L1".to_string(),
                name: "DC".to_string(),
                parent_location_id: None,
            })
            .unwrap();
        let buffer = api.create_buffer(&new_buffer(), now()).unwrap();
        assert_eq!(buffer.current_zone, crate::domain::types::BufferZone::Green);

        assert!(matches!(
            api.update_stock(&buffer.buffer_id, None, None, now()),
            Err(ApiError::InvalidInput(_))
        ));

        let b = api.update_stock(&buffer.buffer_id, Some(10.0), None, now()).unwrap();
        assert_eq!(b.current_zone, crate::domain::types::BufferZone::Critical);
        assert_eq!(b.revision, 2);

        // 外部净可用优先于 在库 + 在途
        let b = api
            .set_net_available_override(&buffer.buffer_id, Some(100.0), now())
            .unwrap();
        assert_eq!(b.net_available_qty, 100.0);
        assert_eq!(b.current_zone, crate::domain::types::BufferZone::Green);

        let b = api.set_net_available_override(&buffer.buffer_id, None, now()).unwrap();
        assert_eq!(b.net_available_qty, 10.0);
        assert_eq!(api.get_buffer_by_pair("P1", "L1").unwrap(), b);
        assert!(matches!(
            api.get_buffer_by_pair("P1", "L9"),
            Err(ApiError::NotFound(_))
        ));
    }
}
