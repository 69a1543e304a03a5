// ==========================================
// 库存缓冲补货系统 - 补货队列消费者
// ==========================================
// 职责: 将 PENDING 的 ORDER/EXPEDITE 队列项转为补货订单, 维护在途量
// 输入: replenishment_queue (按 priority_score 降序)
// 输出: replenishment_order + 缓冲在途量变更
// 红线: 同一缓冲只处理最新生成的队列项, 更早的 PENDING 项置为 CANCELED
//       订单取消必须对称扣减在途量并取消队列项
//       多步写入任一步失败都撤销已完成的步骤 (PROCESSED ⇔ 订单存在且已计入在途)
// ==========================================

use crate::config::DbmConfig;
use crate::domain::buffer::InventoryBuffer;
use crate::domain::replenishment::{ReplenishmentOrder, ReplenishmentQueueItem};
use crate::domain::types::{OrderStatus, QueueStatus};
use crate::engine::buffer_updater::{compensate, BufferMutation, BufferUpdater};
use crate::engine::job::{
    record_outcome, JobContext, JobError, JobKind, JobResult, JobSummary, SkipReason, UnitOutcome,
};
use crate::engine::repositories::DbmRepositories;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use tracing::instrument;
use uuid::Uuid;

pub struct ReplenishmentOrderConsumer {
    repos: DbmRepositories,
    updater: BufferUpdater,
    page_size: usize,
}

impl ReplenishmentOrderConsumer {
    pub fn new(repos: DbmRepositories, config: &DbmConfig) -> Self {
        let updater = BufferUpdater::from_config(repos.buffers.clone(), config);
        Self {
            repos,
            updater,
            page_size: config.page_size.max(1),
        }
    }

    /// 消费全部 PENDING 队列项
    ///
    /// 已处理/已取消的项离开 PENDING 集合, 因此下一页的偏移量
    /// 只累计仍保持 PENDING 的项 (MONITOR 与失败项)
    ///
    /// 计数口径: 生成订单 → created; 被替代 → skipped; MONITOR → 不计
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub fn run(&self, ctx: &JobContext) -> JobResult {
        let mut summary = JobSummary::new(JobKind::OrderConsumption, ctx.run_id.clone());
        let mut left_pending: usize = 0;

        loop {
            if ctx.should_stop() {
                summary.interrupted = true;
                tracing::warn!(run_id = %summary.run_id, processed = summary.processed, "队列消费被取消或超时");
                break;
            }

            let page = match self.repos.queue.list_by_status_page(
                QueueStatus::Pending,
                left_pending,
                self.page_size,
            ) {
                Ok(p) => p,
                Err(e) => return Err(JobError::fatal(summary, &e)),
            };
            if page.is_empty() {
                break;
            }

            for item in &page {
                let outcome = match self.consume(item, ctx) {
                    Ok(o) => o,
                    Err(e) => UnitOutcome::Failed(e),
                };
                // 撤销失败的项已离开 PENDING, 不计入偏移
                let stays_pending = match &outcome {
                    UnitOutcome::Unchanged => true,
                    UnitOutcome::Failed(RepositoryError::DatabaseTransactionError(_)) => false,
                    UnitOutcome::Failed(_) => true,
                    _ => false,
                };
                if stays_pending {
                    left_pending += 1;
                }
                record_outcome(&mut summary, &item.queue_item_id, outcome);
            }
        }

        tracing::info!(
            run_id = %summary.run_id,
            processed = summary.processed,
            orders_created = summary.created,
            superseded = summary.skipped,
            errors = summary.errors,
            "补货队列消费完成"
        );
        Ok(summary)
    }

    fn consume(&self, item: &ReplenishmentQueueItem, ctx: &JobContext) -> RepositoryResult<UnitOutcome> {
        let latest = self
            .repos
            .queue
            .find_latest_for_buffer(&item.buffer_id)?;
        if let Some(latest) = latest {
            if latest.queue_item_id != item.queue_item_id {
                self.repos.queue.transition_status(
                    &item.queue_item_id,
                    QueueStatus::Pending,
                    QueueStatus::Canceled,
                    ctx.as_of,
                )?;
                tracing::debug!(
                    queue_item_id = %item.queue_item_id,
                    superseded_by = %latest.queue_item_id,
                    "队列项已被更新的快照替代"
                );
                return Ok(UnitOutcome::Skipped(SkipReason::Superseded));
            }
        }

        if !item.recommended_action.requires_order() {
            return Ok(UnitOutcome::Unchanged);
        }

        self.create_order(item, ctx.as_of)?;
        Ok(UnitOutcome::Created)
    }

    /// 由队列项创建订单: 队列项 → PROCESSED, 订单 OPEN, 在途 += 数量
    pub fn create_order(
        &self,
        item: &ReplenishmentQueueItem,
        now: NaiveDateTime,
    ) -> RepositoryResult<ReplenishmentOrder> {
        if !item.recommended_action.requires_order() || item.recommended_qty <= 0.0 {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "队列项不需要下单: queue_item_id={}, action={}, qty={}",
                item.queue_item_id, item.recommended_action, item.recommended_qty
            )));
        }

        // 状态迁移作为占用, 防止重复下单
        self.repos.queue.transition_status(
            &item.queue_item_id,
            QueueStatus::Pending,
            QueueStatus::Processed,
            now,
        )?;

        let order = ReplenishmentOrder {
            order_id: Uuid::new_v4().to_string(),
            queue_item_id: item.queue_item_id.clone(),
            buffer_id: item.buffer_id.clone(),
            product_id: item.product_id.clone(),
            location_id: item.location_id.clone(),
            action: item.recommended_action,
            quantity: item.recommended_qty,
            status: OrderStatus::Open,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.repos.orders.insert_order(&order) {
            return Err(compensate(e, "insert_order", || {
                self.release_claim(&item.queue_item_id, now)
            }));
        }
        if let Err(e) = self.updater.apply(
            &order.buffer_id,
            &[BufferMutation::AdjustPipeline(order.quantity)],
            now,
        ) {
            return Err(compensate(e, "increase_pipeline", || {
                self.repos.orders.transition_status(
                    &order.order_id,
                    OrderStatus::Open,
                    OrderStatus::Canceled,
                    now,
                )?;
                self.release_claim(&item.queue_item_id, now)
            }));
        }

        tracing::info!(
            order_id = %order.order_id,
            buffer_id = %order.buffer_id,
            action = %order.action,
            quantity = order.quantity,
            "补货订单已创建"
        );
        Ok(order)
    }

    /// 取消订单: OPEN → CANCELED, 在途 -= 数量, 队列项 → CANCELED
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn cancel_order(
        &self,
        order_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<(ReplenishmentOrder, InventoryBuffer)> {
        let order = self.open_order(order_id, OrderStatus::Canceled)?;

        // 顺序: 订单 → 队列项 → 在途; 在途写入最后执行, 前两步可按状态回退
        self.repos
            .orders
            .transition_status(order_id, OrderStatus::Open, OrderStatus::Canceled, now)?;
        let reopen = || {
            self.repos
                .orders
                .transition_status(order_id, OrderStatus::Canceled, OrderStatus::Open, now)
        };
        if let Err(e) = self.repos.queue.transition_status(
            &order.queue_item_id,
            QueueStatus::Processed,
            QueueStatus::Canceled,
            now,
        ) {
            return Err(compensate(e, "cancel_queue_item", reopen));
        }
        let buffer = match self.updater.apply(
            &order.buffer_id,
            &[BufferMutation::AdjustPipeline(-order.quantity)],
            now,
        ) {
            Ok(b) => b,
            Err(e) => {
                return Err(compensate(e, "decrease_pipeline", || {
                    self.repos.queue.transition_status(
                        &order.queue_item_id,
                        QueueStatus::Canceled,
                        QueueStatus::Processed,
                        now,
                    )?;
                    reopen()
                }));
            }
        };

        tracing::info!(order_id, buffer_id = %buffer.buffer_id, quantity = order.quantity, "补货订单已取消");
        Ok((
            ReplenishmentOrder {
                status: OrderStatus::Canceled,
                updated_at: now,
                ..order
            },
            buffer,
        ))
    }

    /// 订单到货: OPEN → RECEIVED, 在途转在库
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn receive_order(
        &self,
        order_id: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<(ReplenishmentOrder, InventoryBuffer)> {
        let order = self.open_order(order_id, OrderStatus::Received)?;

        self.repos
            .orders
            .transition_status(order_id, OrderStatus::Open, OrderStatus::Received, now)?;
        let buffer = match self.updater.apply(
            &order.buffer_id,
            &[BufferMutation::ReceivePipeline(order.quantity)],
            now,
        ) {
            Ok(b) => b,
            Err(e) => {
                return Err(compensate(e, "receive_pipeline", || {
                    self.repos.orders.transition_status(
                        order_id,
                        OrderStatus::Received,
                        OrderStatus::Open,
                        now,
                    )
                }));
            }
        };

        tracing::info!(order_id, buffer_id = %buffer.buffer_id, zone = %buffer.current_zone, "补货订单已到货");
        Ok((
            ReplenishmentOrder {
                status: OrderStatus::Received,
                updated_at: now,
                ..order
            },
            buffer,
        ))
    }

    /// 释放占用: PROCESSED → PENDING, 下轮消费重新处理
    fn release_claim(&self, queue_item_id: &str, now: NaiveDateTime) -> RepositoryResult<()> {
        self.repos.queue.transition_status(
            queue_item_id,
            QueueStatus::Processed,
            QueueStatus::Pending,
            now,
        )
    }

    fn open_order(&self, order_id: &str, to: OrderStatus) -> RepositoryResult<ReplenishmentOrder> {
        let order = self
            .repos
            .orders
            .find_order(order_id)?
            .ok_or_else(|| RepositoryError::not_found("ReplenishmentOrder", order_id))?;
        if order.status != OrderStatus::Open {
            return Err(RepositoryError::InvalidStateTransition {
                from: order.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(order)
    }
}
