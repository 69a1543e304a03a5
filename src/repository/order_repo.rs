// ==========================================
// 库存缓冲补货系统 - 补货订单仓储
// ==========================================
// 职责: replenishment_order 写入 / 查询 / 条件状态迁移
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::replenishment::ReplenishmentOrder;
use crate::domain::types::{OrderStatus, RecommendedAction};
use crate::engine::ports::OrderStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_datetime, parse_datetime};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const ORDER_COLUMNS: &str = r#"
    order_id, queue_item_id, buffer_id, product_id, location_id,
    action, quantity, status, created_at, updated_at
"#;

pub struct ReplenishmentOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReplenishmentOrderRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert(&self, o: &ReplenishmentOrder) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO replenishment_order ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                ORDER_COLUMNS
            ),
            params![
                o.order_id,
                o.queue_item_id,
                o.buffer_id,
                o.product_id,
                o.location_id,
                o.action.as_str(),
                o.quantity,
                o.status.as_str(),
                fmt_datetime(o.created_at),
                fmt_datetime(o.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, order_id: &str) -> RepositoryResult<Option<ReplenishmentOrder>> {
        let conn = self.get_conn()?;
        let order = conn
            .query_row(
                &format!(
                    "SELECT {} FROM replenishment_order WHERE order_id = ?1",
                    ORDER_COLUMNS
                ),
                params![order_id],
                map_order,
            )
            .optional()?;
        Ok(order)
    }

    /// 指定缓冲的订单, 按创建时间升序
    pub fn list_by_buffer(&self, buffer_id: &str) -> RepositoryResult<Vec<ReplenishmentOrder>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM replenishment_order WHERE buffer_id = ?1 ORDER BY created_at, order_id",
            ORDER_COLUMNS
        ))?;
        let orders = stmt
            .query_map(params![buffer_id], map_order)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    /// 条件状态迁移; 当前状态不是 from 时返回 InvalidStateTransition
    pub fn update_status(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE replenishment_order SET status = ?1, updated_at = ?2 WHERE order_id = ?3 AND status = ?4",
            params![to.as_str(), fmt_datetime(at), order_id, from.as_str()],
        )?;
        if rows == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM replenishment_order WHERE order_id = ?1",
                    params![order_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match current {
                None => RepositoryError::not_found("ReplenishmentOrder", order_id),
                Some(current) => RepositoryError::InvalidStateTransition {
                    from: current,
                    to: to.as_str().to_string(),
                },
            });
        }
        Ok(())
    }
}

fn map_order(row: &Row<'_>) -> rusqlite::Result<ReplenishmentOrder> {
    Ok(ReplenishmentOrder {
        order_id: row.get(0)?,
        queue_item_id: row.get(1)?,
        buffer_id: row.get(2)?,
        product_id: row.get(3)?,
        location_id: row.get(4)?,
        action: RecommendedAction::from_str(&row.get::<_, String>(5)?),
        quantity: row.get(6)?,
        status: OrderStatus::from_str(&row.get::<_, String>(7)?),
        created_at: parse_datetime(8, &row.get::<_, String>(8)?)?,
        updated_at: parse_datetime(9, &row.get::<_, String>(9)?)?,
    })
}

impl OrderStore for ReplenishmentOrderRepository {
    fn insert_order(&self, order: &ReplenishmentOrder) -> RepositoryResult<()> {
        self.insert(order)
    }

    fn find_order(&self, order_id: &str) -> RepositoryResult<Option<ReplenishmentOrder>> {
        self.get(order_id)
    }

    fn transition_status(
        &self,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        self.update_status(order_id, from, to, at)
    }
}
