// ==========================================
// 库存缓冲补货系统 - 补货队列仓储
// ==========================================
// 职责: replenishment_queue 追加 / 查询 / 条件状态迁移
// 红线: 队列项只追加, 除状态外不修改任何计算快照字段
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::replenishment::ReplenishmentQueueItem;
use crate::domain::types::{BufferZone, QueueStatus, RecommendedAction};
use crate::engine::ports::QueueStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_datetime, parse_datetime, parse_opt_datetime};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const QUEUE_COLUMNS: &str = r#"
    queue_item_id, generation_id, buffer_id, product_id, location_id,
    zone, buffer_units, net_available_qty, buffer_gap, days_of_supply,
    lead_time_days, moq, recommended_action, recommended_qty, priority_score,
    reason_codes, status, generated_at, status_updated_at
"#;

pub struct ReplenishmentQueueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReplenishmentQueueRepository {
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

    pub fn insert_item(&self, item: &ReplenishmentQueueItem) -> RepositoryResult<()> {
        let reason_codes = serde_json::to_string(&item.reason_codes)?;
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO replenishment_queue ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                QUEUE_COLUMNS
            ),
            params![
                item.queue_item_id,
                item.generation_id,
                item.buffer_id,
                item.product_id,
                item.location_id,
                item.zone.as_str(),
                item.buffer_units,
                item.net_available_qty,
                item.buffer_gap,
                item.days_of_supply,
                item.lead_time_days,
                item.moq,
                item.recommended_action.as_str(),
                item.recommended_qty,
                item.priority_score,
                reason_codes,
                item.status.as_str(),
                fmt_datetime(item.generated_at),
                item.status_updated_at.map(fmt_datetime),
            ],
        )?;
        Ok(())
    }

    pub fn get_item(&self, queue_item_id: &str) -> RepositoryResult<Option<ReplenishmentQueueItem>> {
        let conn = self.get_conn()?;
        let item = conn
            .query_row(
                &format!(
                    "SELECT {} FROM replenishment_queue WHERE queue_item_id = ?1",
                    QUEUE_COLUMNS
                ),
                params![queue_item_id],
                map_item,
            )
            .optional()?;
        Ok(item)
    }

    /// 按状态分页 (priority_score 降序, generated_at 降序)
    pub fn list_by_status(
        &self,
        status: QueueStatus,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<Vec<ReplenishmentQueueItem>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM replenishment_queue
            WHERE status = ?1
            ORDER BY priority_score DESC, generated_at DESC, queue_item_id
            LIMIT ?2 OFFSET ?3
            "#,
            QUEUE_COLUMNS
        ))?;
        let items = stmt
            .query_map(
                params![status.as_str(), limit as i64, offset as i64],
                map_item,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// 指定缓冲最新生成的队列项 (同一时刻生成的按写入顺序取后者)
    pub fn latest_for_buffer(
        &self,
        buffer_id: &str,
    ) -> RepositoryResult<Option<ReplenishmentQueueItem>> {
        let conn = self.get_conn()?;
        let item = conn
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM replenishment_queue
                    WHERE buffer_id = ?1
                    ORDER BY generated_at DESC, rowid DESC
                    LIMIT 1
                    "#,
                    QUEUE_COLUMNS
                ),
                params![buffer_id],
                map_item,
            )
            .optional()?;
        Ok(item)
    }

    /// 条件状态迁移
    ///
    /// # 返回
    /// - Err(NotFound): 队列项不存在
    /// - Err(InvalidStateTransition): 当前状态不是 from
    pub fn update_status(
        &self,
        queue_item_id: &str,
        from: QueueStatus,
        to: QueueStatus,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE replenishment_queue SET status = ?1, status_updated_at = ?2
            WHERE queue_item_id = ?3 AND status = ?4
            "#,
            params![to.as_str(), fmt_datetime(at), queue_item_id, from.as_str()],
        )?;
        if rows == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM replenishment_queue WHERE queue_item_id = ?1",
                    params![queue_item_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match current {
                None => RepositoryError::not_found("ReplenishmentQueueItem", queue_item_id),
                Some(current) => RepositoryError::InvalidStateTransition {
                    from: current,
                    to: to.as_str().to_string(),
                },
            });
        }
        Ok(())
    }

    pub fn count_by_status(&self, status: QueueStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n = conn.query_row(
            "SELECT COUNT(*) FROM replenishment_queue WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

fn map_item(row: &Row<'_>) -> rusqlite::Result<ReplenishmentQueueItem> {
    let reason_codes_json: String = row.get(15)?;
    let reason_codes = serde_json::from_str(&reason_codes_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?;

    Ok(ReplenishmentQueueItem {
        queue_item_id: row.get(0)?,
        generation_id: row.get(1)?,
        buffer_id: row.get(2)?,
        product_id: row.get(3)?,
        location_id: row.get(4)?,
        zone: BufferZone::from_str(&row.get::<_, String>(5)?),
        buffer_units: row.get(6)?,
        net_available_qty: row.get(7)?,
        buffer_gap: row.get(8)?,
        days_of_supply: row.get(9)?,
        lead_time_days: row.get(10)?,
        moq: row.get(11)?,
        recommended_action: RecommendedAction::from_str(&row.get::<_, String>(12)?),
        recommended_qty: row.get(13)?,
        priority_score: row.get(14)?,
        reason_codes,
        status: QueueStatus::from_str(&row.get::<_, String>(16)?),
        generated_at: parse_datetime(17, &row.get::<_, String>(17)?)?,
        status_updated_at: parse_opt_datetime(18, row.get(18)?)?,
    })
}

impl QueueStore for ReplenishmentQueueRepository {
    fn append_item(&self, item: &ReplenishmentQueueItem) -> RepositoryResult<()> {
        self.insert_item(item)
    }

    fn find_item(&self, queue_item_id: &str) -> RepositoryResult<Option<ReplenishmentQueueItem>> {
        self.get_item(queue_item_id)
    }

    fn list_by_status_page(
        &self,
        status: QueueStatus,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<Vec<ReplenishmentQueueItem>> {
        self.list_by_status(status, offset, limit)
    }

    fn find_latest_for_buffer(
        &self,
        buffer_id: &str,
    ) -> RepositoryResult<Option<ReplenishmentQueueItem>> {
        self.latest_for_buffer(buffer_id)
    }

    fn transition_status(
        &self,
        queue_item_id: &str,
        from: QueueStatus,
        to: QueueStatus,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        self.update_status(queue_item_id, from, to, at)
    }
}
