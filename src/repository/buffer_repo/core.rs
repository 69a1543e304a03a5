use crate::domain::buffer::{InventoryBuffer, ZoneThresholds};
use crate::domain::types::BufferZone;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{
    fmt_date, fmt_datetime, parse_date, parse_datetime, parse_opt_date,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub(super) const BUFFER_COLUMNS: &str = r#"
    buffer_id, product_id, location_id, buffer_units, buffer_days,
    green_threshold_pct, yellow_threshold_pct, red_threshold_pct,
    current_inventory, in_pipeline_qty, net_available_qty, net_available_override,
    buffer_consumed_pct, current_zone, zone_entered_on, consecutive_zone_days,
    adjustment_threshold_days, last_review_date, next_review_due,
    is_active, revision, created_at, updated_at
"#;

// ==========================================
// InventoryBufferRepository - 库存缓冲仓储
// ==========================================
pub struct InventoryBufferRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryBufferRepository {
    /// 打开数据库文件创建仓储
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入新缓冲
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): buffer_id 或 (product_id, location_id) 已存在
    pub fn insert_buffer(&self, b: &InventoryBuffer) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO inventory_buffer ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                BUFFER_COLUMNS
            ),
            params![
                b.buffer_id,
                b.product_id,
                b.location_id,
                b.buffer_units,
                b.buffer_days,
                b.thresholds.green_pct,
                b.thresholds.yellow_pct,
                b.thresholds.red_pct,
                b.current_inventory,
                b.in_pipeline_qty,
                b.net_available_qty,
                b.net_available_override,
                b.buffer_consumed_pct,
                b.current_zone.as_str(),
                fmt_date(b.zone_entered_on),
                b.consecutive_zone_days,
                b.adjustment_threshold_days,
                b.last_review_date.map(fmt_date),
                b.next_review_due.map(fmt_date),
                b.is_active,
                b.revision,
                fmt_datetime(b.created_at),
                fmt_datetime(b.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 按 revision 条件更新全部可变字段, 写入后 revision = expected + 1
    ///
    /// # 返回
    /// - Err(NotFound): 缓冲不存在
    /// - Err(OptimisticLockFailure): 当前 revision 与 expected 不一致
    pub fn update_buffer(&self, b: &InventoryBuffer, expected_revision: i32) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE inventory_buffer SET
                buffer_units = ?1, buffer_days = ?2,
                green_threshold_pct = ?3, yellow_threshold_pct = ?4, red_threshold_pct = ?5,
                current_inventory = ?6, in_pipeline_qty = ?7, net_available_qty = ?8,
                net_available_override = ?9, buffer_consumed_pct = ?10, current_zone = ?11,
                zone_entered_on = ?12, consecutive_zone_days = ?13,
                adjustment_threshold_days = ?14, last_review_date = ?15, next_review_due = ?16,
                is_active = ?17, revision = ?18, updated_at = ?19
            WHERE buffer_id = ?20 AND revision = ?21
            "#,
            params![
                b.buffer_units,
                b.buffer_days,
                b.thresholds.green_pct,
                b.thresholds.yellow_pct,
                b.thresholds.red_pct,
                b.current_inventory,
                b.in_pipeline_qty,
                b.net_available_qty,
                b.net_available_override,
                b.buffer_consumed_pct,
                b.current_zone.as_str(),
                fmt_date(b.zone_entered_on),
                b.consecutive_zone_days,
                b.adjustment_threshold_days,
                b.last_review_date.map(fmt_date),
                b.next_review_due.map(fmt_date),
                b.is_active,
                expected_revision + 1,
                fmt_datetime(b.updated_at),
                b.buffer_id,
                expected_revision,
            ],
        )?;

        if rows == 0 {
            let actual: Option<i32> = conn
                .query_row(
                    "SELECT revision FROM inventory_buffer WHERE buffer_id = ?1",
                    params![b.buffer_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match actual {
                None => RepositoryError::not_found("InventoryBuffer", b.buffer_id.clone()),
                Some(actual) => RepositoryError::OptimisticLockFailure {
                    entity_id: b.buffer_id.clone(),
                    expected: expected_revision,
                    actual,
                },
            });
        }
        Ok(())
    }
}

/// 行映射 (列顺序与 BUFFER_COLUMNS 一致)
pub(super) fn map_buffer(row: &Row<'_>) -> rusqlite::Result<InventoryBuffer> {
    Ok(InventoryBuffer {
        buffer_id: row.get(0)?,
        product_id: row.get(1)?,
        location_id: row.get(2)?,
        buffer_units: row.get(3)?,
        buffer_days: row.get(4)?,
        thresholds: ZoneThresholds::new(row.get(5)?, row.get(6)?, row.get(7)?),
        current_inventory: row.get(8)?,
        in_pipeline_qty: row.get(9)?,
        net_available_qty: row.get(10)?,
        net_available_override: row.get(11)?,
        buffer_consumed_pct: row.get(12)?,
        current_zone: BufferZone::from_str(&row.get::<_, String>(13)?),
        zone_entered_on: parse_date(14, &row.get::<_, String>(14)?)?,
        consecutive_zone_days: row.get(15)?,
        adjustment_threshold_days: row.get(16)?,
        last_review_date: parse_opt_date(17, row.get(17)?)?,
        next_review_due: parse_opt_date(18, row.get(18)?)?,
        is_active: row.get(19)?,
        revision: row.get(20)?,
        created_at: parse_datetime(21, &row.get::<_, String>(21)?)?,
        updated_at: parse_datetime(22, &row.get::<_, String>(22)?)?,
    })
}
