// ==========================================
// 库存缓冲补货系统 - 需求因子仓储
// ==========================================
// 职责: seasonality_adjustment / special_event 的读取与维护
// 说明: 季节因子先按产品匹配, 无命中再按品类匹配
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::master::{SeasonalityAdjustment, SpecialEvent};
use crate::engine::ports::{EventReader, SeasonalityReader};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_date, parse_date};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct DemandFactorRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DemandFactorRepository {
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

    /// 写入季节性调整; product_id 与 category 至少一个非空
    pub fn insert_seasonality(&self, s: &SeasonalityAdjustment) -> RepositoryResult<()> {
        if s.product_id.is_none() && s.category.is_none() {
            return Err(RepositoryError::ValidationError(
                "季节性调整必须指定 product_id 或 category".to_string(),
            ));
        }
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO seasonality_adjustment (product_id, category, location_id, month, factor)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![s.product_id, s.category, s.location_id, s.month, s.factor],
        )?;
        Ok(())
    }

    pub fn upsert_event(&self, e: &SpecialEvent) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO special_event (
                event_id, product_id, location_id, start_date, end_date, change_factor, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(event_id) DO UPDATE SET
                product_id = excluded.product_id,
                location_id = excluded.location_id,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                change_factor = excluded.change_factor,
                is_active = excluded.is_active
            "#,
            params![
                e.event_id,
                e.product_id,
                e.location_id,
                fmt_date(e.start_date),
                fmt_date(e.end_date),
                e.change_factor,
                e.is_active
            ],
        )?;
        Ok(())
    }

    /// 按产品匹配季节因子, 无命中时按品类匹配
    pub fn lookup_seasonality(
        &self,
        product_id: &str,
        category: Option<&str>,
        location_id: &str,
        month: u32,
    ) -> RepositoryResult<Option<f64>> {
        let conn = self.get_conn()?;
        let by_product: Option<f64> = conn
            .query_row(
                r#"
                SELECT factor FROM seasonality_adjustment
                WHERE product_id = ?1 AND location_id = ?2 AND month = ?3
                ORDER BY id DESC LIMIT 1
                "#,
                params![product_id, location_id, month],
                |row| row.get(0),
            )
            .optional()?;
        if by_product.is_some() {
            return Ok(by_product);
        }

        let Some(category) = category else {
            return Ok(None);
        };
        let by_category = conn
            .query_row(
                r#"
                SELECT factor FROM seasonality_adjustment
                WHERE product_id IS NULL AND category = ?1 AND location_id = ?2 AND month = ?3
                ORDER BY id DESC LIMIT 1
                "#,
                params![category, location_id, month],
                |row| row.get(0),
            )
            .optional()?;
        Ok(by_category)
    }

    /// 覆盖 date 的有效活动 (start_date ≤ date ≤ end_date)
    pub fn list_events_covering(
        &self,
        product_id: &str,
        location_id: &str,
        date: NaiveDate,
    ) -> RepositoryResult<Vec<SpecialEvent>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT event_id, product_id, location_id, start_date, end_date, change_factor, is_active
            FROM special_event
            WHERE product_id = ?1 AND location_id = ?2 AND is_active = 1
              AND start_date <= ?3 AND end_date >= ?3
            ORDER BY event_id
            "#,
        )?;
        let events = stmt
            .query_map(params![product_id, location_id, fmt_date(date)], |row| {
                Ok(SpecialEvent {
                    event_id: row.get(0)?,
                    product_id: row.get(1)?,
                    location_id: row.get(2)?,
                    start_date: parse_date(3, &row.get::<_, String>(3)?)?,
                    end_date: parse_date(4, &row.get::<_, String>(4)?)?,
                    change_factor: row.get(5)?,
                    is_active: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

impl SeasonalityReader for DemandFactorRepository {
    fn find_seasonality_factor(
        &self,
        product_id: &str,
        category: Option<&str>,
        location_id: &str,
        month: u32,
    ) -> RepositoryResult<Option<f64>> {
        self.lookup_seasonality(product_id, category, location_id, month)
    }
}

impl EventReader for DemandFactorRepository {
    fn find_active_events(
        &self,
        product_id: &str,
        location_id: &str,
        date: NaiveDate,
    ) -> RepositoryResult<Vec<SpecialEvent>> {
        self.list_events_covering(product_id, location_id, date)
    }
}
