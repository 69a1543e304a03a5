// ==========================================
// 库存缓冲补货系统 - 消耗数据仓储
// ==========================================
// 职责: consumption_history 读取 / 导入, consumption_profile UPSERT
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::consumption::{ConsumptionProfile, ConsumptionRecord};
use crate::domain::types::AdcTrend;
use crate::engine::ports::{ConsumptionHistoryReader, ProfileStore};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{
    fmt_date, fmt_datetime, parse_date, parse_datetime, parse_opt_date,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// ConsumptionRepository - 消耗流水与消耗画像仓储
// ==========================================
pub struct ConsumptionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ConsumptionRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入消耗流水 (单事务)
    ///
    /// # 返回
    /// - Ok(usize): 写入条数
    pub fn insert_records(
        &self,
        product_id: &str,
        location_id: &str,
        records: &[ConsumptionRecord],
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO consumption_history (product_id, location_id, consumption_date, quantity)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;
            for r in records {
                stmt.execute(params![
                    product_id,
                    location_id,
                    fmt_date(r.consumption_date),
                    r.quantity
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// 读取 since 及之后的消耗流水, 按日期升序
    pub fn list_history_since(
        &self,
        product_id: &str,
        location_id: &str,
        since: NaiveDate,
    ) -> RepositoryResult<Vec<ConsumptionRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT consumption_date, quantity
            FROM consumption_history
            WHERE product_id = ?1 AND location_id = ?2 AND consumption_date >= ?3
            ORDER BY consumption_date, id
            "#,
        )?;
        let records = stmt
            .query_map(params![product_id, location_id, fmt_date(since)], |row| {
                Ok(ConsumptionRecord::new(
                    parse_date(0, &row.get::<_, String>(0)?)?,
                    row.get(1)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// 写入画像 (主键冲突时整体覆盖)
    pub fn save_profile(&self, p: &ConsumptionProfile) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO consumption_profile (
                product_id, location_id, adc_7d, adc_14d, adc_30d, adc_60d,
                adc_normalized, seasonality_factor, event_factor,
                adc_trend, trend_confidence, coefficient_of_variation, std_deviation,
                data_points_used, last_consumption_date, calculation_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(product_id, location_id) DO UPDATE SET
                adc_7d = excluded.adc_7d,
                adc_14d = excluded.adc_14d,
                adc_30d = excluded.adc_30d,
                adc_60d = excluded.adc_60d,
                adc_normalized = excluded.adc_normalized,
                seasonality_factor = excluded.seasonality_factor,
                event_factor = excluded.event_factor,
                adc_trend = excluded.adc_trend,
                trend_confidence = excluded.trend_confidence,
                coefficient_of_variation = excluded.coefficient_of_variation,
                std_deviation = excluded.std_deviation,
                data_points_used = excluded.data_points_used,
                last_consumption_date = excluded.last_consumption_date,
                calculation_date = excluded.calculation_date
            "#,
            params![
                p.product_id,
                p.location_id,
                p.adc_7d,
                p.adc_14d,
                p.adc_30d,
                p.adc_60d,
                p.adc_normalized,
                p.seasonality_factor,
                p.event_factor,
                p.adc_trend.as_str(),
                p.trend_confidence,
                p.coefficient_of_variation,
                p.std_deviation,
                p.data_points_used,
                p.last_consumption_date.map(fmt_date),
                fmt_datetime(p.calculation_date),
            ],
        )?;
        Ok(())
    }

    pub fn load_profile(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<ConsumptionProfile>> {
        let conn = self.get_conn()?;
        let profile = conn
            .query_row(
                r#"
                SELECT product_id, location_id, adc_7d, adc_14d, adc_30d, adc_60d,
                       adc_normalized, seasonality_factor, event_factor,
                       adc_trend, trend_confidence, coefficient_of_variation, std_deviation,
                       data_points_used, last_consumption_date, calculation_date
                FROM consumption_profile
                WHERE product_id = ?1 AND location_id = ?2
                "#,
                params![product_id, location_id],
                map_profile,
            )
            .optional()?;
        Ok(profile)
    }
}

fn map_profile(row: &Row<'_>) -> rusqlite::Result<ConsumptionProfile> {
    Ok(ConsumptionProfile {
        product_id: row.get(0)?,
        location_id: row.get(1)?,
        adc_7d: row.get(2)?,
        adc_14d: row.get(3)?,
        adc_30d: row.get(4)?,
        adc_60d: row.get(5)?,
        adc_normalized: row.get(6)?,
        seasonality_factor: row.get(7)?,
        event_factor: row.get(8)?,
        adc_trend: AdcTrend::from_str(&row.get::<_, String>(9)?),
        trend_confidence: row.get(10)?,
        coefficient_of_variation: row.get(11)?,
        std_deviation: row.get(12)?,
        data_points_used: row.get(13)?,
        last_consumption_date: parse_opt_date(14, row.get(14)?)?,
        calculation_date: parse_datetime(15, &row.get::<_, String>(15)?)?,
    })
}

impl ConsumptionHistoryReader for ConsumptionRepository {
    fn read_history(
        &self,
        product_id: &str,
        location_id: &str,
        since: NaiveDate,
    ) -> RepositoryResult<Vec<ConsumptionRecord>> {
        self.list_history_since(product_id, location_id, since)
    }
}

impl ProfileStore for ConsumptionRepository {
    fn upsert_profile(&self, profile: &ConsumptionProfile) -> RepositoryResult<()> {
        self.save_profile(profile)
    }

    fn find_profile(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<ConsumptionProfile>> {
        self.load_profile(product_id, location_id)
    }
}
