// ==========================================
// 库存缓冲补货系统 - 缓冲调整日志仓储
// ==========================================
// 职责: buffer_adjustment_log 追加 / 查询 / 审批结果回写
// 红线: 只追加; 唯一允许的 UPDATE 是 PENDING → APPROVED / REJECTED
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::adjustment::BufferAdjustmentLog;
use crate::domain::types::{AdjustmentDecision, ApprovalStatus, BufferZone};
use crate::engine::ports::AdjustmentLogStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_codec::{fmt_datetime, parse_datetime, parse_opt_datetime};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const LOG_COLUMNS: &str = r#"
    log_id, buffer_id, product_id, location_id, decision,
    old_buffer_units, new_buffer_units, old_buffer_days, new_buffer_days,
    change_percentage, adjustment_factor, trigger_reason,
    consecutive_days_in_zone, zone_when_triggered, system_recommended,
    requires_approval, approval_status, approved_by, approved_at, created_at
"#;

pub struct AdjustmentLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AdjustmentLogRepository {
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

    pub fn insert(&self, log: &BufferAdjustmentLog) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO buffer_adjustment_log ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                LOG_COLUMNS
            ),
            params![
                log.log_id,
                log.buffer_id,
                log.product_id,
                log.location_id,
                log.decision.as_str(),
                log.old_buffer_units,
                log.new_buffer_units,
                log.old_buffer_days,
                log.new_buffer_days,
                log.change_percentage,
                log.adjustment_factor,
                log.trigger_reason,
                log.consecutive_days_in_zone,
                log.zone_when_triggered.as_str(),
                log.system_recommended,
                log.requires_approval,
                log.approval_status.as_str(),
                log.approved_by,
                log.approved_at.map(fmt_datetime),
                fmt_datetime(log.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, log_id: &str) -> RepositoryResult<Option<BufferAdjustmentLog>> {
        let conn = self.get_conn()?;
        let log = conn
            .query_row(
                &format!(
                    "SELECT {} FROM buffer_adjustment_log WHERE log_id = ?1",
                    LOG_COLUMNS
                ),
                params![log_id],
                map_log,
            )
            .optional()?;
        Ok(log)
    }

    /// 指定缓冲的调整历史, 按时间升序
    pub fn list_for_buffer(&self, buffer_id: &str) -> RepositoryResult<Vec<BufferAdjustmentLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM buffer_adjustment_log WHERE buffer_id = ?1 ORDER BY created_at, rowid",
            LOG_COLUMNS
        ))?;
        let logs = stmt
            .query_map(params![buffer_id], map_log)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    pub fn list_pending_approval(&self) -> RepositoryResult<Vec<BufferAdjustmentLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM buffer_adjustment_log WHERE approval_status = 'PENDING' ORDER BY created_at, rowid",
            LOG_COLUMNS
        ))?;
        let logs = stmt
            .query_map([], map_log)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    /// 回写审批结果
    ///
    /// # 返回
    /// - Err(ValidationError): status 不是 APPROVED / REJECTED
    /// - Err(NotFound): 日志不存在
    /// - Err(InvalidStateTransition): 日志不在 PENDING
    pub fn update_approval(
        &self,
        log_id: &str,
        status: ApprovalStatus,
        approved_by: &str,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        if !matches!(status, ApprovalStatus::Approved | ApprovalStatus::Rejected) {
            return Err(RepositoryError::ValidationError(format!(
                "审批结果只能是 APPROVED 或 REJECTED: {}",
                status
            )));
        }

        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE buffer_adjustment_log
            SET approval_status = ?1, approved_by = ?2, approved_at = ?3
            WHERE log_id = ?4 AND approval_status = 'PENDING'
            "#,
            params![status.as_str(), approved_by, fmt_datetime(at), log_id],
        )?;
        if rows == 0 {
            let current: Option<String> = conn
                .query_row(
                    "SELECT approval_status FROM buffer_adjustment_log WHERE log_id = ?1",
                    params![log_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match current {
                None => RepositoryError::not_found("BufferAdjustmentLog", log_id),
                Some(current) => RepositoryError::InvalidStateTransition {
                    from: current,
                    to: status.as_str().to_string(),
                },
            });
        }
        Ok(())
    }
}

fn map_log(row: &Row<'_>) -> rusqlite::Result<BufferAdjustmentLog> {
    Ok(BufferAdjustmentLog {
        log_id: row.get(0)?,
        buffer_id: row.get(1)?,
        product_id: row.get(2)?,
        location_id: row.get(3)?,
        decision: AdjustmentDecision::from_str(&row.get::<_, String>(4)?),
        old_buffer_units: row.get(5)?,
        new_buffer_units: row.get(6)?,
        old_buffer_days: row.get(7)?,
        new_buffer_days: row.get(8)?,
        change_percentage: row.get(9)?,
        adjustment_factor: row.get(10)?,
        trigger_reason: row.get(11)?,
        consecutive_days_in_zone: row.get(12)?,
        zone_when_triggered: BufferZone::from_str(&row.get::<_, String>(13)?),
        system_recommended: row.get(14)?,
        requires_approval: row.get(15)?,
        approval_status: ApprovalStatus::from_str(&row.get::<_, String>(16)?),
        approved_by: row.get(17)?,
        approved_at: parse_opt_datetime(18, row.get(18)?)?,
        created_at: parse_datetime(19, &row.get::<_, String>(19)?)?,
    })
}

impl AdjustmentLogStore for AdjustmentLogRepository {
    fn append_log(&self, log: &BufferAdjustmentLog) -> RepositoryResult<()> {
        self.insert(log)
    }

    fn find_log(&self, log_id: &str) -> RepositoryResult<Option<BufferAdjustmentLog>> {
        self.get(log_id)
    }

    fn list_by_buffer(&self, buffer_id: &str) -> RepositoryResult<Vec<BufferAdjustmentLog>> {
        self.list_for_buffer(buffer_id)
    }

    fn record_approval(
        &self,
        log_id: &str,
        status: ApprovalStatus,
        approved_by: &str,
        at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        self.update_approval(log_id, status, approved_by, at)
    }
}
