// ==========================================
// 库存缓冲补货系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::dbm_config::{ApprovalPolicy, DbmConfig, SizingMode};
use crate::config::dbm_config_trait::{ConfigResult, DbmConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::buffer::ZoneThresholds;
use crate::domain::types::BufferZone;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 读取并解析数值配置, 解析失败回退默认值并告警
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(
                        config_key = key,
                        raw_value = %raw,
                        default = %default,
                        "配置值格式错误，使用默认值"
                    );
                    Ok(default)
                }
            },
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 批任务启动时记录参数快照，便于追溯
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }
}

// ==========================================
// DbmConfigReader Trait 实现
// ==========================================
#[async_trait]
impl DbmConfigReader for ConfigManager {
    // ===== 分区配置 =====

    async fn get_default_thresholds(&self) -> ConfigResult<ZoneThresholds> {
        let d = DbmConfig::default().default_thresholds;
        let thresholds = ZoneThresholds::new(
            self.get_parsed_or_default(config_keys::ZONE_GREEN_PCT, d.green_pct)?,
            self.get_parsed_or_default(config_keys::ZONE_YELLOW_PCT, d.yellow_pct)?,
            self.get_parsed_or_default(config_keys::ZONE_RED_PCT, d.red_pct)?,
        );
        if thresholds.is_monotone() {
            Ok(thresholds)
        } else {
            tracing::warn!(?thresholds, "默认分区阈值非单调，使用内置默认值");
            Ok(d)
        }
    }

    async fn get_empty_buffer_zone(&self) -> ConfigResult<BufferZone> {
        let value = self.get_config_or_default(config_keys::EMPTY_BUFFER_ZONE, "UNKNOWN")?;
        match value.trim().to_uppercase().as_str() {
            "GREEN" => Ok(BufferZone::Green),
            "UNKNOWN" => Ok(BufferZone::Unknown),
            other => {
                tracing::warn!(raw_value = other, "空缓冲分区只允许 UNKNOWN/GREEN，使用 UNKNOWN");
                Ok(BufferZone::Unknown)
            }
        }
    }

    // ===== DBM 评审配置 =====

    async fn get_review_period_days(&self) -> ConfigResult<i32> {
        let v: i32 = self.get_parsed_or_default(config_keys::REVIEW_PERIOD_DAYS, 7)?;
        Ok(if v > 0 { v } else { 7 })
    }

    async fn get_lock_cycles(&self) -> ConfigResult<i32> {
        let v: i32 = self.get_parsed_or_default(config_keys::LOCK_CYCLES, 6)?;
        Ok(v.max(0))
    }

    async fn get_default_adjustment_threshold_days(&self) -> ConfigResult<i32> {
        let v: i32 = self.get_parsed_or_default(config_keys::ADJUSTMENT_THRESHOLD_DAYS, 7)?;
        Ok(v.max(0))
    }

    async fn get_adjustment_pcts(&self) -> ConfigResult<(f64, f64)> {
        let inc: f64 = self.get_parsed_or_default(config_keys::INCREASE_PCT, 33.0)?;
        let dec: f64 = self.get_parsed_or_default(config_keys::DECREASE_PCT, 33.0)?;
        let inc = if inc >= 0.0 { inc } else { 33.0 };
        let dec = if (0.0..100.0).contains(&dec) { dec } else { 33.0 };
        Ok((inc, dec))
    }

    async fn get_sizing_mode(&self) -> ConfigResult<SizingMode> {
        let value = self.get_config_or_default(config_keys::SIZING_MODE, "FIXED")?;
        Ok(SizingMode::from_str(&value).unwrap_or(SizingMode::Fixed))
    }

    async fn get_approval_policy(&self) -> ConfigResult<(ApprovalPolicy, f64)> {
        let value = self.get_config_or_default(config_keys::APPROVAL_POLICY, "THRESHOLD")?;
        let policy = ApprovalPolicy::from_str(&value).unwrap_or(ApprovalPolicy::Threshold);
        let pct: f64 = self.get_parsed_or_default(config_keys::APPROVAL_THRESHOLD_PCT, 20.0)?;
        Ok((policy, pct.max(0.0)))
    }

    // ===== 补货队列配置 =====

    async fn get_page_size(&self) -> ConfigResult<usize> {
        let v = self.get_parsed_or_default(config_keys::BATCH_PAGE_SIZE, 500usize)?;
        Ok(if v > 0 { v } else { 500 })
    }

    async fn get_default_lead_time_days(&self) -> ConfigResult<f64> {
        let v: f64 = self.get_parsed_or_default(config_keys::DEFAULT_LEAD_TIME_DAYS, 7.0)?;
        Ok(v.max(0.0))
    }

    async fn get_default_moq(&self) -> ConfigResult<f64> {
        let v: f64 = self.get_parsed_or_default(config_keys::DEFAULT_MOQ, 1.0)?;
        Ok(if v > 0.0 { v } else { 1.0 })
    }

    async fn get_zone_weights(&self) -> ConfigResult<(f64, f64, f64)> {
        Ok((
            self.get_parsed_or_default(config_keys::ZONE_WEIGHT_RED, 100.0)?,
            self.get_parsed_or_default(config_keys::ZONE_WEIGHT_YELLOW, 50.0)?,
            self.get_parsed_or_default(config_keys::ZONE_WEIGHT_GREEN, 10.0)?,
        ))
    }

    // ===== 消耗画像配置 =====

    async fn get_history_window_days(&self) -> ConfigResult<i64> {
        let v = self.get_parsed_or_default(config_keys::HISTORY_WINDOW_DAYS, 60i64)?;
        // 至少覆盖 60 天窗口
        Ok(v.max(60))
    }

    async fn get_trend_thresholds(&self) -> ConfigResult<(f64, f64, f64)> {
        Ok((
            self.get_parsed_or_default(config_keys::TREND_SHORT_PCT, 10.0)?,
            self.get_parsed_or_default(config_keys::TREND_LONG_PCT, 5.0)?,
            self.get_parsed_or_default(config_keys::TREND_VOLATILE_PCT, 20.0)?,
        ))
    }

    // ===== 持久化重试 =====

    async fn get_retry_policy(&self) -> ConfigResult<(u32, u64)> {
        Ok((
            self.get_parsed_or_default(config_keys::MAX_PERSIST_RETRIES, 3u32)?,
            self.get_parsed_or_default(config_keys::RETRY_BACKOFF_MS, 25u64)?,
        ))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分区阈值
    pub const ZONE_GREEN_PCT: &str = "zone_green_pct";
    pub const ZONE_YELLOW_PCT: &str = "zone_yellow_pct";
    pub const ZONE_RED_PCT: &str = "zone_red_pct";
    pub const EMPTY_BUFFER_ZONE: &str = "empty_buffer_zone";

    // DBM 评审
    pub const REVIEW_PERIOD_DAYS: &str = "dbm_review_period_days";
    pub const LOCK_CYCLES: &str = "dbm_lock_cycles";
    pub const ADJUSTMENT_THRESHOLD_DAYS: &str = "dbm_adjustment_threshold_days";
    pub const INCREASE_PCT: &str = "dbm_increase_pct";
    pub const DECREASE_PCT: &str = "dbm_decrease_pct";
    pub const SIZING_MODE: &str = "dbm_sizing_mode";
    pub const APPROVAL_POLICY: &str = "approval_policy";
    pub const APPROVAL_THRESHOLD_PCT: &str = "approval_threshold_pct";

    // 补货队列
    pub const BATCH_PAGE_SIZE: &str = "batch_page_size";
    pub const DEFAULT_LEAD_TIME_DAYS: &str = "default_lead_time_days";
    pub const DEFAULT_MOQ: &str = "default_moq";
    pub const ZONE_WEIGHT_RED: &str = "zone_weight_red";
    pub const ZONE_WEIGHT_YELLOW: &str = "zone_weight_yellow";
    pub const ZONE_WEIGHT_GREEN: &str = "zone_weight_green";

    // 消耗画像
    pub const HISTORY_WINDOW_DAYS: &str = "history_window_days";
    pub const TREND_SHORT_PCT: &str = "trend_short_pct";
    pub const TREND_LONG_PCT: &str = "trend_long_pct";
    pub const TREND_VOLATILE_PCT: &str = "trend_volatile_pct";

    // 持久化重试
    pub const MAX_PERSIST_RETRIES: &str = "max_persist_retries";
    pub const RETRY_BACKOFF_MS: &str = "retry_backoff_ms";
}
