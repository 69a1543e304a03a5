// ==========================================
// 库存缓冲补货系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供建表脚本 (幂等),供 CLI 与测试复用
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表 (幂等)
///
/// 主数据表 (product / location / lead_time / consumption_history /
/// seasonality_adjustment / special_event) 由外部系统维护,这里只建结构
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let current = read_schema_version(conn)?;
    if current.unwrap_or(0) < CURRENT_SCHEMA_VERSION {
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS product (
    product_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT,
    moq REAL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS location (
    location_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent_location_id TEXT
);

CREATE TABLE IF NOT EXISTS lead_time (
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    order_lead_time REAL,
    manufacturing_time REAL,
    transport_time REAL,
    moq REAL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_lead_time_pair
  ON lead_time(product_id, location_id, is_active);

CREATE TABLE IF NOT EXISTS consumption_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    consumption_date TEXT NOT NULL,
    quantity REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_consumption_pair_date
  ON consumption_history(product_id, location_id, consumption_date);

CREATE TABLE IF NOT EXISTS seasonality_adjustment (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id TEXT,
    category TEXT,
    location_id TEXT NOT NULL,
    month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    factor REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS special_event (
    event_id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    change_factor REAL NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS consumption_profile (
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    adc_7d REAL NOT NULL,
    adc_14d REAL NOT NULL,
    adc_30d REAL NOT NULL,
    adc_60d REAL NOT NULL,
    adc_normalized REAL NOT NULL,
    seasonality_factor REAL NOT NULL,
    event_factor REAL NOT NULL,
    adc_trend TEXT NOT NULL,
    trend_confidence REAL NOT NULL,
    coefficient_of_variation REAL NOT NULL,
    std_deviation REAL NOT NULL,
    data_points_used INTEGER NOT NULL,
    last_consumption_date TEXT,
    calculation_date TEXT NOT NULL,
    PRIMARY KEY (product_id, location_id)
);

CREATE TABLE IF NOT EXISTS inventory_buffer (
    buffer_id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    buffer_units REAL NOT NULL,
    buffer_days INTEGER NOT NULL,
    green_threshold_pct REAL NOT NULL,
    yellow_threshold_pct REAL NOT NULL,
    red_threshold_pct REAL NOT NULL,
    current_inventory REAL NOT NULL DEFAULT 0,
    in_pipeline_qty REAL NOT NULL DEFAULT 0,
    net_available_qty REAL NOT NULL DEFAULT 0 CHECK (net_available_qty >= 0),
    net_available_override REAL,
    buffer_consumed_pct REAL NOT NULL DEFAULT 0 CHECK (buffer_consumed_pct BETWEEN 0 AND 100),
    current_zone TEXT NOT NULL,
    zone_entered_on TEXT NOT NULL,
    consecutive_zone_days INTEGER NOT NULL DEFAULT 0,
    adjustment_threshold_days INTEGER NOT NULL,
    last_review_date TEXT,
    next_review_due TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    revision INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (product_id, location_id)
);

CREATE INDEX IF NOT EXISTS idx_buffer_review_due
  ON inventory_buffer(is_active, next_review_due);

CREATE TABLE IF NOT EXISTS replenishment_queue (
    queue_item_id TEXT PRIMARY KEY,
    generation_id TEXT NOT NULL,
    buffer_id TEXT NOT NULL REFERENCES inventory_buffer(buffer_id),
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    zone TEXT NOT NULL,
    buffer_units REAL NOT NULL,
    net_available_qty REAL NOT NULL,
    buffer_gap REAL NOT NULL,
    days_of_supply REAL NOT NULL,
    lead_time_days REAL NOT NULL,
    moq REAL NOT NULL,
    recommended_action TEXT NOT NULL,
    recommended_qty REAL NOT NULL,
    priority_score REAL NOT NULL,
    reason_codes TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    generated_at TEXT NOT NULL,
    status_updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_status_priority
  ON replenishment_queue(status, priority_score DESC, generated_at DESC);

CREATE INDEX IF NOT EXISTS idx_queue_buffer_status
  ON replenishment_queue(buffer_id, status);

CREATE TABLE IF NOT EXISTS replenishment_order (
    order_id TEXT PRIMARY KEY,
    queue_item_id TEXT NOT NULL REFERENCES replenishment_queue(queue_item_id),
    buffer_id TEXT NOT NULL REFERENCES inventory_buffer(buffer_id),
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    action TEXT NOT NULL,
    quantity REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'OPEN',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS buffer_adjustment_log (
    log_id TEXT PRIMARY KEY,
    buffer_id TEXT NOT NULL REFERENCES inventory_buffer(buffer_id),
    product_id TEXT NOT NULL,
    location_id TEXT NOT NULL,
    decision TEXT NOT NULL,
    old_buffer_units REAL NOT NULL,
    new_buffer_units REAL NOT NULL,
    old_buffer_days INTEGER NOT NULL,
    new_buffer_days INTEGER NOT NULL,
    change_percentage REAL NOT NULL,
    adjustment_factor REAL NOT NULL,
    trigger_reason TEXT NOT NULL,
    consecutive_days_in_zone INTEGER NOT NULL,
    zone_when_triggered TEXT NOT NULL,
    system_recommended INTEGER NOT NULL,
    requires_approval INTEGER NOT NULL,
    approval_status TEXT NOT NULL,
    approved_by TEXT,
    approved_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_adjustment_log_buffer
  ON buffer_adjustment_log(buffer_id, created_at);
"#;
