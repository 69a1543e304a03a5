// ==========================================
// 库存缓冲补货系统 - DBM 配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::dbm_config::{ApprovalPolicy, DbmConfig, SizingMode};
use crate::domain::buffer::ZoneThresholds;
use crate::domain::types::BufferZone;
use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// DbmConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait DbmConfigReader: Send + Sync {
    // ===== 分区配置 =====

    /// 默认分区阈值 (新建缓冲未指定阈值时使用)
    ///
    /// # 默认值
    /// - green=80, yellow=50, red=20
    async fn get_default_thresholds(&self) -> ConfigResult<ZoneThresholds>;

    /// buffer_units ≤ 0 时的分区
    ///
    /// # 默认值
    /// - UNKNOWN
    async fn get_empty_buffer_zone(&self) -> ConfigResult<BufferZone>;

    // ===== DBM 评审配置 =====

    /// 评审周期 (天), 默认 7
    async fn get_review_period_days(&self) -> ConfigResult<i32>;

    /// 调整后锁定的评审周期数, 默认 6
    async fn get_lock_cycles(&self) -> ConfigResult<i32>;

    /// 新缓冲的连续在区天数门槛, 默认 7
    async fn get_default_adjustment_threshold_days(&self) -> ConfigResult<i32>;

    /// 扩大/缩小百分比, 默认 (33, 33)
    async fn get_adjustment_pcts(&self) -> ConfigResult<(f64, f64)>;

    /// 新缓冲计算口径, 默认 FIXED
    async fn get_sizing_mode(&self) -> ConfigResult<SizingMode>;

    /// 审批策略 + 阈值百分比, 默认 (THRESHOLD, 20)
    async fn get_approval_policy(&self) -> ConfigResult<(ApprovalPolicy, f64)>;

    // ===== 补货队列配置 =====

    /// 批处理分页大小, 默认 500
    async fn get_page_size(&self) -> ConfigResult<usize>;

    /// 缺失提前期记录时的默认提前期 (天), 默认 7
    async fn get_default_lead_time_days(&self) -> ConfigResult<f64>;

    /// 缺失 MOQ 时的默认值, 默认 1
    async fn get_default_moq(&self) -> ConfigResult<f64>;

    /// 分区权重 (red, yellow, green), 默认 (100, 50, 10)
    async fn get_zone_weights(&self) -> ConfigResult<(f64, f64, f64)>;

    // ===== 消耗画像配置 =====

    /// 消耗流水回看天数, 默认 60
    async fn get_history_window_days(&self) -> ConfigResult<i64>;

    /// 趋势阈值 (short, long, volatile), 默认 (10, 5, 20)
    async fn get_trend_thresholds(&self) -> ConfigResult<(f64, f64, f64)>;

    // ===== 持久化重试 =====

    /// (最大重试次数, 退避毫秒), 默认 (3, 25)
    async fn get_retry_policy(&self) -> ConfigResult<(u32, u64)>;

    /// 组装完整参数快照
    async fn load_dbm_config(&self) -> ConfigResult<DbmConfig> {
        let (increase_pct, decrease_pct) = self.get_adjustment_pcts().await?;
        let (approval_policy, approval_threshold_pct) = self.get_approval_policy().await?;
        let (zone_weight_red, zone_weight_yellow, zone_weight_green) =
            self.get_zone_weights().await?;
        let (trend_short_pct, trend_long_pct, trend_volatile_pct) =
            self.get_trend_thresholds().await?;
        let (max_persist_retries, retry_backoff_ms) = self.get_retry_policy().await?;

        let config = DbmConfig {
            default_thresholds: self.get_default_thresholds().await?,
            empty_buffer_zone: self.get_empty_buffer_zone().await?,
            review_period_days: self.get_review_period_days().await?,
            lock_cycles: self.get_lock_cycles().await?,
            default_adjustment_threshold_days: self.get_default_adjustment_threshold_days().await?,
            increase_pct,
            decrease_pct,
            sizing_mode: self.get_sizing_mode().await?,
            approval_policy,
            approval_threshold_pct,
            page_size: self.get_page_size().await?,
            default_lead_time_days: self.get_default_lead_time_days().await?,
            default_moq: self.get_default_moq().await?,
            zone_weight_red,
            zone_weight_yellow,
            zone_weight_green,
            history_window_days: self.get_history_window_days().await?,
            trend_short_pct,
            trend_long_pct,
            trend_volatile_pct,
            max_persist_retries,
            retry_backoff_ms,
        };

        config.validate()?;
        Ok(config)
    }
}
