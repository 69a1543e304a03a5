// ==========================================
// 消耗画像重算集成测试
// ==========================================
// 测试目标: 流水 → 多窗口 ADC → 季节/活动因子 → 画像 UPSERT (幂等)
// ==========================================


use dbm_replenishment::config::DbmConfig;
use dbm_replenishment::domain::types::AdcTrend;
use dbm_replenishment::domain::{ConsumptionRecord, SeasonalityAdjustment, SpecialEvent};
use dbm_replenishment::engine::{JobContext, JobScope};
use dbm_replenishment::logging;
use dbm_replenishment::repository::DemandFactorRepository;
use test_helpers::{at, date, TestEnv};

fn env_with_history() -> (TestEnv, DemandFactorRepository) {
    let env = TestEnv::new(DbmConfig::default());
    env.seed_product("P1", Some("TOOLS"), None);
    env.seed_buffer("P1", "L1", 50.0, at(2024, 3, 1));
    env.seed_daily_history("P1", "L1", date(2024, 6, 30), 60, 10.0);

    let factors = DemandFactorRepository::from_connection(env.conn.clone());
    factors
        .insert_seasonality(&SeasonalityAdjustment {
            product_id: None,
            category: Some("TOOLS".to_string()),
            location_id: "L1".to_string(),
            month: 6,
            factor: 1.2,
        })
        .unwrap();
    factors
        .upsert_event(&SpecialEvent {
            event_id: "EV-SUMMER".to_string(),
            product_id: "P1".to_string(),
            location_id: "L1".to_string(),
            start_date: date(2024, 6, 25),
            end_date: date(2024, 7, 5),
            change_factor: 1.5,
            is_active: true,
        })
        .unwrap();
    (env, factors)
}

#[test]
fn test_recompute_applies_category_seasonality_and_event() {
    logging::init_test();
    let (env, _) = env_with_history();
    let ctx = JobContext::new(at(2024, 6, 30));

    let summary = env
        .api
        .recompute_consumption_profiles(&ctx, &JobScope::All)
        .unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.errors, 0);

    let profile = env.api.get_consumption_profile("P1", "L1").unwrap().unwrap();
    assert_eq!(profile.adc_7d, 10.0);
    assert_eq!(profile.adc_30d, 10.0);
    assert_eq!(profile.adc_60d, 10.0);
    assert_eq!(profile.adc_trend, AdcTrend::Stable);
    assert_eq!(profile.data_points_used, 60);
    assert_eq!(profile.std_deviation, 0.0);
    assert_eq!(profile.last_consumption_date, Some(date(2024, 6, 30)));
    assert!((profile.seasonality_factor - 1.2).abs() < 1e-9);
    assert!((profile.event_factor - 1.5).abs() < 1e-9);
    // 10 × 1.2 × 1.5
    assert!((profile.adc_normalized - 18.0).abs() < 1e-9);
    assert_eq!(profile.calculation_date, ctx.as_of);
}

#[test]
fn test_recompute_is_idempotent() {
    logging::init_test();
    let (env, _) = env_with_history();
    let ctx = JobContext::new(at(2024, 6, 30));

    env.api.recompute_consumption_profiles(&ctx, &JobScope::All).unwrap();
    let first = env.api.get_consumption_profile("P1", "L1").unwrap().unwrap();
    env.api.recompute_consumption_profiles(&ctx, &JobScope::All).unwrap();
    let second = env.api.get_consumption_profile("P1", "L1").unwrap().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_product_seasonality_wins_and_future_records_ignored() {
    logging::init_test();
    let (env, factors) = env_with_history();
    factors
        .insert_seasonality(&SeasonalityAdjustment {
            product_id: Some("P1".to_string()),
            category: None,
            location_id: "L1".to_string(),
            month: 6,
            factor: 0.8,
        })
        .unwrap();
    // as_of 之后的流水不计入
    env.consumption
        .insert_records("P1", "L1", &[ConsumptionRecord::new(date(2024, 7, 1), 1000.0)])
        .unwrap();

    env.api
        .recompute_consumption_profiles(&JobContext::new(at(2024, 6, 30)), &JobScope::pair("P1", "L1"))
        .unwrap();
    let profile = env.api.get_consumption_profile("P1", "L1").unwrap().unwrap();
    assert_eq!(profile.adc_7d, 10.0);
    assert!((profile.seasonality_factor - 0.8).abs() < 1e-9);
    assert!((profile.adc_normalized - 12.0).abs() < 1e-9);
}

#[test]
fn test_event_outside_window_has_no_effect() {
    logging::init_test();
    let (env, _) = env_with_history();
    env.seed_daily_history("P1", "L1", date(2024, 8, 31), 60, 10.0);

    // 8 月: 无季节配置, 活动已结束
    env.api
        .recompute_consumption_profiles(&JobContext::new(at(2024, 8, 31)), &JobScope::All)
        .unwrap();
    let profile = env.api.get_consumption_profile("P1", "L1").unwrap().unwrap();
    assert_eq!(profile.seasonality_factor, 1.0);
    assert_eq!(profile.event_factor, 1.0);
    assert!((profile.adc_normalized - 10.0).abs() < 1e-9);
}

#[test]
fn test_buffer_without_history_gets_zero_profile() {
    logging::init_test();
    let env = TestEnv::new(DbmConfig::default());
    env.seed_buffer("P2", "L1", 50.0, at(2024, 3, 1));

    let summary = env
        .api
        .recompute_consumption_profiles(&JobContext::new(at(2024, 6, 30)), &JobScope::All)
        .unwrap();
    assert_eq!(summary.updated, 1);

    let profile = env.api.get_consumption_profile("P2", "L1").unwrap().unwrap();
    assert_eq!(profile.adc_30d, 0.0);
    assert_eq!(profile.adc_normalized, 0.0);
    assert_eq!(profile.adc_trend, AdcTrend::Stable);
    assert_eq!(profile.trend_confidence, 0.0);
    assert_eq!(profile.data_points_used, 0);
    assert_eq!(profile.last_consumption_date, None);
}
