// ==========================================
// 补货队列生成集成测试
// ==========================================
// 测试目标: 动作/数量/优先级/原因码, 缺失依赖数据时跳过
// ==========================================


use dbm_replenishment::config::DbmConfig;
use dbm_replenishment::domain::types::{BufferZone, ReasonCode, RecommendedAction};
use dbm_replenishment::engine::{JobContext, JobScope};
use dbm_replenishment::logging;
use test_helpers::{at, TestEnv};

fn env_with_buffers() -> TestEnv {
    let env = TestEnv::new(DbmConfig::default());
    let now = at(2024, 5, 1);

    // 红区: net=25 → consumed=75
    env.seed_buffer("P-RED", "L1", 25.0, now);
    env.seed_profile("P-RED", "L1", 10.0, now);
    env.seed_lead_time("P-RED", "L1", (2.0, 3.0, 4.0), Some(100.0));

    // 黄区: net=60 → consumed=40, MOQ 取产品主数据
    env.seed_product("P-YEL", Some("TOOLS"), Some(12.0));
    env.seed_buffer("P-YEL", "L1", 60.0, now);
    env.seed_profile("P-YEL", "L1", 5.0, now);

    // 满缓冲: 无缺口
    env.seed_buffer("P-FULL", "L1", 100.0, now);
    env.seed_profile("P-FULL", "L1", 10.0, now);

    // 无画像
    env.seed_buffer("P-NOPROF", "L1", 10.0, now);

    // 产品已停用
    env.seed_buffer("P-OFF", "L1", 10.0, now);
    env.seed_profile("P-OFF", "L1", 10.0, now);
    env.deactivate_product("P-OFF");

    env
}

#[test]
fn test_queue_generation_outcomes() {
    logging::init_test();
    let env = env_with_buffers();
    let ctx = JobContext::new(at(2024, 5, 2));

    let summary = env
        .api
        .generate_replenishment_queue(&ctx, &JobScope::All)
        .unwrap();
    assert_eq!(summary.processed, 5);
    assert_eq!(summary.created, 3);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.errors, 0);

    let pending = env.api.list_pending_queue(10).unwrap();
    let products: Vec<_> = pending.iter().map(|q| q.product_id.as_str()).collect();
    assert_eq!(products, vec!["P-RED", "P-YEL", "P-FULL"]);
    assert!(pending.iter().all(|q| q.generation_id == ctx.run_id));

    // 红区: dos=2.5 < lead/2=4.5 → EXPEDITE, qty=max(MOQ 100, gap 75)
    let red = &pending[0];
    assert_eq!(red.zone, BufferZone::Red);
    assert_eq!(red.recommended_action, RecommendedAction::Expedite);
    assert_eq!(red.recommended_qty, 100.0);
    assert_eq!(red.lead_time_days, 9.0);
    assert!((red.priority_score - 175.0).abs() < 1e-9);
    assert_eq!(
        red.reason_codes,
        vec![ReasonCode::RedZone, ReasonCode::LowDaysOfSupply, ReasonCode::BufferDeficit]
    );

    // 黄区: 无提前期记录 → 默认 7 天, dos=12 不算低
    let yellow = &pending[1];
    assert_eq!(yellow.recommended_action, RecommendedAction::Order);
    assert_eq!(yellow.recommended_qty, 40.0);
    assert_eq!(yellow.moq, 12.0);
    assert_eq!(yellow.lead_time_days, 7.0);
    assert!((yellow.priority_score - 90.0).abs() < 1e-9);
    assert_eq!(yellow.reason_codes, vec![ReasonCode::YellowZone, ReasonCode::BufferDeficit]);

    // 满缓冲: MONITOR
    let full = &pending[2];
    assert_eq!(full.recommended_action, RecommendedAction::Monitor);
    assert_eq!(full.recommended_qty, 0.0);
    assert_eq!(full.reason_codes, vec![ReasonCode::RoutineReview]);
}

#[test]
fn test_queue_generation_appends_new_snapshot_each_run() {
    logging::init_test();
    let env = env_with_buffers();
    let scope = JobScope::pair("P-RED", "L1");

    let first = env
        .api
        .generate_replenishment_queue(&JobContext::new(at(2024, 5, 2)), &scope)
        .unwrap();
    let second = env
        .api
        .generate_replenishment_queue(&JobContext::new(at(2024, 5, 3)), &scope)
        .unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(second.created, 1);

    let pending = env.api.list_pending_queue(10).unwrap();
    let red: Vec<_> = pending.iter().filter(|q| q.product_id == "P-RED").collect();
    assert_eq!(red.len(), 2);
    // 同分时新生成的排在前面
    assert!(red[0].generated_at > red[1].generated_at);
}

#[test]
fn test_pair_scope_without_buffer_is_empty_run() {
    logging::init_test();
    let env = env_with_buffers();
    let summary = env
        .api
        .generate_replenishment_queue(&JobContext::new(at(2024, 5, 2)), &JobScope::pair("P-NONE", "L1"))
        .unwrap();
    assert_eq!(summary.processed, 0);
    assert!(env.api.list_pending_queue(10).unwrap().is_empty());
}
