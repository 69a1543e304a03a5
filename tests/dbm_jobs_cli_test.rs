// ==========================================
// dbm-jobs 批处理入口 E2E 测试
// ==========================================
// 测试目标: 建库 → 夹具 → 运行二进制 → 解析 stdout 的 JSON 汇总
// ==========================================


use dbm_replenishment::config::DbmConfig;
use serde_json::Value;
use std::process::{Command, Output};
use test_helpers::{at, create_test_db, open_shared, TestEnv};

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dbm-jobs"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run dbm-jobs")
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("stdout line is not JSON"))
        .collect()
}

/// 一个红区缓冲 (有画像) + 一个满缓冲
fn seed(db_path: &str) {
    let env = TestEnv::with_conn(open_shared(db_path), DbmConfig::default());
    env.seed_buffer("P-RED", "L1", 25.0, at(2024, 5, 1));
    env.seed_profile("P-RED", "L1", 10.0, at(2024, 5, 1));
    env.seed_buffer("P-FULL", "L1", 100.0, at(2024, 5, 1));
    env.seed_profile("P-FULL", "L1", 10.0, at(2024, 5, 1));
}

#[test]
fn test_queue_job_prints_summary() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    seed(&db_path);

    let output = run_cli(&[&db_path, "queue"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["ok"], true);
    assert_eq!(lines[0]["summary"]["job"], "QUEUE_GENERATION");
    assert_eq!(lines[0]["summary"]["processed"], 2);
    assert_eq!(lines[0]["summary"]["created"], 2);
}

#[test]
fn test_all_runs_three_periodic_jobs_then_orders() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    seed(&db_path);

    let output = run_cli(&[&db_path, "all"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let jobs: Vec<String> = json_lines(&output)
        .iter()
        .map(|v| v["summary"]["job"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(jobs, vec!["PROFILE_RECOMPUTE", "QUEUE_GENERATION", "BUFFER_REVIEW"]);

    let output = run_cli(&[&db_path, "orders"]);
    assert!(output.status.success());
    let lines = json_lines(&output);
    assert_eq!(lines[0]["summary"]["job"], "ORDER_CONSUMPTION");
}

#[test]
fn test_pair_scope_limits_units() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    seed(&db_path);

    let output = run_cli(&[&db_path, "profiles", "P-RED", "L1"]);
    assert!(output.status.success());
    let lines = json_lines(&output);
    assert_eq!(lines[0]["summary"]["processed"], 1);
    assert_eq!(lines[0]["summary"]["updated"], 1);
}

#[test]
fn test_bad_arguments_fail_with_usage() {
    let (_temp_file, db_path) = create_test_db().unwrap();

    let output = run_cli(&[&db_path, "reorder"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage: dbm-jobs"));

    let output = run_cli(&[&db_path, "queue", "P-RED"]);
    assert!(!output.status.success());
    assert!(json_lines(&output).is_empty());
}
