// Batch entry point for the DBM periodic jobs.
//
// Usage:
//   dbm-jobs <db_path> <profiles|queue|review|orders|all> [product_id location_id]
//
// Bootstraps the schema, loads config from config_kv, runs the requested job(s)
// and prints one JSON summary per job on stdout. Exit code 1 when any job failed.

use dbm_replenishment::api::{ApiError, DbmApi};
use dbm_replenishment::config::{ConfigManager, DbmConfigReader};
use dbm_replenishment::db::{ensure_schema, open_sqlite_connection};
use dbm_replenishment::engine::{DbmRepositories, JobContext, JobKind, JobScope, JobSummary};
use dbm_replenishment::logging;
use serde_json::json;
use std::sync::{Arc, Mutex};

const USAGE: &str =
    "usage: dbm-jobs <db_path> <profiles|queue|review|orders|all> [product_id location_id]";

fn parse_job(name: &str) -> Option<Vec<JobKind>> {
    let jobs = match name {
        "profiles" => vec![JobKind::ProfileRecompute],
        "queue" => vec![JobKind::QueueGeneration],
        "review" => vec![JobKind::BufferReview],
        "orders" => vec![JobKind::OrderConsumption],
        "all" => Vec::new(),
        _ => return None,
    };
    Some(jobs)
}

fn report(job: JobKind, result: Result<JobSummary, ApiError>) -> bool {
    match result {
        Ok(summary) => {
            println!("{}", json!({ "ok": true, "summary": summary }));
            true
        }
        Err(ApiError::JobFailed { summary, message }) => {
            println!(
                "{}",
                json!({ "ok": false, "error": message, "summary": summary })
            );
            false
        }
        Err(e) => {
            println!(
                "{}",
                json!({ "ok": false, "job": job.as_str(), "error": e.to_string() })
            );
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, job_name) = match (args.first(), args.get(1)) {
        (Some(db), Some(job)) => (db.clone(), job.clone()),
        _ => return Err(USAGE.into()),
    };
    let jobs = parse_job(&job_name).ok_or(USAGE)?;
    let scope = match (args.get(2), args.get(3)) {
        (Some(p), Some(l)) => JobScope::pair(p.clone(), l.clone()),
        (None, None) => JobScope::All,
        _ => return Err(USAGE.into()),
    };

    let conn = open_sqlite_connection(&db_path)?;
    ensure_schema(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone())?
        .load_dbm_config()
        .await?;
    let api = DbmApi::new(DbmRepositories::sqlite(conn), config);
    let ctx = JobContext::now();
    tracing::info!(run_id = %ctx.run_id, job = %job_name, db_path = %db_path, "批处理开始");

    let mut all_ok = true;
    if jobs.is_empty() {
        let results = api.run_periodic_jobs(&ctx, &scope).await;
        for (job, result) in dbm_replenishment::engine::PERIODIC_JOBS.iter().zip(results) {
            all_ok &= report(*job, result);
        }
    } else {
        for job in jobs {
            let api_ref = &api;
            let result = tokio::task::block_in_place(|| api_ref.run_job(job, &ctx, &scope));
            all_ok &= report(job, result);
        }
    }

    if !all_ok {
        std::process::exit(1);
    }
    Ok(())
}
