// ==========================================
// 库存缓冲补货系统 - 缓冲分页扫描
// ==========================================
// 职责: 按作用范围 + 键集分页遍历缓冲, 每页之间检查取消/截止
// 红线: 单元失败不中断批处理; 只有分页读取失败才是作业级失败
// ==========================================

use crate::domain::buffer::InventoryBuffer;
use crate::engine::job::{record_outcome, JobContext, JobScope, JobSummary, SkipReason, UnitOutcome};
use crate::engine::ports::BufferStore;
use crate::repository::error::RepositoryResult;

/// 扫描模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// 全部有效缓冲
    Active,
    /// 已到评审日的有效缓冲
    ReviewDue,
}

/// 遍历作用范围内的缓冲, 对每个单元调用 f 并记入 summary
///
/// # 返回
/// - Ok(()): 遍历完成或被取消 (summary.interrupted 标记)
/// - Err: 分页读取失败
pub(crate) fn scan_buffers<F>(
    store: &dyn BufferStore,
    scope: &JobScope,
    mode: ScanMode,
    page_size: usize,
    ctx: &JobContext,
    summary: &mut JobSummary,
    mut f: F,
) -> RepositoryResult<()>
where
    F: FnMut(&InventoryBuffer) -> UnitOutcome,
{
    let today = ctx.today();

    if let JobScope::Pair {
        product_id,
        location_id,
    } = scope
    {
        let unit_key = format!("{}@{}", product_id, location_id);
        match store.find_by_pair(product_id, location_id)? {
            Some(buffer) if buffer.is_active => {
                let due = buffer.next_review_due.map_or(true, |d| d <= today);
                let outcome = if mode == ScanMode::ReviewDue && !due {
                    UnitOutcome::Skipped(SkipReason::NotDueForReview)
                } else {
                    f(&buffer)
                };
                record_outcome(summary, &unit_key, outcome);
            }
            _ => {
                tracing::info!(product_id = %product_id, location_id = %location_id, "作用范围内无有效缓冲");
            }
        }
        return Ok(());
    }

    let page_size = page_size.max(1);
    let mut cursor: Option<String> = None;
    loop {
        if ctx.should_stop() {
            summary.interrupted = true;
            tracing::warn!(job = %summary.job, run_id = %summary.run_id, processed = summary.processed, "作业被取消或超时, 在页边界停止");
            return Ok(());
        }

        let page = match mode {
            ScanMode::Active => store.list_active_page(cursor.as_deref(), page_size)?,
            ScanMode::ReviewDue => store.list_review_due_page(today, cursor.as_deref(), page_size)?,
        };
        let page_len = page.len();

        for buffer in &page {
            let outcome = f(buffer);
            record_outcome(summary, &buffer.buffer_id, outcome);
        }

        tracing::debug!(job = %summary.job, page_len, processed = summary.processed, "分页处理完成");

        match page.last() {
            Some(last) if page_len == page_size => cursor = Some(last.buffer_id.clone()),
            _ => return Ok(()),
        }
    }
}
