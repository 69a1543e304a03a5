use super::core::{map_buffer, BUFFER_COLUMNS};
use super::InventoryBufferRepository;
use crate::domain::buffer::InventoryBuffer;
use crate::engine::ports::BufferStore;
use crate::repository::error::RepositoryResult;
use crate::repository::row_codec::fmt_date;
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

impl InventoryBufferRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, buffer_id: &str) -> RepositoryResult<Option<InventoryBuffer>> {
        let conn = self.get_conn()?;
        let buffer = conn
            .query_row(
                &format!("SELECT {} FROM inventory_buffer WHERE buffer_id = ?1", BUFFER_COLUMNS),
                params![buffer_id],
                map_buffer,
            )
            .optional()?;
        Ok(buffer)
    }

    pub fn find_by_pair(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<InventoryBuffer>> {
        let conn = self.get_conn()?;
        let buffer = conn
            .query_row(
                &format!(
                    "SELECT {} FROM inventory_buffer WHERE product_id = ?1 AND location_id = ?2",
                    BUFFER_COLUMNS
                ),
                params![product_id, location_id],
                map_buffer,
            )
            .optional()?;
        Ok(buffer)
    }

    /// 有效缓冲键集分页 (buffer_id 升序)
    pub fn list_active_after(
        &self,
        after_buffer_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<InventoryBuffer>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM inventory_buffer
            WHERE is_active = 1 AND (?1 IS NULL OR buffer_id > ?1)
            ORDER BY buffer_id
            LIMIT ?2
            "#,
            BUFFER_COLUMNS
        ))?;
        let buffers = stmt
            .query_map(params![after_buffer_id, limit as i64], map_buffer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(buffers)
    }

    /// 到期评审缓冲键集分页 (next_review_due 为空视为到期)
    pub fn list_review_due_after(
        &self,
        as_of: NaiveDate,
        after_buffer_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<InventoryBuffer>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM inventory_buffer
            WHERE is_active = 1
              AND (next_review_due IS NULL OR next_review_due <= ?1)
              AND (?2 IS NULL OR buffer_id > ?2)
            ORDER BY buffer_id
            LIMIT ?3
            "#,
            BUFFER_COLUMNS
        ))?;
        let buffers = stmt
            .query_map(params![fmt_date(as_of), after_buffer_id, limit as i64], map_buffer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(buffers)
    }
}

// ==========================================
// BufferStore 实现
// ==========================================
impl BufferStore for InventoryBufferRepository {
    fn find_by_id(&self, buffer_id: &str) -> RepositoryResult<Option<InventoryBuffer>> {
        InventoryBufferRepository::find_by_id(self, buffer_id)
    }

    fn find_by_pair(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<InventoryBuffer>> {
        InventoryBufferRepository::find_by_pair(self, product_id, location_id)
    }

    fn insert(&self, buffer: &InventoryBuffer) -> RepositoryResult<()> {
        self.insert_buffer(buffer)
    }

    fn update_with_revision(
        &self,
        buffer: &InventoryBuffer,
        expected_revision: i32,
    ) -> RepositoryResult<()> {
        self.update_buffer(buffer, expected_revision)
    }

    fn list_active_page(
        &self,
        after_buffer_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<InventoryBuffer>> {
        self.list_active_after(after_buffer_id, limit)
    }

    fn list_review_due_page(
        &self,
        as_of: NaiveDate,
        after_buffer_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<InventoryBuffer>> {
        self.list_review_due_after(as_of, after_buffer_id, limit)
    }
}
