// ==========================================
// 库存缓冲补货系统 - 主数据仓储
// ==========================================
// 职责: product / location / lead_time 的读取与维护
// 说明: 提前期每个 (产品, 库位) 只保留一条有效记录, 旧记录置为失效
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::master::{LeadTime, LocationInfo, ProductInfo};
use crate::engine::ports::{LeadTimeReader, LocationReader, ProductReader};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct MasterDataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MasterDataRepository {
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

    // ==========================================
    // 产品
    // ==========================================

    pub fn upsert_product(&self, p: &ProductInfo) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO product (product_id, name, category, moq, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(product_id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                moq = excluded.moq,
                is_active = excluded.is_active
            "#,
            params![p.product_id, p.name, p.category, p.moq, p.is_active],
        )?;
        Ok(())
    }

    pub fn get_product(&self, product_id: &str) -> RepositoryResult<Option<ProductInfo>> {
        let conn = self.get_conn()?;
        let product = conn
            .query_row(
                "SELECT product_id, name, category, moq, is_active FROM product WHERE product_id = ?1",
                params![product_id],
                |row| {
                    Ok(ProductInfo {
                        product_id: row.get(0)?,
                        name: row.get(1)?,
                        category: row.get(2)?,
                        moq: row.get(3)?,
                        is_active: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(product)
    }

    // ==========================================
    // 库位
    // ==========================================

    pub fn upsert_location(&self, l: &LocationInfo) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO location (location_id, name, parent_location_id)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(location_id) DO UPDATE SET
                name = excluded.name,
                parent_location_id = excluded.parent_location_id
            "#,
            params![l.location_id, l.name, l.parent_location_id],
        )?;
        Ok(())
    }

    pub fn get_location(&self, location_id: &str) -> RepositoryResult<Option<LocationInfo>> {
        let conn = self.get_conn()?;
        let location = conn
            .query_row(
                "SELECT location_id, name, parent_location_id FROM location WHERE location_id = ?1",
                params![location_id],
                |row| {
                    Ok(LocationInfo {
                        location_id: row.get(0)?,
                        name: row.get(1)?,
                        parent_location_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    // ==========================================
    // 提前期
    // ==========================================

    /// 写入新的有效提前期, 同一 (产品, 库位) 的旧记录置为失效 (单事务)
    pub fn upsert_lead_time(&self, lt: &LeadTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE lead_time SET is_active = 0 WHERE product_id = ?1 AND location_id = ?2 AND is_active = 1",
            params![lt.product_id, lt.location_id],
        )?;
        tx.execute(
            r#"
            INSERT INTO lead_time (
                product_id, location_id, order_lead_time, manufacturing_time,
                transport_time, moq, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
            "#,
            params![
                lt.product_id,
                lt.location_id,
                lt.order_lead_time,
                lt.manufacturing_time,
                lt.transport_time,
                lt.moq
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// 最新一条有效提前期
    pub fn get_active_lead_time(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<LeadTime>> {
        let conn = self.get_conn()?;
        let lead_time = conn
            .query_row(
                r#"
                SELECT product_id, location_id, order_lead_time, manufacturing_time,
                       transport_time, moq
                FROM lead_time
                WHERE product_id = ?1 AND location_id = ?2 AND is_active = 1
                ORDER BY rowid DESC
                LIMIT 1
                "#,
                params![product_id, location_id],
                |row| {
                    Ok(LeadTime {
                        product_id: row.get(0)?,
                        location_id: row.get(1)?,
                        order_lead_time: row.get(2)?,
                        manufacturing_time: row.get(3)?,
                        transport_time: row.get(4)?,
                        moq: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(lead_time)
    }
}

impl LeadTimeReader for MasterDataRepository {
    fn find_active_lead_time(
        &self,
        product_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<LeadTime>> {
        self.get_active_lead_time(product_id, location_id)
    }
}

impl ProductReader for MasterDataRepository {
    fn find_product(&self, product_id: &str) -> RepositoryResult<Option<ProductInfo>> {
        self.get_product(product_id)
    }
}

impl LocationReader for MasterDataRepository {
    fn find_location(&self, location_id: &str) -> RepositoryResult<Option<LocationInfo>> {
        self.get_location(location_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> MasterDataRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        MasterDataRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_product_upsert_and_lookup() {
        let repo = setup();
        let mut product = ProductInfo {
            product_id: "P1".to_string(),
            name: "Widget".to_string(),
            category: Some("TOOLS".to_string()),
            moq: Some(12.0),
            is_active: true,
        };
        repo.upsert_product(&product).unwrap();
        product.is_active = false;
        repo.upsert_product(&product).unwrap();

        assert_eq!(repo.find_product("P1").unwrap(), Some(product));
        assert_eq!(repo.find_product("P2").unwrap(), None);
    }

    #[test]
    fn test_only_latest_lead_time_is_active() {
        let repo = setup();
        let mut lt = LeadTime {
            product_id: "P1".to_string(),
            location_id: "L1".to_string(),
            order_lead_time: Some(2.0),
            manufacturing_time: Some(3.0),
            transport_time: None,
            moq: None,
        };
        repo.upsert_lead_time(&lt).unwrap();
        lt.transport_time = Some(4.0);
        repo.upsert_lead_time(&lt).unwrap();

        let active = repo.find_active_lead_time("P1", "L1").unwrap().unwrap();
        assert_eq!(active.total_days(), 9.0);
        assert_eq!(repo.find_active_lead_time("P1", "L9").unwrap(), None);
    }

    #[test]
    fn test_location_lookup() {
        let repo = setup();
        let loc = LocationInfo {
            location_id: "L1".to_string(),
            name: "Main DC".to_string(),
            parent_location_id: None,
        };
        repo.upsert_location(&loc).unwrap();
        assert_eq!(repo.find_location("L1").unwrap(), Some(loc));
    }
}
