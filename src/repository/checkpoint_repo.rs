// ==========================================
// 产品登记同步系统 - 远端检查点 Repository
// ==========================================
// 职责: import_boundary 表的读写（逻辑单行）
// 约定:
// - 0 行: 写入时新建一行
// - 多行: 始终读取/更新 id 最小的第一行
// ==========================================

use crate::config::EndpointConfig;
use crate::db::open_endpoint;
use crate::domain::source::{parse_timestamp, TIMESTAMP_FORMAT};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::info;

// ==========================================
// CheckpointRepository Trait
// ==========================================
pub trait CheckpointRepository: Send + Sync {
    /// 读取第一行边界时间（表为空 → None）
    fn read_first(&self) -> RepositoryResult<Option<NaiveDateTime>>;

    /// 更新第一行；表为空时插入
    fn upsert_first(&self, boundary: NaiveDateTime) -> RepositoryResult<()>;

    /// 表为空时写入初始值
    ///
    /// # 返回
    /// - Ok(true): 新建了初始行
    /// - Ok(false): 已有数据，未改动
    fn ensure_initialized(&self, initial: NaiveDateTime) -> RepositoryResult<bool>;
}

// ==========================================
// CheckpointRepositoryImpl
// ==========================================
pub struct CheckpointRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl CheckpointRepositoryImpl {
    pub fn open(endpoint: &EndpointConfig) -> RepositoryResult<Self> {
        let conn = open_endpoint(endpoint).map_err(|e| {
            RepositoryError::DatabaseConnectionError(format!("{}: {}", endpoint.db_path, e))
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl CheckpointRepository for CheckpointRepositoryImpl {
    fn read_first(&self) -> RepositoryResult<Option<NaiveDateTime>> {
        let conn = self.get_conn()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT boundary_time FROM import_boundary ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match raw.flatten() {
            None => Ok(None),
            Some(value) => parse_timestamp(&value).map(Some).ok_or_else(|| {
                RepositoryError::FieldValueError {
                    field: "boundary_time".to_string(),
                    message: format!("无法解析的检查点时间: {}", value),
                }
            }),
        }
    }

    fn upsert_first(&self, boundary: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let value = boundary.format(TIMESTAMP_FORMAT).to_string();

        let updated = conn.execute(
            r#"
            UPDATE import_boundary SET boundary_time = ?1
            WHERE id = (SELECT id FROM import_boundary ORDER BY id LIMIT 1)
            "#,
            params![value],
        )?;

        if updated == 0 {
            conn.execute(
                "INSERT INTO import_boundary (boundary_time) VALUES (?1)",
                params![value],
            )?;
        }

        Ok(())
    }

    fn ensure_initialized(&self, initial: NaiveDateTime) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM import_boundary", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(false);
        }

        let value = initial.format(TIMESTAMP_FORMAT).to_string();
        conn.execute(
            "INSERT INTO import_boundary (boundary_time) VALUES (?1)",
            params![value],
        )?;
        info!(boundary = %value, "检查点表为空，已写入初始值");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use chrono::NaiveDate;

    fn create_repo() -> (CheckpointRepositoryImpl, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        (CheckpointRepositoryImpl::from_connection(conn.clone()), conn)
    }

    fn ts(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_empty_table_reads_none_and_first_write_inserts() {
        let (repo, conn) = create_repo();
        assert_eq!(repo.read_first().unwrap(), None);

        repo.upsert_first(ts(1, 8)).unwrap();
        repo.upsert_first(ts(2, 9)).unwrap();

        assert_eq!(repo.read_first().unwrap(), Some(ts(2, 9)));
        let rows: i64 = conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM import_boundary", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_multiple_rows_always_use_first() {
        let (repo, conn) = create_repo();
        {
            let c = conn.lock().unwrap();
            c.execute(
                "INSERT INTO import_boundary (boundary_time) VALUES ('2024-01-01 00:00:00')",
                [],
            )
            .unwrap();
            c.execute(
                "INSERT INTO import_boundary (boundary_time) VALUES ('2024-02-01 00:00:00')",
                [],
            )
            .unwrap();
        }

        repo.upsert_first(ts(3, 0)).unwrap();
        assert_eq!(repo.read_first().unwrap(), Some(ts(3, 0)));

        let second: String = conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT boundary_time FROM import_boundary ORDER BY id DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(second, "2024-02-01 00:00:00");
    }

    #[test]
    fn test_ensure_initialized_only_when_empty() {
        let (repo, _conn) = create_repo();
        assert!(repo.ensure_initialized(ts(1, 0)).unwrap());
        assert!(!repo.ensure_initialized(ts(9, 0)).unwrap());
        assert_eq!(repo.read_first().unwrap(), Some(ts(1, 0)));
    }
}
