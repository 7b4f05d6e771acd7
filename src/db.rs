// ==========================================
// 产品登记同步系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有连接的 PRAGMA 与 busy_timeout（连接级超时）
// - 按端点配置决定是否允许创建新库，避免误连空库后全部记录被当作"新增"
// ==========================================

use crate::config::EndpointConfig;
use rusqlite::{Connection, OpenFlags};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置（不存在则创建）
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn, DEFAULT_BUSY_TIMEOUT_MS)?;
    Ok(conn)
}

/// 按端点配置打开登记库连接
///
/// - create_if_missing = false 时库文件必须已存在，否则返回 CannotOpen
/// - 创建新库时自动建表
pub fn open_endpoint(endpoint: &EndpointConfig) -> rusqlite::Result<Connection> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if endpoint.create_if_missing {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }

    let conn = Connection::open_with_flags(&endpoint.db_path, flags)?;
    configure_sqlite_connection(&conn, endpoint.connect_timeout_ms)?;

    if endpoint.create_if_missing {
        init_schema(&conn)?;
    }

    Ok(conn)
}

/// 建表（幂等）
///
/// - products: 规范产品登记表，product_code 为唯一身份（BINARY 排序，区分大小写）
/// - import_boundary: 导入边界检查点（逻辑上单行，始终读取/更新第一行）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            product_code TEXT PRIMARY KEY NOT NULL,
            product_model TEXT,
            semi_finished_inspection_time TEXT,
            finished_inspection_time TEXT
        );

        CREATE TABLE IF NOT EXISTS import_boundary (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            boundary_time TEXT
        );
        "#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_endpoint_without_create_fails_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let endpoint = EndpointConfig {
            db_path: dir.path().join("missing.db").display().to_string(),
            connect_timeout_ms: 100,
            create_if_missing: false,
        };

        assert!(open_endpoint(&endpoint).is_err());
    }

    #[test]
    fn test_open_endpoint_with_create_initializes_schema() {
        let dir = TempDir::new().unwrap();
        let endpoint = EndpointConfig {
            db_path: dir.path().join("registry.db").display().to_string(),
            connect_timeout_ms: 100,
            create_if_missing: true,
        };

        let conn = open_endpoint(&endpoint).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' \
                 AND name IN ('products', 'import_boundary')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);

        // 再次建表不报错
        init_schema(&conn).unwrap();
    }
}
