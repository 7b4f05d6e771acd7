// ==========================================
// 产品登记同步系统 - 登记库 Repository 实现
// ==========================================
// 职责: 实现登记库数据访问（使用 rusqlite）
// 约定: 每条语句自动提交，不使用跨记录事务
// ==========================================

use crate::config::EndpointConfig;
use crate::db::open_endpoint;
use crate::domain::product::{FieldValues, ProductField, ProductRecord};
use crate::domain::reconcile::InsertCandidate;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::product_repo::ProductRepository;
use rusqlite::{params, params_from_iter, Connection};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str =
    "product_code, product_model, semi_finished_inspection_time, finished_inspection_time";

// ==========================================
// ProductRepositoryImpl
// ==========================================
pub struct ProductRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ProductRepositoryImpl {
    /// 按端点配置打开登记库
    ///
    /// # 参数
    /// - endpoint: 登记库端点（路径 + 连接超时）
    pub fn open(endpoint: &EndpointConfig) -> RepositoryResult<Self> {
        let conn = open_endpoint(endpoint).map_err(|e| {
            RepositoryError::DatabaseConnectionError(format!("{}: {}", endpoint.db_path, e))
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductRecord> {
        Ok(ProductRecord {
            product_code: row.get(0)?,
            product_model: row.get(1)?,
            semi_finished_inspection_time: row.get(2)?,
            finished_inspection_time: row.get(3)?,
        })
    }
}

impl ProductRepository for ProductRepositoryImpl {
    fn find_by_codes(&self, codes: &[String]) -> RepositoryResult<Vec<ProductRecord>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;

        // 构建 IN 子句的占位符
        let placeholders = codes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT {} FROM products WHERE product_code IN ({})",
            SELECT_COLUMNS, placeholders
        );

        let mut stmt = conn.prepare(&query)?;
        let records = stmt
            .query_map(params_from_iter(codes.iter()), Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn insert_batch(&self, records: &[InsertCandidate]) -> RepositoryResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.get_conn()?;

        // 多行 VALUES：未提供的字段写 NULL，保证所有行列集一致
        let row_placeholder = "(?, ?, ?, ?)";
        let values = records
            .iter()
            .map(|_| row_placeholder)
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!("INSERT INTO products ({}) VALUES {}", SELECT_COLUMNS, values);

        let mut bind: Vec<Option<String>> = Vec::with_capacity(records.len() * 4);
        for record in records {
            bind.push(Some(record.product_code.clone()));
            for field in ProductField::ALL {
                bind.push(record.fields.get(&field).cloned());
            }
        }

        let inserted = conn.execute(&query, params_from_iter(bind.iter()))?;
        Ok(inserted)
    }

    fn update_fields(&self, product_code: &str, fields: &FieldValues) -> RepositoryResult<usize> {
        if fields.is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "fields".to_string(),
                message: format!("更新字段为空: {}", product_code),
            });
        }

        let conn = self.get_conn()?;

        let set_clause = fields
            .keys()
            .enumerate()
            .map(|(idx, field)| format!("{} = ?{}", field.column(), idx + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "UPDATE products SET {} WHERE product_code = ?{}",
            set_clause,
            fields.len() + 1
        );

        let mut bind: Vec<&str> = fields.values().map(String::as_str).collect();
        bind.push(product_code);

        let affected = conn.execute(&query, params_from_iter(bind.iter()))?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "product".to_string(),
                id: product_code.to_string(),
            });
        }

        Ok(affected)
    }

    fn count_products(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", params![], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}
