// ==========================================
// 产品登记同步系统 - 登记库 Repository Trait
// ==========================================
// 职责: 定义规范登记库的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含对账规则，只做数据 CRUD
// ==========================================

use crate::domain::product::{FieldValues, ProductRecord};
use crate::domain::reconcile::InsertCandidate;
use crate::repository::error::RepositoryResult;
use std::sync::Arc;

// ==========================================
// ProductRepository Trait
// ==========================================
// 用途: 对账引擎消费的登记库查询面
// 实现者: ProductRepositoryImpl（使用 rusqlite）
pub trait ProductRepository: Send + Sync {
    /// 按编码集合查询（`product_code IN (...)`）
    ///
    /// # 返回
    /// - 仅包含库中存在的记录，顺序不保证
    fn find_by_codes(&self, codes: &[String]) -> RepositoryResult<Vec<ProductRecord>>;

    /// 单条语句多行新增
    ///
    /// # 说明
    /// - 语句级原子：任一行冲突则整条语句失败，不会部分写入
    /// - 自动提交，不跨语句开启事务
    fn insert_batch(&self, records: &[InsertCandidate]) -> RepositoryResult<usize>;

    /// 单条新增
    fn insert_one(&self, record: &InsertCandidate) -> RepositoryResult<()> {
        self.insert_batch(std::slice::from_ref(record)).map(|_| ())
    }

    /// 按编码更新指定字段集合
    ///
    /// # 返回
    /// - Ok(n): 受影响行数
    /// - Err(NotFound): 编码不存在
    fn update_fields(&self, product_code: &str, fields: &FieldValues) -> RepositoryResult<usize>;

    /// 统计 products 表记录数
    fn count_products(&self) -> RepositoryResult<usize>;
}

impl<T: ProductRepository + ?Sized> ProductRepository for Arc<T> {
    fn find_by_codes(&self, codes: &[String]) -> RepositoryResult<Vec<ProductRecord>> {
        (**self).find_by_codes(codes)
    }

    fn insert_batch(&self, records: &[InsertCandidate]) -> RepositoryResult<usize> {
        (**self).insert_batch(records)
    }

    fn insert_one(&self, record: &InsertCandidate) -> RepositoryResult<()> {
        (**self).insert_one(record)
    }

    fn update_fields(&self, product_code: &str, fields: &FieldValues) -> RepositoryResult<usize> {
        (**self).update_fields(product_code, fields)
    }

    fn count_products(&self) -> RepositoryResult<usize> {
        (**self).count_products()
    }
}
