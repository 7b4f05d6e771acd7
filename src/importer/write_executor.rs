// ==========================================
// 产品登记同步系统 - 写入执行器
// ==========================================
// 新增: 按批多行插入；整批失败 → 降级为逐条插入
//       逐条唯一约束冲突 → 视为"已存在"跳过；其他错误 → 记录并丢弃
// 更新: 每个候选一条 UPDATE，失败不阻断后续记录
// 约定: 每条语句自动提交，不跨记录开启事务（允许部分成功）
// ==========================================

use crate::config::DEFAULT_INSERT_BATCH_SIZE;
use crate::domain::reconcile::{
    InsertCandidate, InsertReport, UpdateCandidate, UpdateReport, WriteFailure,
};
use crate::repository::product_repo::ProductRepository;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct WriteExecutor {
    insert_batch_size: usize,
}

impl Default for WriteExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_INSERT_BATCH_SIZE)
    }
}

impl WriteExecutor {
    pub fn new(insert_batch_size: usize) -> Self {
        Self {
            insert_batch_size: insert_batch_size.max(1),
        }
    }

    /// 执行新增
    pub fn execute_inserts<R>(&self, repo: &R, candidates: &[InsertCandidate]) -> InsertReport
    where
        R: ProductRepository + ?Sized,
    {
        let mut report = InsertReport::default();

        for (batch_idx, batch) in candidates.chunks(self.insert_batch_size).enumerate() {
            match repo.insert_batch(batch) {
                Ok(count) => {
                    debug!(batch = batch_idx, count, "批量新增成功");
                    report.inserted.extend_from_slice(batch);
                }
                Err(e) => {
                    warn!(batch = batch_idx, size = batch.len(), error = %e, "批量新增失败，降级为逐条新增");
                    report.demoted_batches += 1;
                    self.insert_one_by_one(repo, batch, &mut report);
                }
            }
        }

        info!(
            inserted = report.inserted.len(),
            skipped = report.skipped_existing.len(),
            failed = report.failed.len(),
            demoted_batches = report.demoted_batches,
            "新增执行完成"
        );
        report
    }

    fn insert_one_by_one<R>(&self, repo: &R, batch: &[InsertCandidate], report: &mut InsertReport)
    where
        R: ProductRepository + ?Sized,
    {
        for candidate in batch {
            match repo.insert_one(candidate) {
                Ok(()) => report.inserted.push(candidate.clone()),
                Err(e) if e.is_unique_violation() => {
                    debug!(product_code = %candidate.product_code, "编码已存在，跳过");
                    report.skipped_existing.push(candidate.product_code.clone());
                }
                Err(e) => {
                    warn!(product_code = %candidate.product_code, error = %e, "单条新增失败");
                    report.failed.push(WriteFailure {
                        product_code: candidate.product_code.clone(),
                        reason: e.to_string(),
                        connectivity: e.is_connectivity(),
                    });
                }
            }
        }
    }

    /// 执行更新
    pub fn execute_updates<R>(&self, repo: &R, candidates: &[UpdateCandidate]) -> UpdateReport
    where
        R: ProductRepository + ?Sized,
    {
        let mut report = UpdateReport::default();

        for candidate in candidates {
            match repo.update_fields(&candidate.product_code, &candidate.fields) {
                Ok(_) => report.updated.push(candidate.clone()),
                Err(e) => {
                    warn!(product_code = %candidate.product_code, error = %e, "单条更新失败");
                    report.failed.push(WriteFailure {
                        product_code: candidate.product_code.clone(),
                        reason: e.to_string(),
                        connectivity: e.is_connectivity(),
                    });
                }
            }
        }

        info!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            "更新执行完成"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::product::{FieldValues, ProductField};
    use crate::repository::product_repo_impl::ProductRepositoryImpl;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn create_repo() -> ProductRepositoryImpl {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ProductRepositoryImpl::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn candidate(code: &str, model: &str) -> InsertCandidate {
        let mut fields = FieldValues::new();
        fields.insert(ProductField::ProductModel, model.to_string());
        InsertCandidate {
            product_code: code.to_string(),
            fields,
        }
    }

    #[test]
    fn test_clean_batches_insert_without_demotion() {
        let repo = create_repo();
        let candidates: Vec<_> = (0..5).map(|i| candidate(&format!("P{}", i), "X")).collect();

        let report = WriteExecutor::new(2).execute_inserts(&repo, &candidates);

        assert_eq!(report.inserted.len(), 5);
        assert_eq!(report.demoted_batches, 0);
        assert_eq!(repo.count_products().unwrap(), 5);
    }

    #[test]
    fn test_duplicate_in_batch_demotes_and_skips() {
        let repo = create_repo();
        repo.insert_one(&candidate("B", "OLD")).unwrap();

        let report = WriteExecutor::new(100).execute_inserts(
            &repo,
            &[candidate("A", "X"), candidate("B", "X"), candidate("C", "X")],
        );

        assert_eq!(report.demoted_batches, 1);
        assert_eq!(report.inserted.len(), 2);
        assert_eq!(report.skipped_existing, vec!["B".to_string()]);
        assert!(report.failed.is_empty());
        assert_eq!(repo.count_products().unwrap(), 3);
    }

    #[test]
    fn test_update_missing_record_is_reported_and_others_continue() {
        let repo = create_repo();
        repo.insert_one(&candidate("A", "X1")).unwrap();

        let mut fields = FieldValues::new();
        fields.insert(ProductField::ProductModel, "X2".to_string());
        let updates = vec![
            UpdateCandidate {
                product_code: "MISSING".to_string(),
                fields: fields.clone(),
            },
            UpdateCandidate {
                product_code: "A".to_string(),
                fields,
            },
        ];

        let report = WriteExecutor::default().execute_updates(&repo, &updates);

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].product_code, "MISSING");
        assert_eq!(report.updated.len(), 1);
        let stored = repo.find_by_codes(&["A".to_string()]).unwrap();
        assert_eq!(stored[0].product_model.as_deref(), Some("X2"));
    }
}
