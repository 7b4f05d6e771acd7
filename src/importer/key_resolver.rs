// ==========================================
// 产品登记同步系统 - 批量编码解析器
// ==========================================
// 职责: 候选编码 → 登记库中已存在记录的当前字段值
// 规则:
// - 按块查询（每块最多 chunk_size 个编码，默认 20）
// - 单块失败: 记录并跳过，该块编码按"不存在"处理
// ==========================================

use crate::config::DEFAULT_LOOKUP_CHUNK_SIZE;
use crate::domain::product::ProductRecord;
use crate::repository::product_repo::ProductRepository;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// 查询失败的编码块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedChunk {
    pub index: usize,
    pub keys: Vec<String>,
    pub error: String,
    /// 连接级失败（登记库中途断开）
    pub connectivity: bool,
}

/// 解析结果
#[derive(Debug, Clone, Default)]
pub struct ResolvedKeys {
    /// 已存在的编码 → 当前记录
    pub existing: HashMap<String, ProductRecord>,
    pub failed_chunks: Vec<FailedChunk>,
    pub chunk_count: usize,
}

impl ResolvedKeys {
    /// 因查询失败而未能确认的编码
    pub fn unresolved_keys(&self) -> impl Iterator<Item = &String> {
        self.failed_chunks.iter().flat_map(|c| c.keys.iter())
    }

    /// 第一个因连接中断而失败的编码块
    pub fn connectivity_failure(&self) -> Option<&FailedChunk> {
        self.failed_chunks.iter().find(|c| c.connectivity)
    }
}

// ==========================================
// KeyResolver
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct KeyResolver {
    chunk_size: usize,
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_CHUNK_SIZE)
    }
}

impl KeyResolver {
    /// chunk_size 为 0 时按 1 处理
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 解析候选编码
    ///
    /// # 参数
    /// - keys: 候选编码（允许重复，按首次出现去重）
    pub fn resolve<R>(&self, repo: &R, keys: &[String]) -> ResolvedKeys
    where
        R: ProductRepository + ?Sized,
    {
        let mut seen = HashSet::new();
        let unique: Vec<String> = keys
            .iter()
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect();

        let mut resolved = ResolvedKeys::default();

        for (index, chunk) in unique.chunks(self.chunk_size).enumerate() {
            resolved.chunk_count += 1;
            match repo.find_by_codes(chunk) {
                Ok(records) => {
                    debug!(chunk = index, requested = chunk.len(), found = records.len(), "编码块查询完成");
                    for record in records {
                        resolved.existing.insert(record.product_code.clone(), record);
                    }
                }
                Err(e) => {
                    warn!(chunk = index, keys = chunk.len(), error = %e, "编码块查询失败，按不存在处理");
                    resolved.failed_chunks.push(FailedChunk {
                        index,
                        keys: chunk.to_vec(),
                        error: e.to_string(),
                        connectivity: e.is_connectivity(),
                    });
                }
            }
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::FieldValues;
    use crate::domain::reconcile::InsertCandidate;
    use crate::repository::error::{RepositoryError, RepositoryResult};
    use std::sync::Mutex;

    /// 记录每次查询块大小的内存仓储
    #[derive(Default)]
    struct RecordingRepo {
        stored: Vec<String>,
        calls: Mutex<Vec<usize>>,
        fail_call: Option<usize>,
    }

    impl ProductRepository for RecordingRepo {
        fn find_by_codes(&self, codes: &[String]) -> RepositoryResult<Vec<ProductRecord>> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(codes.len());
            if self.fail_call == Some(calls.len() - 1) {
                return Err(RepositoryError::DatabaseQueryError("boom".into()));
            }
            Ok(codes
                .iter()
                .filter(|c| self.stored.contains(c))
                .map(|c| ProductRecord::new(c.clone()))
                .collect())
        }

        fn insert_batch(&self, _records: &[InsertCandidate]) -> RepositoryResult<usize> {
            unimplemented!()
        }

        fn update_fields(&self, _code: &str, _fields: &FieldValues) -> RepositoryResult<usize> {
            unimplemented!()
        }

        fn count_products(&self) -> RepositoryResult<usize> {
            Ok(self.stored.len())
        }
    }

    fn codes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("P{:03}", i)).collect()
    }

    #[test]
    fn test_chunks_never_exceed_limit() {
        let repo = RecordingRepo::default();
        let resolved = KeyResolver::new(20).resolve(&repo, &codes(41));

        assert_eq!(*repo.calls.lock().unwrap(), vec![20, 20, 1]);
        assert_eq!(resolved.chunk_count, 3);
    }

    #[test]
    fn test_empty_input_issues_no_query() {
        let repo = RecordingRepo::default();
        let resolved = KeyResolver::default().resolve(&repo, &[]);

        assert!(repo.calls.lock().unwrap().is_empty());
        assert!(resolved.existing.is_empty());
    }

    #[test]
    fn test_duplicates_are_queried_once() {
        let repo = RecordingRepo {
            stored: vec!["A".to_string()],
            ..Default::default()
        };
        let keys = vec!["A".to_string(), "A".to_string(), "B".to_string()];
        let resolved = KeyResolver::new(20).resolve(&repo, &keys);

        assert_eq!(*repo.calls.lock().unwrap(), vec![2]);
        assert!(resolved.existing.contains_key("A"));
        assert!(!resolved.existing.contains_key("B"));
    }

    #[test]
    fn test_failed_chunk_keys_treated_as_not_found() {
        let all = codes(45);
        let repo = RecordingRepo {
            stored: all.clone(),
            fail_call: Some(1),
            ..Default::default()
        };
        let resolved = KeyResolver::new(20).resolve(&repo, &all);

        assert_eq!(resolved.existing.len(), 25);
        assert_eq!(resolved.failed_chunks.len(), 1);
        assert_eq!(resolved.failed_chunks[0].index, 1);
        assert_eq!(resolved.unresolved_keys().count(), 20);
        assert!(!resolved.existing.contains_key("P020"));
        // 普通查询错误不视为连接中断
        assert!(resolved.connectivity_failure().is_none());
    }

    #[test]
    fn test_zero_chunk_size_is_guarded() {
        assert_eq!(KeyResolver::new(0).chunk_size(), 1);
    }
}
