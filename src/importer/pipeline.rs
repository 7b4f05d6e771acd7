// ==========================================
// 产品登记同步系统 - 对账管道
// ==========================================
// 流程: 抽取 → 聚合 → 连通性探测 → 编码解析 → 分类 → (确认) → 写入 → 校验 → (检查点)
// 变体:
// - 表格:       新增写型号；仅型号可覆盖；冲突由注入策略决定（通常为人工确认）
// - 旧系统 A:   新增写半成品检验时间 + 型号；两者均可覆盖；自动覆盖
// - 旧系统 B:   新增写成品检验时间 + 型号；仅成品检验时间可覆盖；自动覆盖
// 约定: 同一次运行内顺序执行；零新增零变更视为成功
// ==========================================

use crate::checkpoint::{CheckpointOrigin, CheckpointStore};
use crate::config::SyncConfig;
use crate::domain::product::ProductField;
use crate::domain::reconcile::{ConflictRecord, PipelineKind, RunSummary, UpdateCandidate};
use crate::importer::aggregator::aggregate;
use crate::importer::conflict_classifier::{ConflictClassifier, FieldOwnership};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::key_resolver::KeyResolver;
use crate::importer::resolution_policy::{AutoApply, ConflictResolutionPolicy};
use crate::importer::source::SourceExtractor;
use crate::importer::write_executor::WriteExecutor;
use crate::importer::write_verifier::WriteVerifier;
use crate::repository::error::RepositoryError;
use crate::repository::product_repo::ProductRepository;
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// PipelineProfile - 管道变体
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineProfile {
    pub kind: PipelineKind,
    pub ownership: FieldOwnership,
}

impl PipelineProfile {
    pub fn spreadsheet() -> Self {
        Self {
            kind: PipelineKind::Spreadsheet,
            ownership: FieldOwnership {
                insertable: vec![ProductField::ProductModel],
                overwritable: vec![ProductField::ProductModel],
            },
        }
    }

    pub fn semi_finished_inspection() -> Self {
        Self {
            kind: PipelineKind::SemiFinishedInspection,
            ownership: FieldOwnership {
                insertable: vec![
                    ProductField::SemiFinishedInspectionTime,
                    ProductField::ProductModel,
                ],
                overwritable: vec![
                    ProductField::SemiFinishedInspectionTime,
                    ProductField::ProductModel,
                ],
            },
        }
    }

    pub fn finished_inspection() -> Self {
        Self {
            kind: PipelineKind::FinishedInspection,
            ownership: FieldOwnership {
                insertable: vec![
                    ProductField::FinishedInspectionTime,
                    ProductField::ProductModel,
                ],
                overwritable: vec![ProductField::FinishedInspectionTime],
            },
        }
    }

    pub fn for_kind(kind: PipelineKind) -> Self {
        match kind {
            PipelineKind::Spreadsheet => Self::spreadsheet(),
            PipelineKind::SemiFinishedInspection => Self::semi_finished_inspection(),
            PipelineKind::FinishedInspection => Self::finished_inspection(),
        }
    }
}

/// 运行结束后推进检查点
#[derive(Clone, Copy)]
pub struct CheckpointAdvance<'a> {
    pub store: &'a CheckpointStore,
    /// 写入的边界；None 时取本次运行开始时间
    pub boundary: Option<NaiveDateTime>,
}

impl<'a> CheckpointAdvance<'a> {
    pub fn at_run_start(store: &'a CheckpointStore) -> Self {
        Self {
            store,
            boundary: None,
        }
    }

    pub fn at(store: &'a CheckpointStore, boundary: NaiveDateTime) -> Self {
        Self {
            store,
            boundary: Some(boundary),
        }
    }
}

// ==========================================
// ReconciliationPipeline
// ==========================================
pub struct ReconciliationPipeline<R>
where
    R: ProductRepository,
{
    repo: R,
    profile: PipelineProfile,
    classifier: ConflictClassifier,
    resolver: KeyResolver,
    executor: WriteExecutor,
    verifier: WriteVerifier,
    policy: Box<dyn ConflictResolutionPolicy>,
}

impl<R> ReconciliationPipeline<R>
where
    R: ProductRepository,
{
    /// 创建管道（默认批量参数）
    ///
    /// # 参数
    /// - repo: 登记库
    /// - profile: 管道变体
    /// - policy: 冲突处理策略
    pub fn new(repo: R, profile: PipelineProfile, policy: Box<dyn ConflictResolutionPolicy>) -> Self {
        let resolver = KeyResolver::default();
        Self {
            repo,
            classifier: ConflictClassifier::new(profile.ownership.clone()),
            profile,
            resolver,
            executor: WriteExecutor::default(),
            verifier: WriteVerifier::new(resolver),
            policy,
        }
    }

    /// 旧系统管道（自动覆盖）
    pub fn legacy(repo: R, profile: PipelineProfile) -> Self {
        Self::new(repo, profile, Box::new(AutoApply))
    }

    /// 设置批量参数
    pub fn with_batch_sizes(mut self, lookup_chunk_size: usize, insert_batch_size: usize) -> Self {
        self.resolver = KeyResolver::new(lookup_chunk_size);
        self.verifier = WriteVerifier::new(self.resolver);
        self.executor = WriteExecutor::new(insert_batch_size);
        self
    }

    /// 按同步配置设置批量参数
    pub fn with_config(self, config: &SyncConfig) -> Self {
        self.with_batch_sizes(config.lookup_chunk_size, config.insert_batch_size)
    }

    pub fn kind(&self) -> PipelineKind {
        self.profile.kind
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// 交给冲突策略决定；等待终端输入的策略在多线程运行时上移出工作线程执行
    fn decide_conflicts(&self, conflicts: &[ConflictRecord]) -> bool {
        if self.policy.blocks_on_input() {
            let multi_thread = Handle::try_current()
                .map(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread)
                .unwrap_or(false);
            if multi_thread {
                return tokio::task::block_in_place(|| self.policy.decide(conflicts));
            }
        }
        self.policy.decide(conflicts)
    }

    /// 执行一次对账运行
    ///
    /// # 参数
    /// - source: 数据源
    /// - checkpoint: Some 时运行结束后推进检查点（默认取本次运行开始时间）
    ///
    /// # 返回
    /// - Ok(RunSummary): 运行汇总（单条写入失败不影响 Ok）
    /// - Err: 源不可读，或登记库不可达（含探测后连接中断），整次运行中止，检查点不推进
    #[instrument(skip(self, source, checkpoint), fields(pipeline = self.profile.kind.as_str(), run_id = tracing::field::Empty))]
    pub async fn run<S>(
        &self,
        source: &S,
        checkpoint: Option<CheckpointAdvance<'_>>,
    ) -> ImportResult<RunSummary>
    where
        S: SourceExtractor + ?Sized,
    {
        let start_time = Instant::now();
        let started_at = Local::now().naive_local();
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        info!(run_id = %run_id, source = %source.describe(), "开始对账运行");

        // === 步骤 1: 抽取 ===
        let batch = source.extract().await.map_err(|e| {
            error!(error = %e, "数据源读取失败，运行中止");
            e
        })?;

        // === 步骤 2: 聚合 ===
        let aggregated = aggregate(&batch);
        debug!(codes = aggregated.len(), "源记录聚合完成");

        // === 步骤 3: 连通性探测 ===
        let store_size = self.repo.count_products().map_err(|e| {
            error!(error = %e, "登记库不可达，运行中止");
            ImportError::StoreUnavailable(e)
        })?;
        debug!(store_size, "登记库连通");

        // === 步骤 4: 编码解析 ===
        let keys: Vec<String> = aggregated.iter().map(|r| r.product_code.clone()).collect();
        let resolved = self.resolver.resolve(&self.repo, &keys);
        info!(
            requested = keys.len(),
            found = resolved.existing.len(),
            failed_chunks = resolved.failed_chunks.len(),
            "编码解析完成"
        );
        if let Some(chunk) = resolved.connectivity_failure() {
            error!(chunk = chunk.index, error = %chunk.error, "编码解析时登记库连接中断，运行中止");
            return Err(ImportError::StoreUnavailable(
                RepositoryError::DatabaseConnectionError(chunk.error.clone()),
            ));
        }

        // === 步骤 5: 分类 ===
        let classification = self.classifier.classify(&aggregated, &resolved.existing);
        if !classification.empty_new.is_empty() {
            debug!(count = classification.empty_new.len(), "新编码无可写入字段，忽略");
        }

        // === 步骤 6: 冲突确认 ===
        let (conflicts_applied, updates, retained_conflicts) = if classification.conflicts.is_empty() {
            (None, Vec::new(), Vec::new())
        } else {
            let apply = self.decide_conflicts(&classification.conflicts);
            info!(
                policy = self.policy.name(),
                apply,
                conflicts = classification.conflicts.len(),
                "冲突处理决定"
            );
            if apply {
                (Some(true), Self::updates_from(&classification.conflicts), Vec::new())
            } else {
                (Some(false), Vec::new(), classification.conflicts.clone())
            }
        };

        // === 步骤 7: 写入（先更新后新增） ===
        let update_report = self.executor.execute_updates(&self.repo, &updates);
        let insert_report = self
            .executor
            .execute_inserts(&self.repo, &classification.new_records);
        if let Some(failure) = update_report
            .failed
            .iter()
            .chain(insert_report.failed.iter())
            .find(|f| f.connectivity)
        {
            error!(
                product_code = %failure.product_code,
                error = %failure.reason,
                updated = update_report.updated.len(),
                inserted = insert_report.inserted.len(),
                "写入时登记库连接中断，运行中止，检查点不推进"
            );
            return Err(ImportError::StoreUnavailable(
                RepositoryError::DatabaseConnectionError(failure.reason.clone()),
            ));
        }

        // === 步骤 8: 校验 ===
        let update_verification = self.verifier.verify_updates(&self.repo, &update_report.updated);
        let insert_verification = self.verifier.verify_inserts(&self.repo, &insert_report.inserted);

        // === 步骤 9: 检查点 ===
        let checkpoint_advanced = match checkpoint {
            Some(advance) => match advance
                .store
                .write(advance.boundary.unwrap_or(started_at), CheckpointOrigin::Automatic)
            {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "检查点推进失败");
                    false
                }
            },
            None => false,
        };

        let mut failed_writes = update_report.failed;
        failed_writes.extend(insert_report.failed);

        let summary = RunSummary {
            run_id: run_id.clone(),
            pipeline: self.profile.kind,
            source_rows: batch.total_rows,
            malformed: batch.malformed_rows,
            source_codes: aggregated.len(),
            found: resolved.existing.len(),
            new: classification.new_records.len(),
            unchanged: classification.unchanged.len(),
            conflicting: classification.conflicting_codes(),
            conflicts_applied,
            retained_conflicts,
            updated: update_report.updated.len(),
            inserted: insert_report.inserted.len(),
            skipped: insert_report.skipped_existing.len(),
            skipped_codes: insert_report.skipped_existing,
            failed_writes,
            lookup_chunk_failures: resolved.failed_chunks.len(),
            insert_verification,
            update_verification,
            checkpoint_advanced,
            elapsed_ms: start_time.elapsed().as_millis(),
        };

        info!(
            run_id = %run_id,
            found = summary.found,
            new = summary.new,
            conflicting = summary.conflicting,
            updated = summary.updated,
            inserted = summary.inserted,
            skipped = summary.skipped,
            verified = summary.verified(),
            failed = summary.failed_writes.len(),
            malformed = summary.malformed,
            elapsed_ms = summary.elapsed_ms as u64,
            "对账运行完成"
        );

        Ok(summary)
    }

    /// 冲突 → 更新候选（同编码多字段合并为一条）
    fn updates_from(conflicts: &[ConflictRecord]) -> Vec<UpdateCandidate> {
        let mut merged: BTreeMap<&str, UpdateCandidate> = BTreeMap::new();
        let mut order: Vec<&str> = Vec::new();
        for conflict in conflicts {
            let entry = merged
                .entry(conflict.product_code.as_str())
                .or_insert_with(|| {
                    order.push(conflict.product_code.as_str());
                    UpdateCandidate {
                        product_code: conflict.product_code.clone(),
                        fields: Default::default(),
                    }
                });
            entry.fields.insert(conflict.field, conflict.new_value.clone());
        }
        order
            .into_iter()
            .filter_map(|code| merged.remove(code))
            .collect()
    }
}
