// ==========================================
// 产品登记同步系统 - 操作员接口
// ==========================================
// 职责: 管道入口的唯一调用方
// - 表格导入（冲突由注入策略确认）
// - 设置导入边界
// - 增量导入检验数据（旧系统 A → 旧系统 B，顺序执行）
// - 连通性测试
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::checkpoint::{
    CheckpointOrigin, CheckpointReading, CheckpointStore, CheckpointWriteReport,
    LocalCheckpointRecord,
};
use crate::config::{ConnectionMode, SyncConfig};
use crate::db::open_endpoint;
use crate::domain::product::ProductField;
use crate::domain::reconcile::RunSummary;
use crate::importer::pipeline::{CheckpointAdvance, PipelineProfile, ReconciliationPipeline};
use crate::importer::resolution_policy::ConflictResolutionPolicy;
use crate::importer::source::{LegacyInspectionSource, SourceExtractor, SpreadsheetSource};
use crate::repository::checkpoint_repo::{CheckpointRepository, CheckpointRepositoryImpl};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::product_repo::ProductRepository;
use crate::repository::product_repo_impl::ProductRepositoryImpl;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// 连通性测试结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub connection_mode: ConnectionMode,
    pub db_path: String,
    pub product_count: usize,
    /// 当前检查点（含来源）
    pub checkpoint: Option<CheckpointReading>,
    /// 本次是否写入了初始检查点
    pub checkpoint_bootstrapped: bool,
    /// 各数据源可读性
    pub sources: Vec<SourceCheck>,
}

/// 单个数据源的可读性检查结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCheck {
    pub name: String,
    pub path: String,
    pub reachable: bool,
    /// 读取到的原始行数
    pub rows: Option<usize>,
    pub error: Option<String>,
}

impl SourceCheck {
    async fn run(name: &str, path: &str, source: &(dyn SourceExtractor + '_)) -> Self {
        match source.extract().await {
            Ok(batch) => Self {
                name: name.to_string(),
                path: path.to_string(),
                reachable: true,
                rows: Some(batch.total_rows),
                error: None,
            },
            Err(e) => {
                warn!(source = name, path, error = %e, "数据源不可读");
                Self {
                    name: name.to_string(),
                    path: path.to_string(),
                    reachable: false,
                    rows: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// 增量导入结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionImportReport {
    pub since: NaiveDate,
    pub semi_finished: RunSummary,
    pub finished: RunSummary,
}

/// 登记库不可达时的远端检查点占位（所有操作返回连接错误）
struct DisconnectedCheckpointRepository {
    reason: String,
}

impl CheckpointRepository for DisconnectedCheckpointRepository {
    fn read_first(&self) -> RepositoryResult<Option<NaiveDateTime>> {
        Err(RepositoryError::DatabaseConnectionError(self.reason.clone()))
    }

    fn upsert_first(&self, _boundary: NaiveDateTime) -> RepositoryResult<()> {
        Err(RepositoryError::DatabaseConnectionError(self.reason.clone()))
    }

    fn ensure_initialized(&self, _initial: NaiveDateTime) -> RepositoryResult<bool> {
        Err(RepositoryError::DatabaseConnectionError(self.reason.clone()))
    }
}

/// 单次操作打开的登记库连接
struct RegistryHandle {
    products: Arc<ProductRepositoryImpl>,
    checkpoint: CheckpointStore,
}

// ==========================================
// SyncApi
// ==========================================
pub struct SyncApi {
    config: SyncConfig,
}

impl SyncApi {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn local_record(&self) -> LocalCheckpointRecord {
        LocalCheckpointRecord::new(&self.config.local_checkpoint_path)
    }

    /// 打开当前模式的登记库（产品表与检查点表共用一个连接）
    fn open_registry(&self) -> ApiResult<RegistryHandle> {
        let endpoint = self.config.active_endpoint();
        let conn = open_endpoint(endpoint).map_err(|e| {
            ApiError::DatabaseConnectionError(format!("{}: {}", endpoint.db_path, e))
        })?;
        let conn = Arc::new(Mutex::new(conn));

        Ok(RegistryHandle {
            products: Arc::new(ProductRepositoryImpl::from_connection(conn.clone())),
            checkpoint: CheckpointStore::new(
                Arc::new(CheckpointRepositoryImpl::from_connection(conn)),
                self.local_record(),
            ),
        })
    }

    /// 检查点存储；登记库不可达时远端操作全部失败，由存储回退到本地副本
    fn checkpoint_store(&self) -> CheckpointStore {
        match self.open_registry() {
            Ok(handle) => handle.checkpoint,
            Err(e) => {
                warn!(error = %e, "登记库不可达，检查点仅使用本地副本");
                CheckpointStore::new(
                    Arc::new(DisconnectedCheckpointRepository {
                        reason: e.to_string(),
                    }),
                    self.local_record(),
                )
            }
        }
    }

    // ==========================================
    // 表格导入
    // ==========================================

    /// 表格 → 登记库（仅型号）
    ///
    /// # 参数
    /// - policy: 冲突处理策略（终端确认或预设决定）
    pub async fn import_spreadsheet(
        &self,
        policy: Box<dyn ConflictResolutionPolicy>,
    ) -> ApiResult<RunSummary> {
        let registry = self.open_registry()?;
        let source = SpreadsheetSource::new(self.config.spreadsheet.clone());
        let pipeline =
            ReconciliationPipeline::new(registry.products, PipelineProfile::spreadsheet(), policy)
                .with_config(&self.config);

        Ok(pipeline.run(&source, None).await?)
    }

    // ==========================================
    // 检查点
    // ==========================================

    /// 操作员设置导入边界（日期零点）
    pub fn set_checkpoint(&self, date: NaiveDate) -> ApiResult<CheckpointWriteReport> {
        let boundary = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ApiError::InvalidInput(format!("无效日期: {}", date)))?;
        let report = self
            .checkpoint_store()
            .write(boundary, CheckpointOrigin::Operator)?;
        info!(%date, primary_written = report.primary_written, "导入边界已设置");
        Ok(report)
    }

    /// 读取当前检查点
    pub fn current_checkpoint(&self) -> ApiResult<Option<CheckpointReading>> {
        Ok(self.checkpoint_store().read_with_source()?)
    }

    // ==========================================
    // 增量导入检验数据
    // ==========================================

    /// 旧系统 A（半成品）→ 旧系统 B（成品），顺序执行
    ///
    /// # 参数
    /// - since: 起始日期；None 时取当前检查点
    /// - record_checkpoint: 两个管道均成功后，将检查点推进到本次开始时间
    pub async fn import_inspections(
        &self,
        since: Option<NaiveDate>,
        record_checkpoint: bool,
    ) -> ApiResult<InspectionImportReport> {
        let started_at = Local::now().naive_local();
        let registry = self.open_registry()?;

        let since = match since {
            Some(date) => date,
            None => registry
                .checkpoint
                .read()?
                .map(|boundary| boundary.date())
                .ok_or_else(|| {
                    ApiError::InvalidInput("尚无导入边界，请指定起始日期".to_string())
                })?,
        };
        info!(%since, record_checkpoint, "开始增量导入检验数据");

        let semi_source = LegacyInspectionSource::new(
            &self.config.semi_finished_source,
            &self.config.staging_dir,
            ProductField::SemiFinishedInspectionTime,
            Some(since),
        );
        let semi_pipeline = ReconciliationPipeline::legacy(
            registry.products.clone(),
            PipelineProfile::semi_finished_inspection(),
        )
        .with_config(&self.config);
        let semi_finished = semi_pipeline.run(&semi_source, None).await?;

        let finished_source = LegacyInspectionSource::new(
            &self.config.finished_source,
            &self.config.staging_dir,
            ProductField::FinishedInspectionTime,
            Some(since),
        );
        let finished_pipeline = ReconciliationPipeline::legacy(
            registry.products.clone(),
            PipelineProfile::finished_inspection(),
        )
        .with_config(&self.config);
        let advance =
            record_checkpoint.then(|| CheckpointAdvance::at(&registry.checkpoint, started_at));
        let finished = finished_pipeline.run(&finished_source, advance).await?;

        Ok(InspectionImportReport {
            since,
            semi_finished,
            finished,
        })
    }

    // ==========================================
    // 连通性测试
    // ==========================================

    /// 测试当前模式的登记库连接与各数据源可读性；远端检查点表为空时写入当前时间
    ///
    /// # 返回
    /// - Err: 登记库不可达
    /// - Ok: 数据源不可读只记入报告，不视为失败
    pub async fn test_connection(&self) -> ApiResult<ConnectionReport> {
        let registry = self.open_registry()?;
        let product_count = registry.products.count_products()?;

        let now = Local::now().naive_local();
        let checkpoint_bootstrapped = match registry.checkpoint.bootstrap(now) {
            Ok(created) => created,
            Err(e) => {
                warn!(error = %e, "检查点初始化失败");
                false
            }
        };
        let checkpoint = registry.checkpoint.read_with_source()?;
        let sources = self.check_sources().await;

        let report = ConnectionReport {
            connection_mode: self.config.connection_mode,
            db_path: self.config.active_endpoint().db_path.clone(),
            product_count,
            checkpoint,
            checkpoint_bootstrapped,
            sources,
        };
        info!(
            mode = %report.connection_mode,
            product_count,
            checkpoint_bootstrapped,
            unreachable_sources = report.sources.iter().filter(|s| !s.reachable).count(),
            "登记库连接正常"
        );
        Ok(report)
    }

    /// 依次读取表格与两个旧系统导出（旧系统导出经暂存后读取，读完即删除暂存副本）
    async fn check_sources(&self) -> Vec<SourceCheck> {
        let spreadsheet = SpreadsheetSource::new(self.config.spreadsheet.clone());
        let semi_finished = LegacyInspectionSource::new(
            &self.config.semi_finished_source,
            &self.config.staging_dir,
            ProductField::SemiFinishedInspectionTime,
            None,
        );
        let finished = LegacyInspectionSource::new(
            &self.config.finished_source,
            &self.config.staging_dir,
            ProductField::FinishedInspectionTime,
            None,
        );

        vec![
            SourceCheck::run("spreadsheet", &self.config.spreadsheet.path, &spreadsheet).await,
            SourceCheck::run(
                "semi_finished",
                &self.config.semi_finished_source.export_path,
                &semi_finished,
            )
            .await,
            SourceCheck::run("finished", &self.config.finished_source.export_path, &finished)
                .await,
        ]
    }
}
