// ==========================================
// 产品登记同步系统 - 数据源抽取
// ==========================================
// 职责: 外部数据源 → SourceBatch（只做解析与过滤，不含对账逻辑）
// 实现:
// - SpreadsheetSource: 表格导出（编码 + 型号）
// - LegacyInspectionSource: 旧系统检验表导出（出厂编号 + 测试时间 + 电机型号）
// ==========================================

use crate::config::{LegacySourceConfig, SpreadsheetSourceConfig};
use crate::domain::product::{is_empty_value, ProductField};
use crate::domain::source::{
    derive_product_code, normalize_timestamp, parse_timestamp, ObservedAt, SourceBatch,
    SourceRecord,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{CsvParser, FileParser, RawRow, UniversalFileParser};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 旧系统检验表列名
pub mod legacy_columns {
    pub const SERIAL: &str = "出厂编号";
    pub const TEST_TIME: &str = "测试时间";
    pub const MODEL: &str = "电机型号";
    pub const RESULT: &str = "测试结果";
    pub const TEST_DATE: &str = "测试日期";
}

/// 合格判定值
pub const PASSED_RESULT: &str = "测试合格";

// ==========================================
// SourceExtractor Trait
// ==========================================
#[async_trait]
pub trait SourceExtractor: Send + Sync {
    /// 数据源描述（用于日志）
    fn describe(&self) -> String;

    /// 抽取源记录
    ///
    /// # 返回
    /// - Err: 源不可读，整次运行中止
    async fn extract(&self) -> ImportResult<SourceBatch>;
}

fn cell<'a>(row: &'a RawRow, column: &str) -> Option<&'a str> {
    row.get(column)
        .map(|v| v.trim())
        .filter(|v| !is_empty_value(Some(*v)))
}

fn require_columns(rows: &[RawRow], columns: &[&str]) -> ImportResult<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    for column in columns {
        if !first.contains_key(*column) {
            return Err(ImportError::MissingColumn(column.to_string()));
        }
    }
    Ok(())
}

// ==========================================
// SpreadsheetSource - 表格导出
// ==========================================
pub struct SpreadsheetSource {
    config: SpreadsheetSourceConfig,
}

impl SpreadsheetSource {
    pub fn new(config: SpreadsheetSourceConfig) -> Self {
        Self { config }
    }

    /// 原始行 → 源批次
    pub fn rows_to_batch(&self, rows: &[RawRow]) -> SourceBatch {
        let mut batch = SourceBatch {
            total_rows: rows.len(),
            ..Default::default()
        };

        for (idx, row) in rows.iter().enumerate() {
            let Some(code) = cell(row, &self.config.code_column) else {
                debug!(row = idx + 1, "缺少产品编码，丢弃");
                batch.malformed_rows += 1;
                continue;
            };

            batch.observed_codes.push(code.to_string());
            if let Some(model) = cell(row, &self.config.model_column) {
                // 表格无观测时间，同编码多行时以靠后的行为准
                batch.records.push(SourceRecord::new(
                    code,
                    ProductField::ProductModel,
                    model,
                    ObservedAt::default(),
                ));
            }
        }

        batch
    }
}

#[async_trait]
impl SourceExtractor for SpreadsheetSource {
    fn describe(&self) -> String {
        format!("spreadsheet:{}", self.config.path)
    }

    #[instrument(skip(self), fields(path = %self.config.path))]
    async fn extract(&self) -> ImportResult<SourceBatch> {
        let path = PathBuf::from(&self.config.path);
        let sheet_name = self.config.sheet_name.clone();

        let rows = tokio::task::spawn_blocking(move || {
            UniversalFileParser::new(sheet_name).parse_to_raw_records(&path)
        })
        .await??;

        require_columns(
            &rows,
            &[self.config.code_column.as_str(), self.config.model_column.as_str()],
        )?;

        let batch = self.rows_to_batch(&rows);
        info!(
            total_rows = batch.total_rows,
            records = batch.records.len(),
            malformed = batch.malformed_rows,
            "表格数据读取完成"
        );
        Ok(batch)
    }
}

// ==========================================
// LegacyInspectionSource - 旧系统检验表导出
// ==========================================
pub struct LegacyInspectionSource {
    export_path: PathBuf,
    staging_dir: PathBuf,
    /// 测试时间写入的目标字段
    time_field: ProductField,
    /// 起始日期（含）；None 表示不过滤
    since: Option<NaiveDate>,
}

impl LegacyInspectionSource {
    pub fn new(
        config: &LegacySourceConfig,
        staging_dir: impl Into<PathBuf>,
        time_field: ProductField,
        since: Option<NaiveDate>,
    ) -> Self {
        Self {
            export_path: PathBuf::from(&config.export_path),
            staging_dir: staging_dir.into(),
            time_field,
            since,
        }
    }

    /// 原始行 → 源批次
    ///
    /// # 过滤规则
    /// - 仅保留测试结果为"测试合格"的行
    /// - 仅保留测试日期 ≥ since 的行
    /// - 编码为空 / 测试时间为空 / 测试日期不可解析 → 畸形，丢弃并计数
    pub fn rows_to_batch(&self, rows: &[RawRow]) -> SourceBatch {
        use legacy_columns::*;

        let mut batch = SourceBatch {
            total_rows: rows.len(),
            ..Default::default()
        };

        for (idx, row) in rows.iter().enumerate() {
            if cell(row, RESULT) != Some(PASSED_RESULT) {
                continue;
            }

            let test_date = cell(row, TEST_DATE).and_then(parse_timestamp);
            let Some(test_date) = test_date else {
                debug!(row = idx + 1, "测试日期缺失或无法解析，丢弃");
                batch.malformed_rows += 1;
                continue;
            };
            if self.since.is_some_and(|since| test_date.date() < since) {
                continue;
            }

            let code = cell(row, SERIAL).map(derive_product_code).filter(|c| !c.is_empty());
            let (Some(code), Some(test_time)) = (code, cell(row, TEST_TIME)) else {
                debug!(row = idx + 1, "出厂编号或测试时间缺失，丢弃");
                batch.malformed_rows += 1;
                continue;
            };

            let observed_at = ObservedAt::new(test_time);
            batch.observed_codes.push(code.clone());
            batch.records.push(SourceRecord::new(
                code.clone(),
                self.time_field,
                normalize_timestamp(test_time),
                observed_at.clone(),
            ));
            if let Some(model) = cell(row, MODEL) {
                batch.records.push(SourceRecord::new(
                    code,
                    ProductField::ProductModel,
                    model,
                    observed_at,
                ));
            }
        }

        batch
    }

    /// 暂存源文件到本地目录
    async fn stage(&self) -> ImportResult<PathBuf> {
        if !tokio::fs::try_exists(&self.export_path).await.unwrap_or(false) {
            return Err(ImportError::FileNotFound(
                self.export_path.display().to_string(),
            ));
        }

        let file_name = self
            .export_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "legacy_export.csv".to_string());
        let staged = self
            .staging_dir
            .join(format!("{}_{}", Uuid::new_v4().simple(), file_name));

        let staging_error = |e: std::io::Error| ImportError::StagingError {
            path: staged.display().to_string(),
            message: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(staging_error)?;
        tokio::fs::copy(&self.export_path, &staged)
            .await
            .map_err(staging_error)?;

        debug!(from = %self.export_path.display(), to = %staged.display(), "源文件已暂存");
        Ok(staged)
    }

    async fn remove_staged(staged: &Path) {
        if let Err(e) = tokio::fs::remove_file(staged).await {
            warn!(path = %staged.display(), error = %e, "暂存文件删除失败");
        }
    }
}

#[async_trait]
impl SourceExtractor for LegacyInspectionSource {
    fn describe(&self) -> String {
        format!("legacy:{}:{}", self.time_field, self.export_path.display())
    }

    #[instrument(skip(self), fields(field = %self.time_field, since = ?self.since))]
    async fn extract(&self) -> ImportResult<SourceBatch> {
        let staged = self.stage().await?;

        let parse_path = staged.clone();
        let parsed = tokio::task::spawn_blocking(move || CsvParser.parse_to_raw_records(&parse_path))
            .await;
        Self::remove_staged(&staged).await;

        let rows = parsed??;
        use legacy_columns::*;
        require_columns(&rows, &[SERIAL, TEST_TIME, RESULT, TEST_DATE])?;

        let batch = self.rows_to_batch(&rows);
        info!(
            total_rows = batch.total_rows,
            records = batch.records.len(),
            malformed = batch.malformed_rows,
            "旧系统检验数据读取完成"
        );
        Ok(batch)
    }
}
