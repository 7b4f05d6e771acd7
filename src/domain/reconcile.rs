// ==========================================
// 产品登记同步系统 - 对账结果领域模型
// ==========================================
// 职责: 分类/写入/校验各阶段的结果结构与运行汇总
// ==========================================

use crate::domain::product::{FieldValues, ProductField};
use serde::{Deserialize, Serialize};

// ==========================================
// PipelineKind - 管道类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// 表格 → 登记库（仅型号）
    Spreadsheet,
    /// 旧系统 A → 登记库（半成品检验时间 + 型号覆盖）
    SemiFinishedInspection,
    /// 旧系统 B → 登记库（成品检验时间，型号仅新增时写入）
    FinishedInspection,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::Spreadsheet => "spreadsheet",
            PipelineKind::SemiFinishedInspection => "semi_finished_inspection",
            PipelineKind::FinishedInspection => "finished_inspection",
        }
    }
}

/// 聚合后的单个产品源数据（每字段取最新观测）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub product_code: String,
    pub fields: FieldValues,
}

/// 新增候选
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertCandidate {
    pub product_code: String,
    pub fields: FieldValues,
}

/// 更新候选（字段集合由候选自身决定）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCandidate {
    pub product_code: String,
    pub fields: FieldValues,
}

/// 字段冲突
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub product_code: String,
    pub field: ProductField,
    pub existing_value: Option<String>,
    pub new_value: String,
}

/// 分类结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// 登记库中不存在的编码
    pub new_records: Vec<InsertCandidate>,
    /// 存在且所有自有字段一致（或源为空）的编码
    pub unchanged: Vec<String>,
    /// 存在但至少一个自有字段不同的字段级冲突
    pub conflicts: Vec<ConflictRecord>,
    /// 不存在且没有任何可写入字段的编码
    pub empty_new: Vec<String>,
}

impl Classification {
    /// 发生冲突的编码数（去重）
    pub fn conflicting_codes(&self) -> usize {
        let mut codes: Vec<&str> = self
            .conflicts
            .iter()
            .map(|c| c.product_code.as_str())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes.len()
    }
}

/// 单条写入失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub product_code: String,
    pub reason: String,
    /// 连接级失败（登记库中途断开）
    #[serde(default)]
    pub connectivity: bool,
}

/// 新增执行结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertReport {
    pub inserted: Vec<InsertCandidate>,
    /// 唯一约束冲突被视为"已存在"跳过
    pub skipped_existing: Vec<String>,
    pub failed: Vec<WriteFailure>,
    /// 降级为逐条写入的批次数
    pub demoted_batches: usize,
}

/// 更新执行结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReport {
    pub updated: Vec<UpdateCandidate>,
    pub failed: Vec<WriteFailure>,
}

// ==========================================
// 写入校验
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// 回读时记录不存在
    Missing { product_code: String },
    /// 回读值与期望值不一致
    Mismatch {
        product_code: String,
        field: ProductField,
        expected: String,
        actual: Option<String>,
    },
    /// 回读查询失败，无法确认
    Unreadable { product_code: String, reason: String },
}

impl Discrepancy {
    pub fn product_code(&self) -> &str {
        match self {
            Discrepancy::Missing { product_code }
            | Discrepancy::Mismatch { product_code, .. }
            | Discrepancy::Unreadable { product_code, .. } => product_code,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub attempted: usize,
    pub verified: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty() && self.verified == self.attempted
    }
}

// ==========================================
// RunSummary - 单次对账运行汇总
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub pipeline: PipelineKind,
    /// 源原始行数
    pub source_rows: usize,
    /// 被丢弃的畸形源记录数
    pub malformed: usize,
    /// 聚合后的源编码数
    pub source_codes: usize,
    /// 登记库中已存在的编码数
    pub found: usize,
    pub new: usize,
    pub unchanged: usize,
    pub conflicting: usize,
    /// 策略是否应用冲突（无冲突时为 None）
    pub conflicts_applied: Option<bool>,
    /// 策略拒绝而保留原值的冲突
    pub retained_conflicts: Vec<ConflictRecord>,
    pub updated: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub skipped_codes: Vec<String>,
    pub failed_writes: Vec<WriteFailure>,
    /// 查询失败而按"不存在"处理的编码块数
    pub lookup_chunk_failures: usize,
    pub insert_verification: VerificationReport,
    pub update_verification: VerificationReport,
    pub checkpoint_advanced: bool,
    pub elapsed_ms: u128,
}

impl RunSummary {
    /// 已校验通过的写入总数
    pub fn verified(&self) -> usize {
        self.insert_verification.verified + self.update_verification.verified
    }
}
