// ==========================================
// 产品登记同步系统 - 导入与对账层
// ==========================================
// 职责: 外部数据源抽取 + 对账引擎（解析/分类/策略/写入/校验）
// ==========================================

pub mod aggregator;
pub mod conflict_classifier;
pub mod error;
pub mod file_parser;
pub mod key_resolver;
pub mod pipeline;
pub mod resolution_policy;
pub mod source;
pub mod write_executor;
pub mod write_verifier;

pub use aggregator::aggregate;
pub use conflict_classifier::{ConflictClassifier, FieldOwnership};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, UniversalFileParser};
pub use key_resolver::{FailedChunk, KeyResolver, ResolvedKeys};
pub use pipeline::{CheckpointAdvance, PipelineProfile, ReconciliationPipeline};
pub use resolution_policy::{
    AutoApply, ConflictResolutionPolicy, InteractiveConfirmation, NewerTimestampsOnly,
    RetainExisting,
};
pub use source::{LegacyInspectionSource, SourceExtractor, SpreadsheetSource};
pub use write_executor::WriteExecutor;
pub use write_verifier::WriteVerifier;
