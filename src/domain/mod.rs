// ==========================================
// 产品登记同步系统 - 领域层
// ==========================================

pub mod product;
pub mod reconcile;
pub mod source;

pub use product::{is_empty_value, FieldValues, ProductField, ProductRecord};
pub use reconcile::{
    AggregatedRecord, Classification, ConflictRecord, Discrepancy, InsertCandidate, InsertReport,
    PipelineKind, RunSummary, UpdateCandidate, UpdateReport, VerificationReport, WriteFailure,
};
pub use source::{ObservedAt, SourceBatch, SourceRecord};
