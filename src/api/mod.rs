// ==========================================
// 产品登记同步系统 - API 层
// ==========================================

pub mod error;
pub mod sync_api;

pub use error::{ApiError, ApiResult};
pub use sync_api::{ConnectionReport, InspectionImportReport, SourceCheck, SyncApi};
