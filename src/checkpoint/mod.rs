// ==========================================
// 产品登记同步系统 - 导入边界检查点
// ==========================================

pub mod local_record;
pub mod store;

pub use local_record::{LocalCheckpointLines, LocalCheckpointRecord, OPERATOR_DATE_FORMAT};
pub use store::{
    CheckpointOrigin, CheckpointReading, CheckpointSource, CheckpointStore, CheckpointWriteReport,
};

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 检查点错误类型
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("检查点不可用: 远端={primary}, 本地={local}")]
    Unavailable { primary: String, local: String },

    #[error("检查点写入失败: 远端={primary}, 本地={local}")]
    WriteFailed { primary: String, local: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;
