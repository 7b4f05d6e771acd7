// ==========================================
// 产品登记同步系统 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 唯一约束冲突必须可被识别（写入执行器据此判定"已存在"）
// ==========================================

use rusqlite::ErrorCode;
use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 连接错误 =====
    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    // ===== 查询/写入错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("约束违反: {0}")]
    ConstraintViolation(String),

    // ===== 数据质量错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    /// 是否为唯一约束冲突（主键重复）
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, RepositoryError::UniqueConstraintViolation(_))
    }

    /// 是否为连接级错误
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            RepositoryError::DatabaseConnectionError(_) | RepositoryError::LockError(_)
        )
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, msg) => {
                let message = msg.unwrap_or_else(|| failure.to_string());
                match failure.code {
                    ErrorCode::ConstraintViolation
                        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                            || message.contains("UNIQUE") =>
                    {
                        RepositoryError::UniqueConstraintViolation(message)
                    }
                    ErrorCode::ConstraintViolation => RepositoryError::ConstraintViolation(message),
                    ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::PermissionDenied
                    | ErrorCode::SystemIoFailure => {
                        RepositoryError::DatabaseConnectionError(message)
                    }
                    _ => RepositoryError::DatabaseQueryError(message),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
