// ==========================================
// 产品登记同步系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 多数据源 → 产品登记库的对账与同步
// - 表格导入（型号，冲突需人工确认）
// - 旧系统检验数据增量导入（检验时间，自动覆盖）
// - 导入检查点（远端表 + 本地两行文件）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 产品/源记录/对账结果
pub mod domain;

// 数据仓储层 - 登记库访问
pub mod repository;

// 检查点存储
pub mod checkpoint;

// 导入层 - 数据源与对账管道
pub mod importer;

// 配置层
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 操作员接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    ConflictRecord, ObservedAt, PipelineKind, ProductField, ProductRecord, RunSummary,
    SourceBatch, SourceRecord,
};

pub use importer::{
    ConflictResolutionPolicy, PipelineProfile, ReconciliationPipeline, SourceExtractor,
};

pub use checkpoint::{CheckpointOrigin, CheckpointStore};

pub use config::{ConnectionMode, SyncConfig};

pub use api::{ApiError, SyncApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "产品登记同步系统";
