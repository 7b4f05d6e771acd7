// ==========================================
// 产品登记同步系统 - 配置层
// ==========================================

pub mod sync_config;

pub use sync_config::{
    ConnectionMode, EndpointConfig, LegacySourceConfig, SpreadsheetSourceConfig, SyncConfig,
    CONFIG_PATH_ENV, CONNECTION_MODE_ENV, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_INSERT_BATCH_SIZE,
    DEFAULT_LOOKUP_CHUNK_SIZE,
};
