// ==========================================
// 产品登记同步系统 - 同步配置
// ==========================================
// 职责: 连接端点选择、数据源位置、批量参数
// 约定: 配置对象在构造管道时显式传入，不存在进程级可变选择器
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "PRODUCT_SYNC_CONFIG";

/// 连接模式覆写环境变量（internal / public）
pub const CONNECTION_MODE_ENV: &str = "PRODUCT_SYNC_MODE";

/// 登记库查询单批编码数上限
pub const DEFAULT_LOOKUP_CHUNK_SIZE: usize = 20;

/// 批量新增单批记录数
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 100;

/// 登记库连接超时（毫秒）
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

// ==========================================
// ConnectionMode - 连接模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// 内网
    #[default]
    Internal,
    /// 公网
    Public,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Internal => f.write_str("internal"),
            ConnectionMode::Public => f.write_str("public"),
        }
    }
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "internal" | "内网" | "1" => Ok(ConnectionMode::Internal),
            "public" | "公网" | "2" => Ok(ConnectionMode::Public),
            other => Err(format!("未知连接模式: {}", other)),
        }
    }
}

// ==========================================
// EndpointConfig - 登记库端点
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// 数据库文件路径
    pub db_path: String,
    /// 连接级超时（busy_timeout，毫秒）
    pub connect_timeout_ms: u64,
    /// 数据库不存在时是否创建
    pub create_if_missing: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            db_path: default_data_path("product_registry.db"),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            create_if_missing: false,
        }
    }
}

impl EndpointConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

// ==========================================
// 数据源配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadsheetSourceConfig {
    /// 表格文件路径（.xlsx/.xls/.csv）
    pub path: String,
    /// 工作表名（仅 Excel）
    pub sheet_name: Option<String>,
    pub code_column: String,
    pub model_column: String,
}

impl Default for SpreadsheetSourceConfig {
    fn default() -> Self {
        Self {
            path: default_data_path("daoru.xlsx"),
            sheet_name: Some("Sheet2".to_string()),
            code_column: "product_code".to_string(),
            model_column: "product_model".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacySourceConfig {
    /// 旧系统检验表导出文件路径（可为网络共享路径）
    pub export_path: String,
}

impl Default for LegacySourceConfig {
    fn default() -> Self {
        Self {
            export_path: default_data_path("TESTDATA.csv"),
        }
    }
}

// ==========================================
// SyncConfig - 同步配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub connection_mode: ConnectionMode,
    pub internal: EndpointConfig,
    pub public: EndpointConfig,
    /// 本地检查点文件（两行：人工边界日期 / 最近自动检查点）
    pub local_checkpoint_path: String,
    /// 源文件暂存目录
    pub staging_dir: String,
    pub spreadsheet: SpreadsheetSourceConfig,
    pub semi_finished_source: LegacySourceConfig,
    pub finished_source: LegacySourceConfig,
    pub lookup_chunk_size: usize,
    pub insert_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::Internal,
            internal: EndpointConfig::default(),
            public: EndpointConfig::default(),
            local_checkpoint_path: default_data_path("import_date_record.txt"),
            staging_dir: std::env::temp_dir().display().to_string(),
            spreadsheet: SpreadsheetSourceConfig::default(),
            semi_finished_source: LegacySourceConfig::default(),
            finished_source: LegacySourceConfig::default(),
            lookup_chunk_size: DEFAULT_LOOKUP_CHUNK_SIZE,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: SyncConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 加载配置
    ///
    /// # 规则
    /// 1. 显式路径优先，其次 PRODUCT_SYNC_CONFIG
    /// 2. 未指定路径或文件不存在 → 默认配置
    /// 3. PRODUCT_SYNC_MODE 覆写连接模式
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let path: Option<PathBuf> = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut config = match path {
            Some(p) if p.exists() => {
                info!(path = %p.display(), "加载同步配置");
                Self::from_file(&p)?
            }
            Some(p) => {
                warn!(path = %p.display(), "配置文件不存在，使用默认配置");
                Self::default()
            }
            None => Self::default(),
        };

        if let Ok(mode) = std::env::var(CONNECTION_MODE_ENV) {
            config.connection_mode = mode.parse()?;
        }

        Ok(config)
    }

    /// 参数校验
    pub fn validate(&self) -> Result<(), String> {
        if self.lookup_chunk_size == 0 {
            return Err("lookup_chunk_size 必须大于 0".to_string());
        }
        if self.insert_batch_size == 0 {
            return Err("insert_batch_size 必须大于 0".to_string());
        }
        Ok(())
    }

    /// 当前连接模式对应的登记库端点
    pub fn active_endpoint(&self) -> &EndpointConfig {
        match self.connection_mode {
            ConnectionMode::Internal => &self.internal,
            ConnectionMode::Public => &self.public,
        }
    }

    /// 切换连接模式（返回新配置，不修改共享状态）
    pub fn with_mode(&self, mode: ConnectionMode) -> Self {
        Self {
            connection_mode: mode,
            ..self.clone()
        }
    }
}

/// 默认数据目录下的文件路径
fn default_data_path(file_name: &str) -> String {
    let base = dirs::data_dir()
        .map(|dir| dir.join("product-registry-sync"))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(file_name).display().to_string()
}
