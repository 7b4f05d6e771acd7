// ==========================================
// 产品登记同步系统 - 源记录领域模型
// ==========================================
// 职责: 外部数据源单次观测值 + 观测时间的确定性排序
// ==========================================

use crate::domain::product::ProductField;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// 规范化后的时间戳格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// 解析时间戳字符串（支持常见导出格式与 RFC3339）
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// 规范化时间戳：可解析则统一为 `YYYY-MM-DD HH:MM:SS`，否则保留去空白后的原值
pub fn normalize_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => raw.trim().to_string(),
    }
}

/// 由旧系统出厂编号派生产品编码：截断第一个 '-' 及其后内容
pub fn derive_product_code(raw_identifier: &str) -> String {
    let raw = raw_identifier.trim();
    match raw.split_once('-') {
        Some((base, _)) => base.trim().to_string(),
        None => raw.to_string(),
    }
}

// ==========================================
// ObservedAt - 观测时间
// ==========================================
// 排序键为 (解析后的时间, 原始字符串)：
// 可解析的时间总是排在不可解析值之后（更"新"），
// 均不可解析时退化为字符串比较，保证全序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedAt {
    parsed: Option<NaiveDateTime>,
    raw: String,
}

impl ObservedAt {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            parsed: parse_timestamp(&raw),
            raw,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn parsed(&self) -> Option<NaiveDateTime> {
        self.parsed
    }
}

impl Ord for ObservedAt {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parsed
            .cmp(&other.parsed)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for ObservedAt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ==========================================
// SourceRecord - 单次源观测
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub product_code: String,
    pub field: ProductField,
    pub value: String,
    pub observed_at: ObservedAt,
}

impl SourceRecord {
    pub fn new(
        product_code: impl Into<String>,
        field: ProductField,
        value: impl Into<String>,
        observed_at: ObservedAt,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            field,
            value: value.into(),
            observed_at,
        }
    }
}

/// 数据源抽取结果
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    /// 有效源记录（按源迭代顺序）
    pub records: Vec<SourceRecord>,
    /// 有效行中出现的编码（按源迭代顺序，含仅有空值的编码）
    pub observed_codes: Vec<String>,
    /// 原始行数
    pub total_rows: usize,
    /// 因缺少必填字段被丢弃的行数
    pub malformed_rows: usize,
}
