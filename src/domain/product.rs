// ==========================================
// 产品登记同步系统 - 产品记录领域模型
// ==========================================
// 职责: 规范登记库中的产品实体与可更新字段
// 红线: product_code 是唯一身份标识，创建后不可变
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// ProductField - 产品可更新字段
// ==========================================
// 各字段由不同管道独立维护
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductField {
    /// 产品型号
    ProductModel,
    /// 半成品检验时间
    SemiFinishedInspectionTime,
    /// 成品检验时间
    FinishedInspectionTime,
}

impl ProductField {
    /// 全部字段（与 products 表列顺序一致）
    pub const ALL: [ProductField; 3] = [
        ProductField::ProductModel,
        ProductField::SemiFinishedInspectionTime,
        ProductField::FinishedInspectionTime,
    ];

    /// 数据库列名
    pub fn column(&self) -> &'static str {
        match self {
            ProductField::ProductModel => "product_model",
            ProductField::SemiFinishedInspectionTime => "semi_finished_inspection_time",
            ProductField::FinishedInspectionTime => "finished_inspection_time",
        }
    }

    /// 是否为时间戳字段（比较前需规范化）
    pub fn is_timestamp(&self) -> bool {
        matches!(
            self,
            ProductField::SemiFinishedInspectionTime | ProductField::FinishedInspectionTime
        )
    }
}

impl fmt::Display for ProductField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// 字段值集合（仅包含非空值）
pub type FieldValues = BTreeMap<ProductField, String>;

// ==========================================
// ProductRecord - 规范产品记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_code: String,
    pub product_model: Option<String>,
    pub semi_finished_inspection_time: Option<String>,
    pub finished_inspection_time: Option<String>,
}

impl ProductRecord {
    /// 创建仅包含编码的空记录
    pub fn new(product_code: impl Into<String>) -> Self {
        Self {
            product_code: product_code.into(),
            product_model: None,
            semi_finished_inspection_time: None,
            finished_inspection_time: None,
        }
    }

    /// 读取指定字段当前值
    pub fn field(&self, field: ProductField) -> Option<&str> {
        match field {
            ProductField::ProductModel => self.product_model.as_deref(),
            ProductField::SemiFinishedInspectionTime => {
                self.semi_finished_inspection_time.as_deref()
            }
            ProductField::FinishedInspectionTime => self.finished_inspection_time.as_deref(),
        }
    }

    /// 设置指定字段
    pub fn set_field(&mut self, field: ProductField, value: Option<String>) {
        match field {
            ProductField::ProductModel => self.product_model = value,
            ProductField::SemiFinishedInspectionTime => self.semi_finished_inspection_time = value,
            ProductField::FinishedInspectionTime => self.finished_inspection_time = value,
        }
    }

    /// 以字段集合构造记录（未出现的字段为 NULL）
    pub fn from_fields(product_code: impl Into<String>, fields: &FieldValues) -> Self {
        let mut record = Self::new(product_code);
        for (field, value) in fields {
            record.set_field(*field, Some(value.clone()));
        }
        record
    }
}

/// 判断值是否视为空（None / 空白 / 外部工具导出的空值占位）
pub fn is_empty_value(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => {
            let v = v.trim();
            v.is_empty() || v.eq_ignore_ascii_case("nan") || v.eq_ignore_ascii_case("none")
        }
    }
}
