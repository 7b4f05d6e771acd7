// ==========================================
// 产品登记同步系统 - 冲突分类器
// ==========================================
// 职责: 聚合源记录 × 登记库现值 → 新增 / 未变化 / 冲突
// 红线: 源中为空的字段永不覆盖，也不计为冲突
// ==========================================

use crate::domain::product::{is_empty_value, FieldValues, ProductField, ProductRecord};
use crate::domain::reconcile::{AggregatedRecord, Classification, ConflictRecord, InsertCandidate};
use crate::domain::source::normalize_timestamp;
use std::collections::HashMap;

// ==========================================
// FieldOwnership - 管道字段权限
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOwnership {
    /// 新增时可写入的字段
    pub insertable: Vec<ProductField>,
    /// 已存在记录上可覆盖的字段（参与冲突比较）
    pub overwritable: Vec<ProductField>,
}

/// 字段值比较（时间戳字段先规范化）
pub fn values_equal(field: ProductField, left: &str, right: &str) -> bool {
    if field.is_timestamp() {
        normalize_timestamp(left) == normalize_timestamp(right)
    } else {
        left.trim() == right.trim()
    }
}

// ==========================================
// ConflictClassifier
// ==========================================
#[derive(Debug, Clone)]
pub struct ConflictClassifier {
    ownership: FieldOwnership,
}

impl ConflictClassifier {
    pub fn new(ownership: FieldOwnership) -> Self {
        Self { ownership }
    }

    /// 分类
    ///
    /// # 参数
    /// - aggregated: 聚合后的源记录
    /// - existing: 登记库中已存在的记录
    pub fn classify(
        &self,
        aggregated: &[AggregatedRecord],
        existing: &HashMap<String, ProductRecord>,
    ) -> Classification {
        let mut classification = Classification::default();

        for record in aggregated {
            match existing.get(&record.product_code) {
                None => {
                    let fields = self.insertable_fields(&record.fields);
                    if fields.is_empty() {
                        classification.empty_new.push(record.product_code.clone());
                    } else {
                        classification.new_records.push(InsertCandidate {
                            product_code: record.product_code.clone(),
                            fields,
                        });
                    }
                }
                Some(current) => {
                    let conflicts = self.field_conflicts(record, current);
                    if conflicts.is_empty() {
                        classification.unchanged.push(record.product_code.clone());
                    } else {
                        classification.conflicts.extend(conflicts);
                    }
                }
            }
        }

        classification
    }

    fn insertable_fields(&self, fields: &FieldValues) -> FieldValues {
        fields
            .iter()
            .filter(|(field, value)| {
                self.ownership.insertable.contains(field) && !is_empty_value(Some(value.as_str()))
            })
            .map(|(field, value)| (*field, value.clone()))
            .collect()
    }

    fn field_conflicts(
        &self,
        record: &AggregatedRecord,
        current: &ProductRecord,
    ) -> Vec<ConflictRecord> {
        self.ownership
            .overwritable
            .iter()
            .filter_map(|field| {
                let new_value = record.fields.get(field)?;
                if is_empty_value(Some(new_value.as_str())) {
                    return None;
                }

                let existing_value = current.field(*field);
                let same = match existing_value {
                    Some(old) if !is_empty_value(Some(old)) => values_equal(*field, old, new_value),
                    _ => false,
                };
                if same {
                    return None;
                }

                Some(ConflictRecord {
                    product_code: record.product_code.clone(),
                    field: *field,
                    existing_value: existing_value.map(str::to_string),
                    new_value: new_value.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_only() -> ConflictClassifier {
        ConflictClassifier::new(FieldOwnership {
            insertable: vec![ProductField::ProductModel],
            overwritable: vec![ProductField::ProductModel],
        })
    }

    fn aggregated(code: &str, fields: &[(ProductField, &str)]) -> AggregatedRecord {
        AggregatedRecord {
            product_code: code.to_string(),
            fields: fields.iter().map(|(f, v)| (*f, v.to_string())).collect(),
        }
    }

    fn existing(records: Vec<ProductRecord>) -> HashMap<String, ProductRecord> {
        records
            .into_iter()
            .map(|r| (r.product_code.clone(), r))
            .collect()
    }

    #[test]
    fn test_absent_key_is_new() {
        let result = model_only().classify(
            &[aggregated("A", &[(ProductField::ProductModel, "X1")])],
            &HashMap::new(),
        );

        assert_eq!(result.new_records.len(), 1);
        assert_eq!(result.new_records[0].product_code, "A");
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_absent_key_without_insertable_value_is_empty_new() {
        let result = model_only().classify(&[aggregated("A", &[])], &HashMap::new());
        assert!(result.new_records.is_empty());
        assert_eq!(result.empty_new, vec!["A".to_string()]);
    }

    #[test]
    fn test_equal_value_is_unchanged() {
        let mut current = ProductRecord::new("A");
        current.product_model = Some("X1".to_string());

        let result = model_only().classify(
            &[aggregated("A", &[(ProductField::ProductModel, "X1")])],
            &existing(vec![current]),
        );

        assert_eq!(result.unchanged, vec!["A".to_string()]);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_empty_source_value_never_conflicts() {
        let mut current = ProductRecord::new("A");
        current.product_model = Some("X1".to_string());

        let result = model_only().classify(
            &[aggregated("A", &[(ProductField::ProductModel, " ")])],
            &existing(vec![current]),
        );

        assert_eq!(result.unchanged.len(), 1);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_differing_value_is_conflict() {
        let mut current = ProductRecord::new("A");
        current.product_model = Some("X1".to_string());

        let result = model_only().classify(
            &[aggregated("A", &[(ProductField::ProductModel, "X2")])],
            &existing(vec![current]),
        );

        assert_eq!(result.conflicts.len(), 1);
        let conflict = &result.conflicts[0];
        assert_eq!(conflict.existing_value.as_deref(), Some("X1"));
        assert_eq!(conflict.new_value, "X2");
    }

    #[test]
    fn test_null_existing_value_is_conflict() {
        let result = model_only().classify(
            &[aggregated("A", &[(ProductField::ProductModel, "X2")])],
            &existing(vec![ProductRecord::new("A")]),
        );

        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].existing_value, None);
    }

    #[test]
    fn test_non_owned_field_is_ignored_for_existing() {
        let classifier = ConflictClassifier::new(FieldOwnership {
            insertable: vec![
                ProductField::FinishedInspectionTime,
                ProductField::ProductModel,
            ],
            overwritable: vec![ProductField::FinishedInspectionTime],
        });
        let mut current = ProductRecord::new("A");
        current.product_model = Some("OLD".to_string());
        current.finished_inspection_time = Some("2024-01-01T08:00:00".to_string());

        let result = classifier.classify(
            &[aggregated(
                "A",
                &[
                    (ProductField::ProductModel, "NEW"),
                    (ProductField::FinishedInspectionTime, "2024-01-01 08:00:00"),
                ],
            )],
            &existing(vec![current]),
        );

        // 型号不参与比较；时间戳规范化后相等
        assert_eq!(result.unchanged.len(), 1);
    }
}
