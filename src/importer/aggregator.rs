// ==========================================
// 产品登记同步系统 - 源记录聚合
// ==========================================
// 职责: 同一次运行内同编码多条源记录 → 每字段取最新观测
// 规则:
// - observed_at 较大者胜出
// - observed_at 相同: 源迭代顺序中靠后的记录胜出
// - 输出顺序为编码在源中首次出现的顺序
// ==========================================

use crate::domain::product::{FieldValues, ProductField};
use crate::domain::reconcile::AggregatedRecord;
use crate::domain::source::{ObservedAt, SourceBatch};
use std::collections::{BTreeMap, HashMap};

/// 聚合源批次
pub fn aggregate(batch: &SourceBatch) -> Vec<AggregatedRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, BTreeMap<ProductField, (&ObservedAt, &str)>> = HashMap::new();

    let codes = batch
        .observed_codes
        .iter()
        .chain(batch.records.iter().map(|r| &r.product_code));
    for code in codes {
        if !latest.contains_key(code) {
            latest.insert(code.clone(), BTreeMap::new());
            order.push(code.clone());
        }
    }

    for record in &batch.records {
        let Some(fields) = latest.get_mut(&record.product_code) else {
            continue;
        };
        let candidate = (&record.observed_at, record.value.as_str());
        let keep_current = matches!(
            fields.get(&record.field),
            Some((current, _)) if record.observed_at < **current
        );
        if !keep_current {
            fields.insert(record.field, candidate);
        }
    }

    order
        .into_iter()
        .map(|code| {
            let fields: FieldValues = latest
                .remove(&code)
                .unwrap_or_default()
                .into_iter()
                .map(|(field, (_, value))| (field, value.to_string()))
                .collect();
            AggregatedRecord {
                product_code: code,
                fields,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::source::SourceRecord;

    fn record(code: &str, field: ProductField, value: &str, at: &str) -> SourceRecord {
        SourceRecord::new(code, field, value, ObservedAt::new(at))
    }

    #[test]
    fn test_latest_observation_wins_per_field() {
        let batch = SourceBatch {
            records: vec![
                record("A", ProductField::ProductModel, "X2", "2024-05-02 00:00:00"),
                record("A", ProductField::ProductModel, "X1", "2024-05-01 00:00:00"),
                record("B", ProductField::ProductModel, "Y", "2024-05-01 00:00:00"),
            ],
            ..Default::default()
        };

        let aggregated = aggregate(&batch);

        assert_eq!(aggregated.len(), 2);
        assert_eq!(aggregated[0].product_code, "A");
        assert_eq!(
            aggregated[0].fields.get(&ProductField::ProductModel).map(String::as_str),
            Some("X2")
        );
    }

    #[test]
    fn test_equal_observed_at_later_record_wins() {
        let batch = SourceBatch {
            records: vec![
                record("A", ProductField::ProductModel, "first", ""),
                record("A", ProductField::ProductModel, "second", ""),
            ],
            ..Default::default()
        };

        let aggregated = aggregate(&batch);
        assert_eq!(
            aggregated[0].fields.get(&ProductField::ProductModel).map(String::as_str),
            Some("second")
        );
    }

    #[test]
    fn test_observed_codes_without_values_are_kept() {
        let batch = SourceBatch {
            records: vec![record("B", ProductField::ProductModel, "Y", "")],
            observed_codes: vec!["A".to_string(), "B".to_string()],
            ..Default::default()
        };

        let aggregated = aggregate(&batch);

        assert_eq!(aggregated.len(), 2);
        assert_eq!(aggregated[0].product_code, "A");
        assert!(aggregated[0].fields.is_empty());
        assert_eq!(aggregated[1].product_code, "B");
    }
}
