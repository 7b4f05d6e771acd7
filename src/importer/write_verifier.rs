// ==========================================
// 产品登记同步系统 - 写入校验器
// ==========================================
// 职责: 回读已写入的编码，与期望值逐字段比对
// 约定: 不抛错、不回滚、不自动修正，仅报告
// ==========================================

use crate::domain::product::FieldValues;
use crate::domain::reconcile::{Discrepancy, InsertCandidate, UpdateCandidate, VerificationReport};
use crate::importer::conflict_classifier::values_equal;
use crate::importer::key_resolver::KeyResolver;
use crate::repository::product_repo::ProductRepository;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteVerifier {
    resolver: KeyResolver,
}

impl WriteVerifier {
    pub fn new(resolver: KeyResolver) -> Self {
        Self { resolver }
    }

    pub fn verify_inserts<R>(&self, repo: &R, inserted: &[InsertCandidate]) -> VerificationReport
    where
        R: ProductRepository + ?Sized,
    {
        let expectations: Vec<(&str, &FieldValues)> = inserted
            .iter()
            .map(|c| (c.product_code.as_str(), &c.fields))
            .collect();
        self.verify(repo, &expectations, "新增")
    }

    pub fn verify_updates<R>(&self, repo: &R, updated: &[UpdateCandidate]) -> VerificationReport
    where
        R: ProductRepository + ?Sized,
    {
        let expectations: Vec<(&str, &FieldValues)> = updated
            .iter()
            .map(|c| (c.product_code.as_str(), &c.fields))
            .collect();
        self.verify(repo, &expectations, "更新")
    }

    fn verify<R>(
        &self,
        repo: &R,
        expectations: &[(&str, &FieldValues)],
        label: &str,
    ) -> VerificationReport
    where
        R: ProductRepository + ?Sized,
    {
        let mut report = VerificationReport {
            attempted: expectations.len(),
            ..Default::default()
        };
        if expectations.is_empty() {
            return report;
        }

        let keys: Vec<String> = expectations.iter().map(|(k, _)| k.to_string()).collect();
        let resolved = self.resolver.resolve(repo, &keys);
        let unreadable: std::collections::HashMap<&str, &str> = resolved
            .failed_chunks
            .iter()
            .flat_map(|chunk| chunk.keys.iter().map(move |k| (k.as_str(), chunk.error.as_str())))
            .collect();

        for (code, expected) in expectations {
            if let Some(reason) = unreadable.get(code) {
                report.discrepancies.push(Discrepancy::Unreadable {
                    product_code: code.to_string(),
                    reason: reason.to_string(),
                });
                continue;
            }

            let Some(stored) = resolved.existing.get(*code) else {
                report.discrepancies.push(Discrepancy::Missing {
                    product_code: code.to_string(),
                });
                continue;
            };

            let mismatches: Vec<Discrepancy> = expected
                .iter()
                .filter_map(|(field, value)| {
                    let actual = stored.field(*field);
                    let matches = actual.is_some_and(|a| values_equal(*field, a, value));
                    (!matches).then(|| Discrepancy::Mismatch {
                        product_code: code.to_string(),
                        field: *field,
                        expected: value.clone(),
                        actual: actual.map(str::to_string),
                    })
                })
                .collect();

            if mismatches.is_empty() {
                report.verified += 1;
            } else {
                report.discrepancies.extend(mismatches);
            }
        }

        if report.is_clean() {
            info!(kind = label, verified = report.verified, attempted = report.attempted, "写入校验通过");
        } else {
            warn!(
                kind = label,
                verified = report.verified,
                attempted = report.attempted,
                discrepancies = report.discrepancies.len(),
                "写入校验发现差异"
            );
        }
        report
    }
}
