// ==========================================
// 产品登记同步系统 - 检查点存储（远端主副本 + 本地副本）
// ==========================================
// 读: 远端优先；远端失败或为空 → 本地文件
// 写: 本地无条件写入，随后写远端；两份副本独立，允许分叉
// 分叉检测: 远端读取成功时比对本地，不一致仅告警（后写者为准）
// ==========================================

use crate::checkpoint::local_record::LocalCheckpointRecord;
use crate::checkpoint::{CheckpointError, CheckpointResult};
use crate::domain::source::TIMESTAMP_FORMAT;
use crate::repository::checkpoint_repo::CheckpointRepository;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 检查点写入来源（决定本地文件的哪一行）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointOrigin {
    /// 操作员设定（本地第 1 行）
    Operator,
    /// 管道运行后自动推进（本地第 2 行）
    Automatic,
}

/// 单次写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointWriteReport {
    pub primary_written: bool,
    pub local_written: bool,
}

/// 读取来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    Primary,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointReading {
    pub boundary: NaiveDateTime,
    pub source: CheckpointSource,
}

// ==========================================
// CheckpointStore
// ==========================================
#[derive(Clone)]
pub struct CheckpointStore {
    primary: Arc<dyn CheckpointRepository>,
    local: LocalCheckpointRecord,
}

impl CheckpointStore {
    pub fn new(primary: Arc<dyn CheckpointRepository>, local: LocalCheckpointRecord) -> Self {
        Self { primary, local }
    }

    pub fn local(&self) -> &LocalCheckpointRecord {
        &self.local
    }

    /// 读取当前检查点
    ///
    /// # 返回
    /// - Ok(Some): 远端或本地任一可用值
    /// - Ok(None): 两处均无记录
    /// - Err(Unavailable): 远端失败且本地不可读
    pub fn read(&self) -> CheckpointResult<Option<NaiveDateTime>> {
        Ok(self.read_with_source()?.map(|r| r.boundary))
    }

    /// 读取当前检查点并标明来源
    #[instrument(skip(self))]
    pub fn read_with_source(&self) -> CheckpointResult<Option<CheckpointReading>> {
        let primary_error = match self.primary.read_first() {
            Ok(Some(boundary)) => {
                self.log_divergence(boundary);
                return Ok(Some(CheckpointReading {
                    boundary,
                    source: CheckpointSource::Primary,
                }));
            }
            Ok(None) => {
                debug!("远端检查点表为空，读取本地副本");
                None
            }
            Err(e) => {
                warn!(error = %e, "远端检查点读取失败，回退到本地副本");
                Some(e.to_string())
            }
        };

        match self.local.read() {
            Ok(lines) => Ok(lines.fallback_time().map(|boundary| CheckpointReading {
                boundary,
                source: CheckpointSource::Local,
            })),
            Err(local_err) => match primary_error {
                Some(primary) => Err(CheckpointError::Unavailable {
                    primary,
                    local: local_err.to_string(),
                }),
                None => {
                    warn!(error = %local_err, "本地检查点读取失败");
                    Ok(None)
                }
            },
        }
    }

    /// 写入检查点
    ///
    /// # 说明
    /// - 本地副本无条件写入，与远端结果无关
    /// - 任一副本写成功即返回 Ok，失败的副本记入报告并告警
    #[instrument(skip(self, boundary), fields(boundary = %boundary.format(TIMESTAMP_FORMAT)))]
    pub fn write(
        &self,
        boundary: NaiveDateTime,
        origin: CheckpointOrigin,
    ) -> CheckpointResult<CheckpointWriteReport> {
        let local_result = match origin {
            CheckpointOrigin::Operator => self.local.write_operator(boundary),
            CheckpointOrigin::Automatic => self.local.write_automatic(boundary),
        };
        if let Err(e) = &local_result {
            warn!(error = %e, path = %self.local.path().display(), "本地检查点写入失败");
        }

        let primary_result = self.primary.upsert_first(boundary);
        if let Err(e) = &primary_result {
            warn!(error = %e, "远端检查点写入失败，两份副本可能分叉");
        }

        match (primary_result, local_result) {
            (Err(primary), Err(local)) => Err(CheckpointError::WriteFailed {
                primary: primary.to_string(),
                local: local.to_string(),
            }),
            (primary, local) => {
                let report = CheckpointWriteReport {
                    primary_written: primary.is_ok(),
                    local_written: local.is_ok(),
                };
                info!(
                    ?origin,
                    primary_written = report.primary_written,
                    local_written = report.local_written,
                    "检查点已写入"
                );
                Ok(report)
            }
        }
    }

    /// 远端表为空时写入初始值
    pub fn bootstrap(&self, initial: NaiveDateTime) -> CheckpointResult<bool> {
        Ok(self.primary.ensure_initialized(initial)?)
    }

    fn log_divergence(&self, primary: NaiveDateTime) {
        match self.local.read() {
            Ok(lines) => {
                if lines.fallback_time().is_some() && !lines.agrees_with(primary) {
                    warn!(
                        primary = %primary.format(TIMESTAMP_FORMAT),
                        local_operator = ?lines.operator_boundary,
                        local_automatic = ?lines.automatic_checkpoint,
                        "远端与本地检查点不一致，以远端为准"
                    );
                }
            }
            Err(e) => debug!(error = %e, "本地检查点不可读，跳过分叉检测"),
        }
    }
}
