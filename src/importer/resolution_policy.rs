// ==========================================
// 产品登记同步系统 - 冲突处理策略
// ==========================================
// 职责: 本次运行的全部冲突 → 一次性决定"是否全部覆盖"
// 实现:
// - AutoApply: 总是覆盖（旧系统管道）
// - RetainExisting: 总是保留原值
// - NewerTimestampsOnly: 所有时间戳冲突的新值都更晚时才覆盖
// - InteractiveConfirmation: 终端展示冲突并询问 y/n
// ==========================================

use crate::domain::reconcile::ConflictRecord;
use crate::domain::source::parse_timestamp;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;
use tracing::{info, warn};

// ==========================================
// ConflictResolutionPolicy Trait
// ==========================================
pub trait ConflictResolutionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 返回 true → 全部冲突转为更新；false → 全部保留原值
    fn decide(&self, conflicts: &[ConflictRecord]) -> bool;

    /// decide 是否会阻塞等待终端输入
    fn blocks_on_input(&self) -> bool {
        false
    }
}

/// 总是覆盖
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApply;

impl ConflictResolutionPolicy for AutoApply {
    fn name(&self) -> &'static str {
        "auto_apply"
    }

    fn decide(&self, _conflicts: &[ConflictRecord]) -> bool {
        true
    }
}

/// 总是保留原值
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainExisting;

impl ConflictResolutionPolicy for RetainExisting {
    fn name(&self) -> &'static str {
        "retain_existing"
    }

    fn decide(&self, _conflicts: &[ConflictRecord]) -> bool {
        false
    }
}

/// 时间戳冲突全部为"新值更晚"时覆盖；非时间戳字段不参与判断
#[derive(Debug, Clone, Copy, Default)]
pub struct NewerTimestampsOnly;

impl ConflictResolutionPolicy for NewerTimestampsOnly {
    fn name(&self) -> &'static str {
        "newer_timestamps_only"
    }

    fn decide(&self, conflicts: &[ConflictRecord]) -> bool {
        conflicts
            .iter()
            .filter(|c| c.field.is_timestamp())
            .all(|c| {
                let old = c.existing_value.as_deref().and_then(parse_timestamp);
                match (old, parse_timestamp(&c.new_value)) {
                    (None, _) => true,
                    (Some(old), Some(new)) => new > old,
                    (Some(_), None) => false,
                }
            })
    }
}

// ==========================================
// InteractiveConfirmation - 终端确认
// ==========================================
pub struct InteractiveConfirmation {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
    /// 最多展示的冲突条数
    preview_limit: usize,
}

impl InteractiveConfirmation {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
            preview_limit: 50,
        }
    }

    /// 标准输入/输出
    pub fn stdio() -> Self {
        Self::new(
            Box::new(io::BufReader::new(io::stdin())),
            Box::new(io::stdout()),
        )
    }

    fn prompt(&self, conflicts: &[ConflictRecord]) -> io::Result<bool> {
        let mut output = self
            .output
            .lock()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let mut input = self
            .input
            .lock()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        writeln!(output, "发现 {} 条字段冲突:", conflicts.len())?;
        for c in conflicts.iter().take(self.preview_limit) {
            writeln!(
                output,
                "  {} [{}]: {} -> {}",
                c.product_code,
                c.field,
                c.existing_value.as_deref().unwrap_or("(空)"),
                c.new_value
            )?;
        }
        if conflicts.len() > self.preview_limit {
            writeln!(output, "  ... 其余 {} 条省略", conflicts.len() - self.preview_limit)?;
        }

        loop {
            write!(output, "是否覆盖以上全部记录? (y/n): ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                // 输入结束视为拒绝
                return Ok(false);
            }
            match line.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => writeln!(output, "请输入 y 或 n")?,
            }
        }
    }
}

impl ConflictResolutionPolicy for InteractiveConfirmation {
    fn name(&self) -> &'static str {
        "interactive_confirmation"
    }

    fn blocks_on_input(&self) -> bool {
        true
    }

    fn decide(&self, conflicts: &[ConflictRecord]) -> bool {
        match self.prompt(conflicts) {
            Ok(apply) => {
                info!(apply, conflicts = conflicts.len(), "操作员已确认冲突处理");
                apply
            }
            Err(e) => {
                warn!(error = %e, "终端确认失败，保留原值");
                false
            }
        }
    }
}
