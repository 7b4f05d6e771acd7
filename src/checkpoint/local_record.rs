// ==========================================
// 产品登记同步系统 - 本地检查点文件
// ==========================================
// 格式（两行文本，互相独立）:
//   第 1 行: 人工设定的导入边界日期
//   第 2 行: 最近一次自动检查点时间
// 写入: 先写临时文件再 rename，保证不出现半行
// ==========================================

use crate::domain::source::{parse_timestamp, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use std::io;
use std::path::{Path, PathBuf};

/// 人工边界日期格式
pub const OPERATOR_DATE_FORMAT: &str = "%Y-%m-%d";

/// 本地文件两行内容
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCheckpointLines {
    pub operator_boundary: Option<String>,
    pub automatic_checkpoint: Option<String>,
}

impl LocalCheckpointLines {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines().map(str::trim);
        let non_empty = |line: Option<&str>| line.filter(|l| !l.is_empty()).map(str::to_string);
        Self {
            operator_boundary: non_empty(lines.next()),
            automatic_checkpoint: non_empty(lines.next()),
        }
    }

    fn render(&self) -> String {
        format!(
            "{}\n{}\n",
            self.operator_boundary.as_deref().unwrap_or(""),
            self.automatic_checkpoint.as_deref().unwrap_or("")
        )
    }

    pub fn operator_time(&self) -> Option<NaiveDateTime> {
        self.operator_boundary.as_deref().and_then(parse_timestamp)
    }

    pub fn automatic_time(&self) -> Option<NaiveDateTime> {
        self.automatic_checkpoint.as_deref().and_then(parse_timestamp)
    }

    /// 回退读取值：优先自动检查点，其次人工边界
    pub fn fallback_time(&self) -> Option<NaiveDateTime> {
        self.automatic_time().or_else(|| self.operator_time())
    }

    /// 是否有任意一行与给定时间一致
    pub fn agrees_with(&self, boundary: NaiveDateTime) -> bool {
        self.automatic_time() == Some(boundary) || self.operator_time() == Some(boundary)
    }
}

// ==========================================
// LocalCheckpointRecord
// ==========================================
#[derive(Debug, Clone)]
pub struct LocalCheckpointRecord {
    path: PathBuf,
}

impl LocalCheckpointRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取两行内容（文件不存在 → 两行皆空）
    pub fn read(&self) -> io::Result<LocalCheckpointLines> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(LocalCheckpointLines::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LocalCheckpointLines::default()),
            Err(e) => Err(e),
        }
    }

    /// 写入第 1 行（人工边界日期），保留第 2 行
    pub fn write_operator(&self, boundary: NaiveDateTime) -> io::Result<()> {
        let mut lines = self.read()?;
        lines.operator_boundary = Some(boundary.format(OPERATOR_DATE_FORMAT).to_string());
        self.persist(&lines)
    }

    /// 写入第 2 行（自动检查点时间），保留第 1 行
    pub fn write_automatic(&self, boundary: NaiveDateTime) -> io::Result<()> {
        let mut lines = self.read()?;
        lines.automatic_checkpoint = Some(boundary.format(TIMESTAMP_FORMAT).to_string());
        self.persist(&lines)
    }

    fn persist(&self, lines: &LocalCheckpointLines) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, lines.render())?;
        std::fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let record = LocalCheckpointRecord::new(dir.path().join("none.txt"));
        assert_eq!(record.read().unwrap(), LocalCheckpointLines::default());
    }

    #[test]
    fn test_lines_are_independent() {
        let dir = TempDir::new().unwrap();
        let record = LocalCheckpointRecord::new(dir.path().join("import_date_record.txt"));

        record.write_operator(ts(2024, 3, 1, 15)).unwrap();
        record.write_automatic(ts(2024, 3, 5, 10)).unwrap();
        record.write_operator(ts(2024, 4, 1, 0)).unwrap();

        let content = std::fs::read_to_string(record.path()).unwrap();
        assert_eq!(content, "2024-04-01\n2024-03-05 10:00:00\n");

        let lines = record.read().unwrap();
        assert_eq!(lines.operator_time(), Some(ts(2024, 4, 1, 0)));
        assert_eq!(lines.fallback_time(), Some(ts(2024, 3, 5, 10)));
    }

    #[test]
    fn test_fallback_uses_operator_line_when_no_automatic() {
        let lines = LocalCheckpointLines::parse("2024-06-01\n\n");
        assert_eq!(lines.automatic_checkpoint, None);
        assert_eq!(lines.fallback_time(), Some(ts(2024, 6, 1, 0)));
    }
}
