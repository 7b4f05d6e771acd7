// ==========================================
// 产品登记同步系统 - 命令行入口
// ==========================================
// 用法:
//   product-registry-sync [--config <path>] [--mode internal|public] <command> [args]
//
// 命令:
//   import-excel [--yes|--no|--newer]       表格导入型号（默认终端确认冲突）
//   set-checkpoint <YYYY-MM-DD>             设置导入边界
//   import-inspection [YYYY-MM-DD] [--record-checkpoint]
//                                           增量导入半成品/成品检验时间
//   show-checkpoint                         查看当前检查点
//   test-connection                         测试登记库连接与数据源
//
// 命令结果以 JSON 输出到 stdout，日志输出到 stderr
// ==========================================

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use product_registry_sync::checkpoint::OPERATOR_DATE_FORMAT;
use product_registry_sync::config::{ConnectionMode, SyncConfig};
use product_registry_sync::importer::{
    AutoApply, ConflictResolutionPolicy, InteractiveConfirmation, NewerTimestampsOnly,
    RetainExisting,
};
use product_registry_sync::{logging, SyncApi, APP_NAME, VERSION};
use serde::Serialize;
use std::path::PathBuf;

/// 产品登记同步工具
#[derive(Debug, Parser)]
#[command(name = "product-registry-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 连接模式（internal / public）
    #[arg(long, global = true)]
    mode: Option<ConnectionMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
enum Command {
    /// 表格导入型号（默认终端确认冲突）
    ImportExcel {
        /// 应用全部冲突
        #[arg(long, conflicts_with_all = ["no", "newer"])]
        yes: bool,

        /// 保留全部原值
        #[arg(long, conflicts_with = "newer")]
        no: bool,

        /// 仅当源时间更新时应用
        #[arg(long)]
        newer: bool,
    },

    /// 设置导入边界
    SetCheckpoint {
        /// 边界日期（YYYY-MM-DD）
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },

    /// 增量导入半成品/成品检验时间
    ImportInspection {
        /// 起始日期（YYYY-MM-DD）；缺省时取当前检查点
        #[arg(value_parser = parse_date)]
        since: Option<NaiveDate>,

        /// 两个管道均成功后推进检查点
        #[arg(long)]
        record_checkpoint: bool,
    },

    /// 查看当前检查点
    ShowCheckpoint,

    /// 测试登记库连接与数据源
    TestConnection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PolicyChoice {
    Interactive,
    ApplyAll,
    RetainAll,
    NewerOnly,
}

impl PolicyChoice {
    fn from_flags(yes: bool, no: bool, newer: bool) -> Self {
        match (yes, no, newer) {
            (true, _, _) => PolicyChoice::ApplyAll,
            (_, true, _) => PolicyChoice::RetainAll,
            (_, _, true) => PolicyChoice::NewerOnly,
            _ => PolicyChoice::Interactive,
        }
    }

    fn build(self) -> Box<dyn ConflictResolutionPolicy> {
        match self {
            PolicyChoice::Interactive => Box::new(InteractiveConfirmation::stdio()),
            PolicyChoice::ApplyAll => Box::new(AutoApply),
            PolicyChoice::RetainAll => Box::new(RetainExisting),
            PolicyChoice::NewerOnly => Box::new(NewerTimestampsOnly),
        }
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), OPERATOR_DATE_FORMAT)
        .map_err(|e| format!("日期格式应为 YYYY-MM-DD: {} ({})", raw, e))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();

    let mut config = SyncConfig::load(cli.config.as_deref())
        .map_err(|e| anyhow!("配置加载失败: {}", e))?;
    if let Some(mode) = cli.mode {
        config = config.with_mode(mode);
    }

    tracing::info!(
        version = VERSION,
        mode = %config.connection_mode,
        "{} 启动",
        APP_NAME
    );

    let api = SyncApi::new(config);
    match cli.command {
        Command::ImportExcel { yes, no, newer } => {
            let policy = PolicyChoice::from_flags(yes, no, newer);
            let summary = api.import_spreadsheet(policy.build()).await?;
            print_json(&summary)?;
        }
        Command::SetCheckpoint { date } => {
            let report = api.set_checkpoint(date)?;
            print_json(&report)?;
        }
        Command::ImportInspection {
            since,
            record_checkpoint,
        } => {
            let report = api.import_inspections(since, record_checkpoint).await?;
            print_json(&report)?;
        }
        Command::ShowCheckpoint => {
            let reading = api.current_checkpoint()?;
            print_json(&reading)?;
        }
        Command::TestConnection => {
            let report = api.test_connection().await?;
            print_json(&report)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(list: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("product-registry-sync").chain(list.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import_inspection() {
        let cli = parse(&[
            "--mode",
            "public",
            "import-inspection",
            "2024-03-01",
            "--record-checkpoint",
        ])
        .unwrap();
        assert_eq!(cli.mode, Some(ConnectionMode::Public));
        assert_eq!(
            cli.command,
            Command::ImportInspection {
                since: NaiveDate::from_ymd_opt(2024, 3, 1),
                record_checkpoint: true,
            }
        );

        let cli = parse(&["import-inspection"]).unwrap();
        assert_eq!(
            cli.command,
            Command::ImportInspection {
                since: None,
                record_checkpoint: false,
            }
        );
    }

    #[test]
    fn test_parse_import_excel_policy() {
        let cli = parse(&["import-excel", "--yes"]).unwrap();
        let Command::ImportExcel { yes, no, newer } = cli.command else {
            panic!("expected import-excel");
        };
        assert_eq!(PolicyChoice::from_flags(yes, no, newer), PolicyChoice::ApplyAll);

        let cli = parse(&["import-excel"]).unwrap();
        let Command::ImportExcel { yes, no, newer } = cli.command else {
            panic!("expected import-excel");
        };
        assert_eq!(PolicyChoice::from_flags(yes, no, newer), PolicyChoice::Interactive);
    }

    #[test]
    fn test_parse_config_after_subcommand() {
        let cli = parse(&["show-checkpoint", "--config", "sync.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("sync.json")));
        assert_eq!(cli.command, Command::ShowCheckpoint);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse(&["set-checkpoint", "2024/03/01"]).is_err());
        assert!(parse(&["set-checkpoint"]).is_err());
        assert!(parse(&["import-excel", "--yes", "--no"]).is_err());
        assert!(parse(&["--mode", "satellite", "show-checkpoint"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
        assert!(parse(&[]).is_err());
    }
}
