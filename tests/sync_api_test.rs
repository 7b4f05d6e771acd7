// ==========================================
// SyncApi 端到端测试
// ==========================================
// 测试目标: 操作员命令在真实文件与 SQLite 登记库上的完整流程
// - 设置边界 → 增量导入 A/B → 检查点推进
// - 登记库不可达时检查点退回本地副本
// - 连通性测试初始化远端检查点并逐个检查数据源
// ==========================================


use chrono::{Local, NaiveDate};
use product_registry_sync::api::{ApiError, SyncApi};
use product_registry_sync::checkpoint::{CheckpointSource, LocalCheckpointRecord};
use product_registry_sync::config::{EndpointConfig, LegacySourceConfig, SyncConfig};
use product_registry_sync::importer::{AutoApply, RetainExisting};
use product_registry_sync::logging;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use test_helpers::{create_test_db, dump_products};

const LEGACY_HEADER: &str = "出厂编号,测试时间,电机型号,测试结果,测试日期";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn write_file(path: &Path, content: &str) {
    fs::write(path, content).expect("write fixture");
}

/// 构造指向临时目录的配置
fn test_config(dir: &TempDir, db_path: &str) -> SyncConfig {
    let root = dir.path();
    SyncConfig {
        internal: EndpointConfig::new(db_path),
        public: EndpointConfig::new(root.join("public.db").display().to_string()),
        local_checkpoint_path: root.join("state").join("import_date_record.txt").display().to_string(),
        staging_dir: root.join("staging").display().to_string(),
        semi_finished_source: LegacySourceConfig {
            export_path: root.join("semi.csv").display().to_string(),
        },
        finished_source: LegacySourceConfig {
            export_path: root.join("finished.csv").display().to_string(),
        },
        ..SyncConfig::default()
    }
}

#[tokio::test]
async fn test_inspection_import_advances_checkpoint() {
    logging::init_test();
    let dir = TempDir::new().unwrap();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config = test_config(&dir, &db_path);

    write_file(
        &dir.path().join("semi.csv"),
        &format!(
            "{}\nS100-01,2024/03/02 10:15:00,M1,测试合格,2024-03-02\n\
             S200-01,2024/02/27 09:00:00,M2,测试合格,2024-02-27\n\
             S300-01,2024/03/02 11:00:00,M3,测试不合格,2024-03-02\n",
            LEGACY_HEADER
        ),
    );
    write_file(
        &dir.path().join("finished.csv"),
        &format!(
            "{}\nS100-02,2024-03-05 16:40:00,M9,测试合格,2024-03-05\n",
            LEGACY_HEADER
        ),
    );

    let api = SyncApi::new(config.clone());
    let report = api.set_checkpoint(date(2024, 3, 1)).expect("set checkpoint");
    assert!(report.primary_written);
    assert!(report.local_written);

    let before = Local::now().naive_local();
    let result = api.import_inspections(None, true).await.expect("import");

    assert_eq!(result.since, date(2024, 3, 1));
    assert_eq!(result.semi_finished.inserted, 1);
    assert_eq!(result.semi_finished.source_rows, 3);
    assert!(!result.semi_finished.checkpoint_advanced);
    assert_eq!(result.finished.updated, 1);
    assert!(result.finished.checkpoint_advanced);

    let rows = dump_products(&db_path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "S100");
    // 成品管道不覆盖型号
    assert_eq!(rows[0].1.as_deref(), Some("M1"));
    assert_eq!(rows[0].2.as_deref(), Some("2024-03-02 10:15:00"));
    assert_eq!(rows[0].3.as_deref(), Some("2024-03-05 16:40:00"));

    let reading = api.current_checkpoint().expect("read").expect("checkpoint");
    assert_eq!(reading.source, CheckpointSource::Primary);
    // 边界为本次运行开始时间（远端存储精确到秒）
    assert!(reading.boundary >= before - chrono::Duration::seconds(1));
    assert!(reading.boundary <= Local::now().naive_local());

    let local = LocalCheckpointRecord::new(&config.local_checkpoint_path)
        .read()
        .expect("local record");
    assert_eq!(local.operator_boundary.as_deref(), Some("2024-03-01"));
    assert!(local.agrees_with(reading.boundary));

    // 暂存副本已清理
    let staged: Vec<_> = fs::read_dir(&config.staging_dir).unwrap().collect();
    assert!(staged.is_empty());
}

#[tokio::test]
async fn test_inspection_import_without_boundary_is_rejected() {
    logging::init_test();
    let dir = TempDir::new().unwrap();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let api = SyncApi::new(test_config(&dir, &db_path));

    let result = api.import_inspections(None, true).await;
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));
}

#[tokio::test]
async fn test_failed_first_pipeline_does_not_advance_checkpoint() {
    logging::init_test();
    let dir = TempDir::new().unwrap();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config = test_config(&dir, &db_path);
    // semi.csv 不存在
    write_file(&dir.path().join("finished.csv"), &format!("{}\n", LEGACY_HEADER));

    let api = SyncApi::new(config);
    api.set_checkpoint(date(2024, 3, 1)).expect("set checkpoint");

    let result = api.import_inspections(None, true).await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));

    let reading = api.current_checkpoint().expect("read").expect("checkpoint");
    assert_eq!(reading.boundary, date(2024, 3, 1).and_hms_opt(0, 0, 0).unwrap());
}

#[tokio::test]
async fn test_checkpoint_falls_back_to_local_when_store_unreachable() {
    logging::init_test();
    let dir = TempDir::new().unwrap();
    let missing_db = dir.path().join("missing").join("registry.db");
    let api = SyncApi::new(test_config(&dir, &missing_db.display().to_string()));

    let report = api.set_checkpoint(date(2024, 6, 1)).expect("set checkpoint");
    assert!(!report.primary_written);
    assert!(report.local_written);

    let reading = api.current_checkpoint().expect("read").expect("checkpoint");
    assert_eq!(reading.source, CheckpointSource::Local);
    assert_eq!(reading.boundary, date(2024, 6, 1).and_hms_opt(0, 0, 0).unwrap());

    let result = api.import_spreadsheet(Box::new(AutoApply)).await;
    assert!(matches!(result, Err(ApiError::DatabaseConnectionError(_))));
}

#[tokio::test]
async fn test_connection_bootstraps_checkpoint_once() {
    logging::init_test();
    let dir = TempDir::new().unwrap();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let api = SyncApi::new(test_config(&dir, &db_path));

    let first = api.test_connection().await.expect("connection");
    assert_eq!(first.product_count, 0);
    assert!(first.checkpoint_bootstrapped);
    let reading = first.checkpoint.expect("checkpoint");
    assert_eq!(reading.source, CheckpointSource::Primary);

    let second = api.test_connection().await.expect("connection");
    assert!(!second.checkpoint_bootstrapped);
    assert_eq!(second.checkpoint.map(|r| r.boundary), Some(reading.boundary));
}

#[tokio::test]
async fn test_connection_reports_each_source() {
    logging::init_test();
    let dir = TempDir::new().unwrap();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let mut config = test_config(&dir, &db_path);
    let sheet = dir.path().join("daoru.csv");
    write_file(&sheet, "product_code,product_model\nA,X1\nB,Y1\n");
    config.spreadsheet.path = sheet.display().to_string();
    config.spreadsheet.sheet_name = None;
    write_file(
        &dir.path().join("semi.csv"),
        &format!("{}\nS100-01,2024/03/02 10:15:00,M1,测试合格,2024-03-02\n", LEGACY_HEADER),
    );
    // finished.csv 不存在

    let api = SyncApi::new(config.clone());
    let report = api.test_connection().await.expect("connection");

    assert_eq!(report.sources.len(), 3);
    let spreadsheet = &report.sources[0];
    assert!(spreadsheet.reachable);
    assert_eq!(spreadsheet.rows, Some(2));
    let semi = &report.sources[1];
    assert!(semi.reachable);
    assert_eq!(semi.rows, Some(1));
    let finished = &report.sources[2];
    assert!(!finished.reachable);
    assert!(finished.error.is_some());
    assert_eq!(finished.path, config.finished_source.export_path);

    // 不可读的数据源不影响登记库检查
    assert!(report.checkpoint_bootstrapped);
    let staged: Vec<_> = fs::read_dir(&config.staging_dir).unwrap().collect();
    assert!(staged.is_empty());
}

#[tokio::test]
async fn test_spreadsheet_import_from_csv() {
    logging::init_test();
    let dir = TempDir::new().unwrap();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let mut config = test_config(&dir, &db_path);
    let sheet = dir.path().join("daoru.csv");
    write_file(&sheet, "product_code,product_model\nA,X1\nB,Y1\nA,X1\n");
    config.spreadsheet.path = sheet.display().to_string();
    config.spreadsheet.sheet_name = None;

    let api = SyncApi::new(config.clone());
    let first = api.import_spreadsheet(Box::new(AutoApply)).await.expect("first import");
    assert_eq!(first.inserted, 2);
    assert_eq!(first.source_codes, 2);

    write_file(&sheet, "product_code,product_model\nA,X2\n");
    let second = api
        .import_spreadsheet(Box::new(RetainExisting))
        .await
        .expect("second import");
    assert_eq!(second.conflicting, 1);
    assert_eq!(second.retained_conflicts.len(), 1);

    let rows = dump_products(&db_path);
    assert_eq!(rows[0].1.as_deref(), Some("X1"));
}
