//! Unit tests for the run-ledger crate.

use chrono::{Duration, Utc};
use reconcile::{ErrorKind, RunOutcome, RunReport, RunState};
use tempfile::TempDir;

use crate::{FilesystemLedger, LedgerStorage, NullLedger, RunLedger, RunRecord};

fn report(mapping: &str, success: bool) -> RunReport {
    let mut report = RunReport::new(mapping, false);
    report.finished_at = Some(Utc::now());
    if success {
        report.state = RunState::Done;
        report.outcome = RunOutcome::Success;
    } else {
        report.state = RunState::Failed;
        report.outcome = RunOutcome::Failure {
            kind: ErrorKind::Io,
            message: "connection reset".to_string(),
        };
    }
    report
}

fn record_at(mapping: &str, success: bool, minutes_ago: i64) -> RunRecord {
    let mut record = RunRecord::new(report(mapping, success));
    record.recorded_at = Utc::now() - Duration::minutes(minutes_ago);
    record
}

#[tokio::test]
async fn test_filesystem_ledger_returns_latest_run() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = FilesystemLedger::new(temp_dir.path());

    let older = record_at("src.a -> dst.a", false, 10);
    let newer = record_at("src.a -> dst.a", true, 1);
    ledger.record(&older).await.unwrap();
    ledger.record(&newer).await.unwrap();

    let latest = ledger.latest("src.a -> dst.a").await.unwrap().unwrap();
    assert_eq!(latest.run_id, newer.run_id);
    assert!(latest.report.is_success());
}

#[tokio::test]
async fn test_filesystem_ledger_unknown_mapping() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = FilesystemLedger::new(temp_dir.path().join("missing"));

    assert!(ledger.latest("src.a -> dst.a").await.unwrap().is_none());
    assert!(ledger.latest_per_mapping().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_similar_labels_do_not_collide() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = FilesystemLedger::new(temp_dir.path());

    ledger.record(&record_at("src.a -> dst.a", true, 5)).await.unwrap();
    ledger.record(&record_at("src.a -> dst.a_b", false, 1)).await.unwrap();

    let latest = ledger.latest("src.a -> dst.a").await.unwrap().unwrap();
    assert_eq!(latest.mapping(), "src.a -> dst.a");
    assert!(latest.report.is_success());
}

#[tokio::test]
async fn test_latest_per_mapping_is_sorted() {
    let temp_dir = TempDir::new().unwrap();
    let ledger = FilesystemLedger::new(temp_dir.path());

    ledger.record(&record_at("src.b -> dst.b", true, 3)).await.unwrap();
    ledger.record(&record_at("src.a -> dst.a", false, 9)).await.unwrap();
    ledger.record(&record_at("src.a -> dst.a", true, 2)).await.unwrap();

    let latest = ledger.latest_per_mapping().await.unwrap();
    let summary: Vec<(&str, bool)> = latest
        .iter()
        .map(|r| (r.mapping(), r.report.is_success()))
        .collect();
    assert_eq!(summary, vec![("src.a -> dst.a", true), ("src.b -> dst.b", true)]);
}

#[tokio::test]
async fn test_unreadable_files_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("run_garbage_1.json"), "{not json").unwrap();
    let ledger = FilesystemLedger::new(temp_dir.path());
    ledger.record(&record_at("src.a -> dst.a", true, 0)).await.unwrap();

    assert_eq!(ledger.latest_per_mapping().await.unwrap().len(), 1);
}

#[test]
fn test_record_file_format() {
    let record = record_at("src.a -> dst.a", false, 0);
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["report"]["mapping"], "src.a -> dst.a");
    assert_eq!(json["report"]["outcome"]["status"], "failure");
    assert_eq!(json["report"]["outcome"]["kind"], "io");

    let parsed: RunRecord = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, record);
}

#[tokio::test]
async fn test_storage_selection() {
    let temp_dir = TempDir::new().unwrap();

    let disabled = LedgerStorage::from_dir(None);
    assert_eq!(disabled, LedgerStorage::Disabled);
    disabled
        .open()
        .record(&record_at("src.a -> dst.a", true, 0))
        .await
        .unwrap();

    let storage = LedgerStorage::from_dir(Some(temp_dir.path().to_path_buf()));
    let ledger = storage.open();
    ledger.record(&record_at("src.a -> dst.a", true, 0)).await.unwrap();
    assert!(ledger.latest("src.a -> dst.a").await.unwrap().is_some());

    assert!(NullLedger.latest("src.a -> dst.a").await.unwrap().is_none());
}
